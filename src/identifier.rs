// This file contains the functions that reconcile sequence identifiers between tree leaf names,
// FASTA headers and taxonomy tables, which often format the same sequence differently.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use regex::Regex;
use std::sync::OnceLock;


fn accession_regex() -> &'static Regex {
    // Letter prefix, optional underscore, digit run, optional version: WP_012345678.1, AYV12345,
    // XP_999, NC_000913.3
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z]{1,6}_?\d+(?:\.\d+)?").unwrap())
}


fn versioned_accession_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]{1,6}_?[A-Za-z]*\d+)\.\d+$").unwrap())
}


pub fn genome_prefix(identifier: &str) -> &str {
    // Composite identifiers look like genome|contig_protein, and everything before the first pipe
    // names the source genome. Identifiers without a pipe are their own genome.
    match identifier.split_once('|') {
        Some((prefix, _)) => prefix,
        None              => identifier,
    }
}


pub fn same_genome(a: &str, b: &str) -> bool {
    genome_prefix(a) == genome_prefix(b)
}


pub fn strip_version(identifier: &str) -> Option<&str> {
    versioned_accession_regex().captures(identifier)
        .and_then(|caps| caps.get(1)).map(|m| m.as_str())
}


pub fn variations(identifier: &str) -> Vec<String> {
    // Returns candidate forms of an identifier, most specific first. The identifier itself always
    // comes first, so an exact match wins over any looser derived match.
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(first_word) = identifier.split_whitespace().next() {
        candidates.push(first_word);
    }
    candidates.push(genome_prefix(identifier));
    if let Some((_, last_part)) = identifier.rsplit_once('|') {
        candidates.push(last_part);
    }
    if let Some(unversioned) = strip_version(identifier) {
        candidates.push(unversioned);
    }
    for m in accession_regex().find_iter(identifier) {
        candidates.push(m.as_str());
        if let Some(unversioned) = strip_version(m.as_str()) {
            candidates.push(unversioned);
        }
    }

    let mut unique: Vec<String> = vec![identifier.to_string()];
    for c in candidates {
        if !c.is_empty() && !unique.iter().any(|u| u == c) {
            unique.push(c.to_string());
        }
    }
    unique
}


pub fn resolve<V>(identifier: &str, lookup: impl Fn(&str) -> Option<V>) -> Option<(String, V)> {
    // Tries each variation of the identifier in priority order and returns the first that the
    // lookup accepts, along with the variation that matched.
    variations(identifier).into_iter().find_map(|v| lookup(&v).map(|value| (v, value)))
}


#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use super::*;

    #[test]
    fn test_genome_prefix() {
        assert_eq!(genome_prefix("Hype_1|contig_3_5"), "Hype_1");
        assert_eq!(genome_prefix("Hype_1|contig_3|5"), "Hype_1");
        assert_eq!(genome_prefix("WP_012345678.1"), "WP_012345678.1");
        assert_eq!(genome_prefix("|abc"), "");
        assert_eq!(genome_prefix(""), "");
    }

    #[test]
    fn test_genome_prefix_idempotent() {
        for id in ["Hype_1|contig_3_5", "XP_999", "a|b|c", "plain"] {
            let once = genome_prefix(id);
            assert_eq!(genome_prefix(once), once);
        }
    }

    #[test]
    fn test_same_genome() {
        assert!(same_genome("Hype_1|contig_3_5", "Hype_1|contig_9_1"));
        assert!(!same_genome("Hype_1|contig_3_5", "Hype_2|contig_3_5"));
        assert!(!same_genome("hype_1|a", "Hype_1|a"));
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("WP_012345678.1"), Some("WP_012345678"));
        assert_eq!(strip_version("AYV12345.2"), Some("AYV12345"));
        assert_eq!(strip_version("XP_999"), None);
        assert_eq!(strip_version("Hype_1|contig_3.5"), None);
    }

    #[test]
    fn test_variations_contains_identifier_first() {
        for id in ["Hype_1|contig_3_5", "WP_012345678.1", "x", "GCA_1|WP_5.1 some description"] {
            let v = variations(id);
            assert_eq!(v[0], id);
        }
    }

    #[test]
    fn test_variations_composite() {
        assert_eq!(variations("Hype_1|contig_3_5"),
                   vec!["Hype_1|contig_3_5", "Hype_1", "contig_3_5"]);
        assert_eq!(variations("GCA_123|WP_012345678.1"),
                   vec!["GCA_123|WP_012345678.1", "GCA_123", "WP_012345678.1", "WP_012345678"]);
    }

    #[test]
    fn test_variations_versioned() {
        assert_eq!(variations("WP_012345678.1"), vec!["WP_012345678.1", "WP_012345678"]);
        assert_eq!(variations("XP_999"), vec!["XP_999"]);
    }

    #[test]
    fn test_variations_whitespace() {
        assert_eq!(variations("AYV1.1 hypothetical protein"),
                   vec!["AYV1.1 hypothetical protein", "AYV1.1", "AYV1"]);
    }

    #[test]
    fn test_resolve_priority() {
        let table = hashmap!{"WP_1".to_string() => "loose", "GCA_9|WP_1.2".to_string() => "exact"};
        let found = resolve("GCA_9|WP_1.2", |k| table.get(k));
        assert_eq!(found, Some(("GCA_9|WP_1.2".to_string(), &"exact")));
        let found = resolve("other|WP_1.3", |k| table.get(k));
        assert_eq!(found, Some(("WP_1".to_string(), &"loose")));
        assert_eq!(resolve("nothing", |k| table.get(k)), None);
    }
}
