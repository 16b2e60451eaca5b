// This file contains the taxonomy side of CladeSeek: loading accession-to-taxonomy tables,
// picking out a rank, guessing a coarse taxonomy from accession prefixes when the table has no
// entry, and spreading categories from the leaves of a tree to its internal nodes.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::identifier::resolve;
use crate::log::warning;
use crate::misc::{load_file_lines, progress_bar};
use crate::tree::{Order, Tree};


pub const UNKNOWN: &str = "Unknown";
pub const OTHER: &str = "Other";
pub const BROAD_CATEGORIES: [&str; 4] = ["Bacteria", "Archaea", "Eukaryota", "Viruses"];


// Best-effort guesses from accession prefixes, checked in order. These are only used when a
// taxonomy table has nothing for an identifier.
const PREFIX_RULES: [(&str, &str); 14] = [
    ("AYV", "Viruses;Nucleocytoviricota;Hyperionvirus"),
    ("WP_", "Bacteria"),
    ("XP_", "Eukaryota"),
    ("NP_", "Bacteria;RefSeq"),
    ("YP_", "Bacteria;RefSeq"),
    ("AEF", "Bacteria;Pseudomonadota;Gammaproteobacteria"),
    ("ARF", "Bacteria;Pseudomonadota;Gammaproteobacteria"),
    ("KA",  "Eukaryota"),
    ("CA",  "Bacteria"),
    ("MD",  "Bacteria"),
    ("PBC", "Bacteria"),
    ("MBE", UNKNOWN),
    ("MCL", UNKNOWN),
    ("",    UNKNOWN),
];


#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Rank {
    Domain,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub fn index(self) -> usize {
        self as usize
    }
}


#[derive(Clone, Debug, Default)]
pub struct TaxonomyTable {
    entries: HashMap<String, String>,
}

impl TaxonomyTable {
    pub fn new() -> Self { Self::default() }

    pub fn from_entries<I: IntoIterator<Item = (String, String)>>(entries: I) -> Self {
        TaxonomyTable { entries: entries.into_iter().collect() }
    }

    pub fn load(filename: &Path) -> Self {
        let table = TaxonomyTable::from_lines(&load_file_lines(filename));
        if table.is_empty() {
            warning(&format!("no taxonomy assignments found in {}", filename.display()));
        }
        table
    }

    pub fn from_lines(lines: &[String]) -> Self {
        // Each line is tab-delimited with the accession and taxonomy in the last two columns, so
        // both plain two-column tables and OG/Accession/Taxonomy tables can be loaded. A header
        // line (taxonomy column named "Taxonomy") is skipped.
        let mut entries = HashMap::new();
        for line in lines {
            let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
            if parts.len() < 2 { continue; }
            let accession = parts[parts.len() - 2].trim();
            let taxonomy = parts[parts.len() - 1].trim();
            if accession.is_empty() || taxonomy == "Taxonomy" { continue; }
            entries.insert(accession.to_string(), taxonomy.replace("; ", ";"));
        }
        TaxonomyTable { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, accession: &str) -> Option<&str> {
        self.entries.get(accession).map(|t| t.as_str())
    }

    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        resolve(identifier, |key| self.get(key)).map(|(_, taxonomy)| taxonomy)
    }
}


pub fn rank_field(taxonomy: &str, rank: Rank) -> Option<&str> {
    // Failed lookups are stored as "Unknown (reason)", which has no usable ranks at all.
    if taxonomy.starts_with(UNKNOWN) || taxonomy.starts_with("Error") {
        return None;
    }
    taxonomy.split(';').map(|f| f.trim()).nth(rank.index()).filter(|f| !f.is_empty())
}


pub fn classify(identifier: &str, table: &TaxonomyTable, rank: Rank) -> String {
    // Table-only classification: no table entry (under any variation of the identifier) means
    // Unknown.
    table.lookup(identifier).and_then(|t| rank_field(t, rank)).unwrap_or(UNKNOWN).to_string()
}


pub fn infer_from_accession(identifier: &str) -> Option<&'static str> {
    // Applies the prefix rules to each variation of the identifier (so a genome|accession leaf
    // name is judged by its accession) and returns the first informative guess.
    resolve(identifier, |variation| {
        PREFIX_RULES.iter().find(|(prefix, _)| variation.starts_with(prefix))
            .map(|(_, taxonomy)| *taxonomy).filter(|t| *t != UNKNOWN)
    }).map(|(_, taxonomy)| taxonomy)
}


pub fn broad_category(taxonomy: &str) -> &'static str {
    let first = taxonomy.split(';').next().unwrap_or("").trim();
    BROAD_CATEGORIES.iter().find(|c| **c == first).copied().unwrap_or(OTHER)
}


#[derive(Clone, Debug)]
pub struct Classifier {
    table: Arc<TaxonomyTable>,
    rank: Rank,
    pattern_fallback: bool,
}

impl Classifier {
    pub fn new(table: Arc<TaxonomyTable>, rank: Rank, pattern_fallback: bool) -> Self {
        Classifier { table, rank, pattern_fallback }
    }

    pub fn taxonomy(&self, identifier: &str) -> String {
        // The table always wins over the accession-prefix guess.
        if let Some(taxonomy) = self.table.lookup(identifier) {
            return taxonomy.to_string();
        }
        if self.pattern_fallback {
            if let Some(taxonomy) = infer_from_accession(identifier) {
                return taxonomy.to_string();
            }
        }
        UNKNOWN.to_string()
    }

    pub fn category(&self, taxonomy: &str) -> String {
        rank_field(taxonomy, self.rank).unwrap_or(UNKNOWN).to_string()
    }
}


pub fn propagate_categories(tree: &Tree, leaf_category: impl Fn(usize) -> String) -> Vec<String> {
    // Returns a category for every node, indexed by node id. Leaves get theirs from the given
    // function. Internal nodes (visited after their children) take their children's category if
    // all children agree, otherwise Other.
    let mut categories = vec![String::new(); tree.node_count()];
    for id in tree.traverse(Order::PostOrder) {
        let node = tree.node(id);
        categories[id] = if node.is_leaf() {
            leaf_category(id)
        } else {
            let first = &categories[node.children[0]];
            if node.children.iter().all(|&c| &categories[c] == first) { first.clone() }
                                                                   else { OTHER.to_string() }
        };
    }
    categories
}


pub trait TaxonomySource {
    fn fetch(&self, accession: &str) -> Result<String, String>;
}


pub struct TableSource {
    table: Arc<TaxonomyTable>,
}

impl TableSource {
    pub fn new(table: Arc<TaxonomyTable>) -> Self {
        TableSource { table }
    }
}

impl TaxonomySource for TableSource {
    fn fetch(&self, accession: &str) -> Result<String, String> {
        self.table.lookup(accession).map(|t| t.to_string())
            .ok_or_else(|| "not in taxonomy table".to_string())
    }
}


pub fn lookup_all(source: &dyn TaxonomySource, accessions: &[String]) -> TaxonomyTable {
    // Looks up every accession and returns the results as a new table. A failed lookup is kept as
    // "Unknown (reason)" so the failure can be audited later, and never stops the others.
    let pb = progress_bar(accessions.len() as u64, "Taxonomy lookups");
    let mut entries = Vec::with_capacity(accessions.len());
    for accession in accessions {
        let taxonomy = match source.fetch(accession) {
            Ok(taxonomy) => taxonomy,
            Err(reason)  => format!("{} ({})", UNKNOWN, reason),
        };
        entries.push((accession.clone(), taxonomy));
        pb.inc(1);
    }
    pb.finish_and_clear();
    TaxonomyTable::from_entries(entries)
}
