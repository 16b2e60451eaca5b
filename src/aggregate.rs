// This file contains the functions that summarise neighbour searches: the combined neighbour list,
// per-category counts and the per-query distance statistics.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

use crate::misc::format_float;
use crate::selector::{query_distances, NeighbourRecord};
use crate::taxonomy::{broad_category, BROAD_CATEGORIES};
use crate::tree::Tree;


pub const NA: &str = "na";
const CLOSEST_COUNT: usize = 3;


pub fn unique_neighbours(records: &[NeighbourRecord]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    records.iter().filter(|r| seen.insert(r.neighbour_id.as_str()))
        .map(|r| r.neighbour_id.clone()).collect()
}


pub fn category_counts<'a>(categories: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for category in categories {
        *counts.entry(category.to_string()).or_insert(0) += 1;
    }
    counts
}


pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() { return None; }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}


pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}


pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format_float(v),
        _                        => NA.to_string(),
    }
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct CategoryStats {
    pub nearest_distance: Option<f64>,
    pub nearest_taxonomy: Option<String>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub mean_3_closest: Option<f64>,
    pub std_3_closest: Option<f64>,
}

impl CategoryStats {
    fn from_sorted_members(members: &[(f64, &str)]) -> Self {
        // Members must be sorted by distance, closest first.
        let distances: Vec<f64> = members.iter().map(|(d, _)| *d).collect();
        let closest = if distances.len() >= CLOSEST_COUNT { Some(&distances[..CLOSEST_COUNT]) }
                                                        else { None };
        CategoryStats {
            nearest_distance: distances.first().copied(),
            nearest_taxonomy: members.first().map(|(_, t)| t.to_string()),
            mean: mean(&distances),
            std: population_std(&distances),
            mean_3_closest: closest.and_then(mean),
            std_3_closest: closest.and_then(population_std),
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct QueryStats {
    pub query: String,
    pub nearest_query: Option<String>,
    pub nearest_query_distance: Option<f64>,
    pub mean_distance_3_closest_queries: Option<f64>,
    pub std_distance_3_closest_queries: Option<f64>,
    pub avg_distance_all_queries: Option<f64>,
    pub categories: Vec<CategoryStats>,  // in BROAD_CATEGORIES order
}

impl QueryStats {
    pub fn header() -> Vec<String> {
        let mut header: Vec<String> = ["query", "nearest_query", "nearest_query_distance",
                                       "mean_distance_3_closest_queries",
                                       "std_distance_3_closest_queries",
                                       "avg_distance_all_queries"]
            .iter().map(|s| s.to_string()).collect();
        let per_category: [(&str, &str); 6] = [("nearest_", "_distance"),
                                                ("nearest_", "_taxonomy"),
                                                ("", "_mean_distance"),
                                                ("", "_std_distance"),
                                                ("", "_mean_distance_3_closest"),
                                                ("", "_std_distance_3_closest")];
        for (before, after) in per_category {
            for category in BROAD_CATEGORIES {
                header.push(format!("{}{}{}", before, category, after));
            }
        }
        header
    }

    pub fn row(&self) -> Vec<String> {
        let mut row = vec![self.query.clone(),
                           self.nearest_query.clone().unwrap_or_else(|| NA.to_string()),
                           format_stat(self.nearest_query_distance),
                           format_stat(self.mean_distance_3_closest_queries),
                           format_stat(self.std_distance_3_closest_queries),
                           format_stat(self.avg_distance_all_queries)];
        row.extend(self.categories.iter().map(|c| format_stat(c.nearest_distance)));
        row.extend(self.categories.iter()
            .map(|c| c.nearest_taxonomy.clone().unwrap_or_else(|| NA.to_string())));
        row.extend(self.categories.iter().map(|c| format_stat(c.mean)));
        row.extend(self.categories.iter().map(|c| format_stat(c.std)));
        row.extend(self.categories.iter().map(|c| format_stat(c.mean_3_closest)));
        row.extend(self.categories.iter().map(|c| format_stat(c.std_3_closest)));
        row
    }
}


pub fn query_stats(tree: &Tree, query: usize, queries: &FxHashSet<usize>,
                   leaf_taxonomy: &FxHashMap<usize, String>) -> QueryStats {
    // Every other query counts towards the query-to-query statistics, whatever its genome. Every
    // other leaf with a taxonomy counts towards its broad category, queries included.
    let query_hits = query_distances(tree, query, queries);

    let distances: Vec<f64> = query_hits.iter().map(|n| n.distance).collect();
    let closest_queries = &distances[..distances.len().min(CLOSEST_COUNT)];

    let all_distances = tree.distances_from(query);
    let mut classified: Vec<(f64, &str, &str)> = tree.leaves().iter()
        .filter(|&&leaf| leaf != query)
        .filter_map(|&leaf| leaf_taxonomy.get(&leaf)
            .map(|t| (all_distances[leaf], tree.name(leaf), t.as_str())))
        .collect();
    classified.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let mut members: Vec<Vec<(f64, &str)>> = vec![Vec::new(); BROAD_CATEGORIES.len()];
    for (distance, _, taxonomy) in classified {
        let category = broad_category(taxonomy);
        if let Some(i) = BROAD_CATEGORIES.iter().position(|c| *c == category) {
            members[i].push((distance, taxonomy));
        }
    }

    QueryStats {
        query: tree.name(query).to_string(),
        nearest_query: query_hits.first().map(|n| n.id.clone()),
        nearest_query_distance: query_hits.first().map(|n| n.distance),
        mean_distance_3_closest_queries: mean(closest_queries),
        std_distance_3_closest_queries: population_std(closest_queries),
        avg_distance_all_queries: mean(&distances),
        categories: members.iter().map(|m| CategoryStats::from_sorted_members(m)).collect(),
    }
}


#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use super::*;
    use crate::tests::assert_almost_eq;

    fn record(query: &str, neighbour: &str, distance: f64) -> NeighbourRecord {
        NeighbourRecord { query_id: query.to_string(), neighbour_id: neighbour.to_string(),
                          distance, taxonomy: "Unknown".to_string() }
    }

    #[test]
    fn test_unique_neighbours() {
        let records = vec![record("Q1", "B", 0.1), record("Q1", "A", 0.2),
                           record("Q2", "A", 0.1), record("Q2", "C", 0.3)];
        assert_eq!(unique_neighbours(&records), vec!["B", "A", "C"]);
        assert!(unique_neighbours(&[]).is_empty());
    }

    #[test]
    fn test_category_counts() {
        let counts = category_counts(["Bacteria", "Viruses", "Bacteria"]);
        assert_eq!(counts.get("Bacteria"), Some(&2));
        assert_eq!(counts.get("Viruses"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean(&[]), None);
        assert_eq!(population_std(&[]), None);
        assert_almost_eq(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0, 1e-12);
        assert_almost_eq(population_std(&[1.0, 2.0, 3.0]).unwrap(), (2.0f64 / 3.0).sqrt(), 1e-12);
        assert_almost_eq(population_std(&[5.0]).unwrap(), 0.0, 1e-12);
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(None), "na");
        assert_eq!(format_stat(Some(f64::NAN)), "na");
        assert_eq!(format_stat(Some(f64::INFINITY)), "na");
        assert_eq!(format_stat(Some(0.25)), "0.25");
    }

    #[test]
    fn test_header_matches_row() {
        assert_eq!(QueryStats::header().len(), 6 + 6 * 4);
        assert_eq!(QueryStats::header()[6], "nearest_Bacteria_distance");
        assert_eq!(QueryStats::header()[29], "Viruses_std_distance_3_closest");
    }

    #[test]
    fn test_query_stats() {
        // Q1 and Q2 are queries, B1-B3 are bacteria, V1 is a virus, U1 has no taxonomy.
        let tree = Tree::from_newick("((Q1:0.1,Q2:0.2):0.1,((B1:0.1,B2:0.2):0.1,B3:0.4):0.1,\
                                       (V1:0.5,U1:0.1):0.2);").unwrap();
        let by_name = |n: &str| tree.leaf_by_name(n).unwrap();
        let queries: FxHashSet<usize> = [by_name("Q1"), by_name("Q2")].into_iter().collect();
        let taxonomy: FxHashMap<usize, String> = hashmap!{
            by_name("B1") => "Bacteria;Bacillota".to_string(),
            by_name("B2") => "Bacteria;Pseudomonadota".to_string(),
            by_name("B3") => "Bacteria".to_string(),
            by_name("V1") => "Viruses;Nucleocytoviricota".to_string(),
        }.into_iter().collect();

        let stats = query_stats(&tree, by_name("Q1"), &queries, &taxonomy);
        assert_eq!(stats.query, "Q1");
        assert_eq!(stats.nearest_query.as_deref(), Some("Q2"));
        assert_almost_eq(stats.nearest_query_distance.unwrap(), 0.3, 1e-9);
        assert_almost_eq(stats.avg_distance_all_queries.unwrap(), 0.3, 1e-9);
        assert_almost_eq(stats.std_distance_3_closest_queries.unwrap(), 0.0, 1e-9);

        // Q1 to B1 = 0.2 + 0.1 + 0.1 + 0.1 = 0.5, B2 = 0.6, B3 = 0.2 + 0.1 + 0.4 = 0.7
        let bacteria = &stats.categories[0];
        assert_almost_eq(bacteria.nearest_distance.unwrap(), 0.5, 1e-9);
        assert_eq!(bacteria.nearest_taxonomy.as_deref(), Some("Bacteria;Bacillota"));
        assert_almost_eq(bacteria.mean.unwrap(), 0.6, 1e-9);
        assert_almost_eq(bacteria.mean_3_closest.unwrap(), 0.6, 1e-9);
        assert_almost_eq(bacteria.std.unwrap(), (0.02f64 / 3.0).sqrt(), 1e-9);

        let archaea = &stats.categories[1];
        assert_eq!(archaea, &CategoryStats::default());

        // Q1 to V1 = 0.2 + 0.2 + 0.5 = 0.9, only one member so no 3-closest stats
        let viruses = &stats.categories[3];
        assert_almost_eq(viruses.nearest_distance.unwrap(), 0.9, 1e-9);
        assert_almost_eq(viruses.std.unwrap(), 0.0, 1e-9);
        assert_eq!(viruses.mean_3_closest, None);

        let row = stats.row();
        assert_eq!(row.len(), QueryStats::header().len());
        assert_eq!(row[1], "Q2");
        assert_eq!(row[7], "na");  // nearest_Archaea_distance
        assert_eq!(row[10], "Bacteria;Bacillota");
        assert_eq!(row[29], "na");  // Viruses_std_distance_3_closest
    }

    #[test]
    fn test_query_stats_same_genome() {
        // All three Hype_1 leaves share a genome. Two are queries and one has a taxonomy, as does
        // the query Hype_1|b.
        let tree = Tree::from_newick("((Hype_1|a:0.1,Hype_1|b:0.2):0.1,\
                                       (Hype_1|c:0.3,WP_1:0.1):0.1);").unwrap();
        let by_name = |n: &str| tree.leaf_by_name(n).unwrap();
        let queries: FxHashSet<usize> = [by_name("Hype_1|a"), by_name("Hype_1|b")].into_iter()
            .collect();
        let taxonomy: FxHashMap<usize, String> = hashmap!{
            by_name("Hype_1|b") => "Bacteria;Candidatus".to_string(),
            by_name("Hype_1|c") => "Viruses;Nucleocytoviricota".to_string(),
            by_name("WP_1") => "Bacteria;Bacillota".to_string(),
        }.into_iter().collect();

        let stats = query_stats(&tree, by_name("Hype_1|a"), &queries, &taxonomy);
        assert_eq!(stats.nearest_query.as_deref(), Some("Hype_1|b"));
        assert_almost_eq(stats.nearest_query_distance.unwrap(), 0.3, 1e-9);
        assert_almost_eq(stats.avg_distance_all_queries.unwrap(), 0.3, 1e-9);

        let bacteria = &stats.categories[0];
        assert_eq!(bacteria.nearest_taxonomy.as_deref(), Some("Bacteria;Candidatus"));
        assert_almost_eq(bacteria.nearest_distance.unwrap(), 0.3, 1e-9);
        assert_almost_eq(bacteria.mean.unwrap(), 0.35, 1e-9);
        assert_almost_eq(stats.categories[3].nearest_distance.unwrap(), 0.6, 1e-9);
    }

    #[test]
    fn test_query_stats_single_query() {
        let tree = Tree::from_newick("(Q1:0.1,B1:0.2);").unwrap();
        let q = tree.leaf_by_name("Q1").unwrap();
        let queries: FxHashSet<usize> = [q].into_iter().collect();
        let stats = query_stats(&tree, q, &queries, &FxHashMap::default());
        assert_eq!(stats.nearest_query, None);
        let row = stats.row();
        assert_eq!(row[1..6], ["na", "na", "na", "na", "na"]);
        assert!(row[6..].iter().all(|v| v == "na"));
    }
}
