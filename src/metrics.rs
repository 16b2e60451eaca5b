// This file contains the code for writing CladeSeek's structured outputs: the JSON placements
// document and the YAML run summaries.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::misc::quit_with_error;


#[derive(Serialize, Deserialize, Debug, Default)]
pub struct NeighbourMetrics {
    pub tree_leaf_count: usize,
    pub clamped_branch_count: usize,
    pub query_count: usize,
    pub resolved_query_count: usize,
    pub unresolved_query_count: usize,
    pub subject_count: usize,
    pub neighbour_record_count: usize,
    pub unique_neighbour_count: usize,
}

impl NeighbourMetrics {
    pub fn new() -> Self { Self::default() }

    pub fn save_to_yaml(&self, filename: &Path) { save_yaml(filename, self); }
}


#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PlacementMetrics {
    pub tree_leaf_count: usize,
    pub clamped_branch_count: usize,
    pub query_count: usize,
    pub queries_without_neighbours: usize,
    pub neighbour_record_count: usize,
    pub taxonomy_table_size: usize,
    pub category_counts: BTreeMap<String, usize>,
}

impl PlacementMetrics {
    pub fn new() -> Self { Self::default() }

    pub fn save_to_yaml(&self, filename: &Path) { save_yaml(filename, self); }
}


#[derive(Serialize, Deserialize, Debug, Default)]
pub struct StatsMetrics {
    pub tree_leaf_count: usize,
    pub query_count: usize,
    pub unresolved_query_count: usize,
    pub taxonomy_table_size: usize,
    pub classified_leaf_count: usize,
}

impl StatsMetrics {
    pub fn new() -> Self { Self::default() }

    pub fn save_to_yaml(&self, filename: &Path) { save_yaml(filename, self); }
}


#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlacedNeighbour {
    pub id: String,
    pub distance: f64,
    pub taxonomy: String,
}


#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Placement {
    pub query: String,
    pub closest_neighbors: Vec<PlacedNeighbour>,
}


#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TaxonomySummary {
    pub domains: BTreeMap<String, usize>,
    pub total_neighbors: usize,
}


#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlacementsDocument {
    pub tree_file: String,
    pub query_count: usize,
    pub placements: Vec<Placement>,
    pub taxonomy_summary: TaxonomySummary,
}

impl PlacementsDocument {
    pub fn save_to_json(&self, filename: &Path) {
        let result = File::create(filename).map(BufWriter::new).and_then(|mut writer| {
            serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::from)?;
            writeln!(writer)?;
            writer.flush()
        });
        if let Err(e) = result {
            quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
        }
    }
}


fn save_yaml<T: Serialize>(filename: &Path, data: &T) {
    let result = serde_yaml::to_string(data)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|yaml| {
            let mut file = File::create(filename)?;
            file.write_all(yaml.as_bytes())
        });
    if let Err(e) = result {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


#[cfg(test)]
mod tests {
    use maplit::btreemap;
    use tempfile::tempdir;
    use super::*;

    #[test]
    fn test_save_neighbour_metrics() {
        let temp_dir = tempdir().unwrap();
        let yaml_path = temp_dir.path().join("neighbours.yaml");
        let mut metrics = NeighbourMetrics::new();
        metrics.tree_leaf_count = 12;
        metrics.query_count = 2;
        metrics.unique_neighbour_count = 7;
        metrics.save_to_yaml(&yaml_path);
        let loaded: NeighbourMetrics =
            serde_yaml::from_str(&std::fs::read_to_string(&yaml_path).unwrap()).unwrap();
        assert_eq!(loaded.tree_leaf_count, 12);
        assert_eq!(loaded.query_count, 2);
        assert_eq!(loaded.unique_neighbour_count, 7);
        assert_eq!(loaded.subject_count, 0);
    }

    #[test]
    fn test_placement_metrics_counts() {
        let temp_dir = tempdir().unwrap();
        let yaml_path = temp_dir.path().join("placements.yaml");
        let mut metrics = PlacementMetrics::new();
        metrics.category_counts = btreemap!{"Bacteria".to_string() => 3, "Viruses".to_string() => 1};
        metrics.save_to_yaml(&yaml_path);
        let text = std::fs::read_to_string(&yaml_path).unwrap();
        assert!(text.contains("category_counts:\n  Bacteria: 3\n  Viruses: 1\n"));
    }

    #[test]
    fn test_placements_document_json() {
        let temp_dir = tempdir().unwrap();
        let json_path = temp_dir.path().join("placements.json");
        let document = PlacementsDocument {
            tree_file: "OG0000012.tree".to_string(),
            query_count: 1,
            placements: vec![Placement {
                query: "Hype_1|contig_3_5".to_string(),
                closest_neighbors: vec![PlacedNeighbour { id: "WP_1".to_string(), distance: 0.25,
                                                          taxonomy: "Bacteria".to_string() }],
            }],
            taxonomy_summary: TaxonomySummary {
                domains: btreemap!{"Bacteria".to_string() => 1},
                total_neighbors: 1,
            },
        };
        document.save_to_json(&json_path);
        let text = std::fs::read_to_string(&json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tree_file"], "OG0000012.tree");
        assert_eq!(value["placements"][0]["closest_neighbors"][0]["id"], "WP_1");
        assert_eq!(value["placements"][0]["closest_neighbors"][0]["distance"], 0.25);
        assert_eq!(value["taxonomy_summary"]["domains"]["Bacteria"], 1);
        let loaded: PlacementsDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, document);
    }
}
