// This file contains the code for the cladeseek placements subcommand, which reports each query's
// closest neighbours along with their taxonomy.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashSet;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::aggregate::category_counts;
use crate::log::{section_header, explanation, warning};
use crate::metrics::{PlacedNeighbour, Placement, PlacementMetrics, PlacementsDocument,
                     TaxonomySummary};
use crate::misc::{check_if_file_exists, check_threads, format_duration, format_float,
                  init_thread_pool, output_path_with_extension, quit_with_error};
use crate::neighbours::load_tree_or_sentinel;
use crate::selector::{prefix_queries, select_neighbours, SelectionPolicy};
use crate::tabular::{write_placement_table, PlacementRow};
use crate::taxonomy::{Classifier, Rank, TaxonomyTable};
use crate::tree::Tree;


#[allow(clippy::too_many_arguments)]
pub fn placements(tree_file: PathBuf, query_prefixes: String, out_json: PathBuf, out_csv: PathBuf,
                  num_neighbours: usize, self_hit_threshold: f64, max_ratio: f64,
                  taxonomy_file: Option<PathBuf>, rank: Rank, no_patterns: bool, threads: usize) {
    let start_time = Instant::now();
    let prefixes = parse_prefixes(&query_prefixes);
    check_settings(&prefixes, num_neighbours, self_hit_threshold, max_ratio, &taxonomy_file,
                   threads);
    starting_message();
    print_settings(&tree_file, &prefixes, &out_json, &out_csv, num_neighbours, self_hit_threshold,
                   max_ratio, &taxonomy_file, rank, no_patterns, threads);
    init_thread_pool(threads);
    let policy = SelectionPolicy::new(num_neighbours, max_ratio, self_hit_threshold);
    let table = Arc::new(match &taxonomy_file {
        Some(filename) => TaxonomyTable::load(filename),
        None           => TaxonomyTable::new(),
    });
    let classifier = Classifier::new(table.clone(), rank, !no_patterns);
    let mut metrics = PlacementMetrics::new();
    metrics.taxonomy_table_size = table.len();

    let Some(tree) = load_tree_or_sentinel(&tree_file, &out_csv) else {
        empty_document(&tree_file).save_to_json(&out_json);
        return;
    };
    metrics.tree_leaf_count = tree.leaf_count();
    metrics.clamped_branch_count = tree.clamped_branch_count;

    let (document, rows) = place_queries(&tree, &tree_file, &prefixes, &policy, &classifier);
    metrics.query_count = document.query_count;
    metrics.queries_without_neighbours = document.placements.iter()
        .filter(|p| p.closest_neighbors.is_empty()).count();
    metrics.neighbour_record_count = document.taxonomy_summary.total_neighbors;
    metrics.category_counts = document.taxonomy_summary.domains.clone();

    document.save_to_json(&out_json);
    write_placement_table(&out_csv, &rows);
    print_summary(&document.taxonomy_summary);
    let yaml = output_path_with_extension(&out_json, "yaml");
    metrics.save_to_yaml(&yaml);
    finished_message(start_time, &out_json, &out_csv, &yaml);
}


fn check_settings(prefixes: &[String], num_neighbours: usize, self_hit_threshold: f64,
                  max_ratio: f64, taxonomy_file: &Option<PathBuf>, threads: usize) {
    if let Some(filename) = taxonomy_file {
        check_if_file_exists(filename);
    }
    check_threads(threads);
    if prefixes.is_empty()     { quit_with_error("--query_prefixes cannot be empty"); }
    if num_neighbours < 1      { quit_with_error("--num_neighbours cannot be less than 1"); }
    if self_hit_threshold < 0.0 { quit_with_error("--self_hit_threshold cannot be negative"); }
    if max_ratio < 0.0         { quit_with_error("--max_ratio cannot be negative"); }
    if max_ratio > 0.0 && max_ratio < 1.0 {
        quit_with_error("--max_ratio must be 0 (disabled) or at least 1");
    }
}


fn starting_message() {
    section_header("Starting cladeseek placements");
    explanation("This command finds the query sequences in a gene tree (by leaf name prefix), \
                 reports each query's closest neighbours and classifies those neighbours \
                 taxonomically. Neighbours that are practically identical to the query are \
                 treated as self hits and skipped.");
}


#[allow(clippy::too_many_arguments)]
fn print_settings(tree_file: &Path, prefixes: &[String], out_json: &Path, out_csv: &Path,
                  num_neighbours: usize, self_hit_threshold: f64, max_ratio: f64,
                  taxonomy_file: &Option<PathBuf>, rank: Rank, no_patterns: bool,
                  threads: usize) {
    eprintln!("Settings:");
    eprintln!("  --tree {}", tree_file.display());
    eprintln!("  --query_prefixes {}", prefixes.join(","));
    eprintln!("  --out_json {}", out_json.display());
    eprintln!("  --out_csv {}", out_csv.display());
    eprintln!("  --num_neighbours {}", num_neighbours);
    eprintln!("  --self_hit_threshold {}", format_float(self_hit_threshold));
    eprintln!("  --max_ratio {}", format_float(max_ratio));
    if let Some(filename) = taxonomy_file {
        eprintln!("  --taxonomy {}", filename.display());
    }
    eprintln!("  --rank {}", format!("{:?}", rank).to_lowercase());
    if no_patterns {
        eprintln!("  --no_patterns");
    }
    eprintln!("  --threads {}", threads);
    eprintln!();
}


fn finished_message(start_time: Instant, out_json: &Path, out_csv: &Path, yaml: &Path) {
    section_header("Finished!");
    eprintln!("Placements (JSON):  {}", out_json.display());
    eprintln!("Placements (CSV):   {}", out_csv.display());
    eprintln!("Run summary:        {}", yaml.display());
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


fn parse_prefixes(query_prefixes: &str) -> Vec<String> {
    query_prefixes.split(',').map(|p| p.trim()).filter(|p| !p.is_empty())
        .map(|p| p.to_string()).collect()
}


fn empty_document(tree_file: &Path) -> PlacementsDocument {
    PlacementsDocument { tree_file: tree_file.display().to_string(), query_count: 0,
                         placements: Vec::new(), taxonomy_summary: TaxonomySummary::default() }
}


pub fn place_queries(tree: &Tree, tree_file: &Path, prefixes: &[String],
                     policy: &SelectionPolicy, classifier: &Classifier)
        -> (PlacementsDocument, Vec<PlacementRow>) {
    section_header("Placing queries");
    explanation(&format!("Query neighbours are chosen ({}) and each neighbour is classified.",
                         policy));
    let queries = prefix_queries(tree, prefixes);
    eprintln!("Found {} query sequences in tree", queries.len());
    eprintln!();
    if queries.is_empty() {
        warning(&format!("no leaves in {} start with {}", tree_file.display(),
                         prefixes.join(" or ")));
    }
    let query_leaves: FxHashSet<usize> = queries.iter().map(|(_, leaf)| *leaf).collect();

    let placements: Vec<(Placement, Vec<String>)> = queries.par_iter()
        .map(|(query, leaf)| {
            let mut neighbours = Vec::new();
            let mut categories = Vec::new();
            for n in select_neighbours(tree, *leaf, &query_leaves, policy) {
                let taxonomy = classifier.taxonomy(&n.id);
                categories.push(classifier.category(&taxonomy));
                neighbours.push(PlacedNeighbour { id: n.id, distance: n.distance, taxonomy });
            }
            (Placement { query: query.clone(), closest_neighbors: neighbours }, categories)
        }).collect();

    let mut rows = Vec::new();
    for (placement, categories) in &placements {
        if placement.closest_neighbors.is_empty() {
            warning(&format!("no neighbours found for {}", placement.query));
        }
        for (n, category) in placement.closest_neighbors.iter().zip(categories) {
            rows.push(PlacementRow { query_id: placement.query.clone(), neighbor_id: n.id.clone(),
                                     distance: format!("{:.6}", n.distance),
                                     domain: category.clone() });
        }
    }
    let domains = category_counts(rows.iter().map(|r| r.domain.as_str()));
    let document = PlacementsDocument {
        tree_file: tree_file.display().to_string(),
        query_count: placements.len(),
        taxonomy_summary: TaxonomySummary { domains, total_neighbors: rows.len() },
        placements: placements.into_iter().map(|(p, _)| p).collect(),
    };
    (document, rows)
}


fn print_summary(summary: &TaxonomySummary) {
    section_header("Neighbour taxonomy");
    if summary.domains.is_empty() {
        eprintln!("No neighbours were placed.");
    }
    for (category, count) in &summary.domains {
        eprintln!("  {}: {}", category, count);
    }
    eprintln!();
}
