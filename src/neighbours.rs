// This file contains the code for the cladeseek neighbours subcommand.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::aggregate::unique_neighbours;
use crate::identifier::genome_prefix;
use crate::log::{section_header, explanation, warning};
use crate::metrics::NeighbourMetrics;
use crate::misc::{check_if_file_exists, check_threads, format_duration, format_float,
                  init_thread_pool, load_fasta_ids, load_id_list, output_path_with_extension,
                  quit_with_error, spinner};
use crate::selector::{resolve_query_leaves, select_neighbours, NeighbourRecord, SelectionPolicy};
use crate::tabular::{write_neighbour_table, write_sentinel, Sentinel};
use crate::taxonomy::UNKNOWN;
use crate::tree::{load_tree_input, Tree, TreeInput};


#[allow(clippy::too_many_arguments)]
pub fn neighbours(tree_file: PathBuf, query_file: PathBuf, subjects_file: PathBuf, out_csv: PathBuf,
                  num_neighbours: usize, max_ratio: f64, query_filter: Option<String>,
                  extract_list: Option<PathBuf>, threads: usize) {
    let start_time = Instant::now();
    check_settings(&query_file, &subjects_file, num_neighbours, max_ratio, threads);
    starting_message();
    let gene = gene_name(&query_file);
    let filter = parse_query_filter(&query_filter);
    print_settings(&tree_file, &query_file, &subjects_file, &out_csv, num_neighbours, max_ratio,
                   &filter, &extract_list, threads, &gene);
    init_thread_pool(threads);
    let policy = SelectionPolicy::new(num_neighbours, max_ratio, 0.0);
    let mut metrics = NeighbourMetrics::new();

    let tree = match load_tree_or_sentinel(&tree_file, &out_csv) {
        Some(tree) => tree,
        None => { write_empty_extract_list(&extract_list); return; }
    };
    metrics.tree_leaf_count = tree.leaf_count();
    metrics.clamped_branch_count = tree.clamped_branch_count;

    let query_ids = load_fasta_ids(&query_file);
    metrics.query_count = query_ids.len();
    if query_ids.is_empty() {
        write_sentinel(&out_csv, Sentinel::NoQueries);
        write_empty_extract_list(&extract_list);
        return;
    }
    let subject_ids = load_id_list(&subjects_file);
    metrics.subject_count = subject_ids.len();
    if subject_ids.is_empty() {
        write_sentinel(&out_csv, Sentinel::NoSubjects);
        write_empty_extract_list(&extract_list);
        return;
    }

    let query_ids = filter_queries(query_ids, &filter);
    let records = find_neighbours(&tree, &query_ids, &policy, &mut metrics);
    let unique = unique_neighbours(&records);
    metrics.neighbour_record_count = records.len();
    metrics.unique_neighbour_count = unique.len();

    write_neighbour_table(&out_csv, &records, &gene);
    if let Some(list) = &extract_list {
        write_extract_list(list, &unique);
    }
    let yaml = output_path_with_extension(&out_csv, "yaml");
    metrics.save_to_yaml(&yaml);
    finished_message(start_time, &out_csv, &extract_list, &yaml);
}


fn check_settings(query_file: &Path, subjects_file: &Path, num_neighbours: usize, max_ratio: f64,
                  threads: usize) {
    check_if_file_exists(query_file);
    check_if_file_exists(subjects_file);
    check_threads(threads);
    if num_neighbours < 1 { quit_with_error("--num_neighbours cannot be less than 1"); }
    if max_ratio < 0.0    { quit_with_error("--max_ratio cannot be negative"); }
    if max_ratio > 0.0 && max_ratio < 1.0 {
        quit_with_error("--max_ratio must be 0 (disabled) or at least 1");
    }
}


fn starting_message() {
    section_header("Starting cladeseek neighbours");
    explanation("This command finds the closest neighbours of each query sequence in a gene \
                 tree, using patristic (branch length) distances. Sequences from the query's \
                 own genome are never reported as its neighbours.");
}


#[allow(clippy::too_many_arguments)]
fn print_settings(tree_file: &Path, query_file: &Path, subjects_file: &Path, out_csv: &Path,
                  num_neighbours: usize, max_ratio: f64, filter: &[String],
                  extract_list: &Option<PathBuf>, threads: usize, gene: &str) {
    eprintln!("Settings:");
    eprintln!("  --tree {}", tree_file.display());
    eprintln!("  --query {}", query_file.display());
    eprintln!("  --subjects {}", subjects_file.display());
    eprintln!("  --out {}", out_csv.display());
    eprintln!("  --num_neighbours {}", num_neighbours);
    eprintln!("  --max_ratio {}", format_float(max_ratio));
    if !filter.is_empty() {
        eprintln!("  --query_filter {}", filter.join(","));
    }
    if let Some(list) = extract_list {
        eprintln!("  --extract_list {}", list.display());
    }
    eprintln!("  --threads {}", threads);
    eprintln!();
    eprintln!("Gene name: {}", gene);
    eprintln!();
    if max_ratio == 0.0 {
        eprintln!("Since --max_ratio was set to 0, the distance ratio cutoff is disabled.");
        eprintln!();
    }
}


fn finished_message(start_time: Instant, out_csv: &Path, extract_list: &Option<PathBuf>,
                    yaml: &Path) {
    section_header("Finished!");
    eprintln!("Closest neighbours: {}", out_csv.display());
    if let Some(list) = extract_list {
        eprintln!("Neighbour IDs:      {}", list.display());
    }
    eprintln!("Run summary:        {}", yaml.display());
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


pub fn gene_name(query_file: &Path) -> String {
    // The query file is named after its gene or orthogroup, e.g. OG0000012.faa.
    match query_file.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None       => "unknown_gene".to_string(),
    }
}


pub fn load_tree_or_sentinel(tree_file: &Path, out_file: &Path) -> Option<Tree> {
    // A missing or empty tree, or one that says there were no hits, gets a marker line in the
    // output file instead of a result. A tree that can't be parsed is an error.
    let pb = spinner("loading tree...");
    let input = load_tree_input(tree_file);
    pb.finish_and_clear();
    match input {
        Ok(TreeInput::Parsed(tree)) => {
            if tree.clamped_branch_count > 0 {
                warning(&format!("{} negative branch length(s) in {} were set to zero",
                                 tree.clamped_branch_count, tree_file.display()));
            }
            eprintln!("Loaded tree with {} leaves: {}", tree.leaf_count(), tree_file.display());
            eprintln!();
            Some(tree)
        }
        Ok(TreeInput::Absent) => { write_sentinel(out_file, Sentinel::NoValidTree); None }
        Ok(TreeInput::NoHits) => { write_sentinel(out_file, Sentinel::NoHits); None }
        Err(e) => quit_with_error(&format!("failed to load tree {}\n{}", tree_file.display(), e)),
    }
}


fn parse_query_filter(query_filter: &Option<String>) -> Vec<String> {
    match query_filter {
        Some(filter) => filter.split(',').map(|p| p.trim()).filter(|p| !p.is_empty())
                              .map(|p| p.to_string()).collect(),
        None => Vec::new(),
    }
}


fn filter_queries(query_ids: Vec<String>, filter: &[String]) -> Vec<String> {
    // An empty filter keeps every query. Otherwise a query is kept if its genome prefix starts
    // with any of the filter prefixes.
    if filter.is_empty() { return query_ids; }
    let kept: Vec<String> = query_ids.into_iter()
        .filter(|id| filter.iter().any(|p| genome_prefix(id).starts_with(p.as_str())))
        .collect();
    eprintln!("{} queries match the filter ({})", kept.len(), filter.join(","));
    kept
}


fn find_neighbours(tree: &Tree, query_ids: &[String], policy: &SelectionPolicy,
                   metrics: &mut NeighbourMetrics) -> Vec<NeighbourRecord> {
    section_header("Finding closest neighbours");
    explanation(&format!("Each query is placed on the tree and its neighbours are chosen: {}.",
                         policy));
    let resolved = resolve_query_leaves(tree, query_ids);
    for query_id in &resolved.unresolved {
        warning(&format!("query {} not found in tree", query_id));
    }
    metrics.resolved_query_count = resolved.leaves.len();
    metrics.unresolved_query_count = resolved.unresolved.len();
    if tree.leaf_count() < 2 {
        warning("tree has only one leaf, so there are no neighbours to find");
    }

    let queries = resolved.leaf_set();
    let per_query: Vec<Vec<NeighbourRecord>> = resolved.leaves.par_iter()
        .map(|(query_id, leaf)| {
            select_neighbours(tree, *leaf, &queries, policy).into_iter()
                .map(|n| NeighbourRecord { query_id: query_id.clone(), neighbour_id: n.id,
                                           distance: n.distance,
                                           taxonomy: UNKNOWN.to_string() })
                .collect()
        }).collect();

    for records in &per_query {
        for (i, r) in records.iter().enumerate() {
            eprintln!("{}, neighbour {}: {}, distance: {:.6}", r.query_id, i + 1, r.neighbour_id,
                      r.distance);
        }
    }
    let records: Vec<NeighbourRecord> = per_query.into_iter().flatten().collect();
    eprintln!();
    eprintln!("{} neighbour records for {} queries", records.len(), resolved.leaves.len());
    eprintln!();
    records
}


fn write_extract_list(filename: &Path, ids: &[String]) {
    let result = File::create(filename).map(BufWriter::new).and_then(|mut writer| {
        for id in ids {
            writeln!(writer, "{}", id)?;
        }
        writer.flush()
    });
    if let Err(e) = result {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


fn write_empty_extract_list(extract_list: &Option<PathBuf>) {
    // Downstream steps expect the list to exist even when there is nothing in it.
    if let Some(list) = extract_list {
        write_extract_list(list, &[]);
    }
}
