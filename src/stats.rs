// This file contains the code for the cladeseek stats subcommand.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::aggregate::{query_stats, QueryStats};
use crate::log::{section_header, explanation, warning};
use crate::metrics::StatsMetrics;
use crate::misc::{check_if_file_exists, check_threads, format_duration, init_thread_pool,
                  load_fasta_ids, output_path_with_extension};
use crate::neighbours::load_tree_or_sentinel;
use crate::selector::resolve_query_leaves;
use crate::tabular::{write_sentinel, write_tsv, Sentinel};
use crate::taxonomy::TaxonomyTable;
use crate::tree::Tree;


pub fn stats(tree_file: PathBuf, taxonomy_file: PathBuf, query_file: PathBuf, out_tsv: PathBuf,
             threads: usize) {
    let start_time = Instant::now();
    check_settings(&taxonomy_file, &query_file, threads);
    starting_message();
    print_settings(&tree_file, &taxonomy_file, &query_file, &out_tsv, threads);
    init_thread_pool(threads);
    let mut metrics = StatsMetrics::new();

    let table = TaxonomyTable::load(&taxonomy_file);
    eprintln!("Loaded {} taxonomy assignments", table.len());
    metrics.taxonomy_table_size = table.len();
    let query_ids = load_fasta_ids(&query_file);
    eprintln!("Loaded {} query sequences", query_ids.len());
    eprintln!();
    metrics.query_count = query_ids.len();

    let Some(tree) = load_tree_or_sentinel(&tree_file, &out_tsv) else { return; };
    metrics.tree_leaf_count = tree.leaf_count();
    if query_ids.is_empty() {
        write_sentinel(&out_tsv, Sentinel::NoQueries);
        return;
    }

    let leaf_taxonomy = leaf_taxonomy(&tree, &table);
    metrics.classified_leaf_count = leaf_taxonomy.len();
    let (header, rows) = calculate_stats(&tree, &query_ids, &leaf_taxonomy, &mut metrics);
    write_tsv(&out_tsv, &header, &rows);
    let yaml = output_path_with_extension(&out_tsv, "yaml");
    metrics.save_to_yaml(&yaml);
    finished_message(start_time, &out_tsv, &yaml);
}


fn check_settings(taxonomy_file: &Path, query_file: &Path, threads: usize) {
    check_if_file_exists(taxonomy_file);
    check_if_file_exists(query_file);
    check_threads(threads);
}


fn starting_message() {
    section_header("Starting cladeseek stats");
    explanation("This command summarises where each query sits in a gene tree: how far it is \
                 from the other queries and from sequences of each broad taxonomic category \
                 (Bacteria, Archaea, Eukaryota and Viruses). Values that can't be calculated \
                 are given as na.");
}


fn print_settings(tree_file: &Path, taxonomy_file: &Path, query_file: &Path, out_tsv: &Path,
                  threads: usize) {
    eprintln!("Settings:");
    eprintln!("  --tree {}", tree_file.display());
    eprintln!("  --taxonomy {}", taxonomy_file.display());
    eprintln!("  --query {}", query_file.display());
    eprintln!("  --out {}", out_tsv.display());
    eprintln!("  --threads {}", threads);
    eprintln!();
}


fn finished_message(start_time: Instant, out_tsv: &Path, yaml: &Path) {
    section_header("Finished!");
    eprintln!("Query statistics: {}", out_tsv.display());
    eprintln!("Run summary:      {}", yaml.display());
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


pub fn leaf_taxonomy(tree: &Tree, table: &TaxonomyTable) -> FxHashMap<usize, String> {
    tree.leaves().iter()
        .filter_map(|&leaf| table.lookup(tree.name(leaf)).map(|t| (leaf, t.to_string())))
        .collect()
}


fn calculate_stats(tree: &Tree, query_ids: &[String], leaf_taxonomy: &FxHashMap<usize, String>,
                   metrics: &mut StatsMetrics) -> (Vec<String>, Vec<Vec<String>>) {
    section_header("Calculating statistics");
    let resolved = resolve_query_leaves(tree, query_ids);
    for query_id in &resolved.unresolved {
        warning(&format!("query {} not found in tree", query_id));
    }
    metrics.unresolved_query_count = resolved.unresolved.len();
    if resolved.leaves.len() < 2 {
        warning("fewer than two queries in the tree, so query-to-query values will be na");
    }
    let queries = resolved.leaf_set();
    let all_stats: Vec<QueryStats> = resolved.leaves.par_iter()
        .map(|(_, leaf)| query_stats(tree, *leaf, &queries, leaf_taxonomy)).collect();
    for s in &all_stats {
        eprintln!("{}: nearest query {}", s.query, s.nearest_query.as_deref().unwrap_or("na"));
    }
    eprintln!();
    (QueryStats::header(), all_stats.iter().map(|s| s.row()).collect())
}
