// This is the main file of CladeSeek and where execution starts. It mainly handles the CLI and
// then calls into other files to run whichever subcommand the user chose.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;
use clap::{Parser, Subcommand, crate_version};

mod aggregate;
mod annotate;
mod decorate;
mod identifier;
mod log;
mod metrics;
mod misc;
mod neighbours;
mod placements;
mod selector;
mod stats;
mod tabular;
mod taxonomy;
mod tree;


use taxonomy::Rank;

#[derive(Parser)]
#[clap(name = "CladeSeek",
       version = concat!("v", crate_version!()),
       about = "closest phylogenetic neighbours and taxonomic context for query sequences in \
                gene trees")]
#[command(author, version, long_about = None, disable_help_subcommand = true,
          propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {

    /// add a taxonomy column to a closest-neighbours table
    Annotate {
        /// Closest-neighbours CSV made by cladeseek neighbours (required)
        #[clap(short = 'i', long = "in_csv", required = true)]
        in_csv: PathBuf,

        /// Taxonomy table: accession and taxonomy in the last two tab-delimited columns (required)
        #[clap(short = 'x', long = "taxonomy", required = true)]
        taxonomy: PathBuf,

        /// Output CSV
        #[clap(short = 'o', long = "out_csv", hide_default_value = true,
               help = "Output CSV [default: closest_neighbors_with_taxonomy.csv beside input]")]
        out_csv: Option<PathBuf>,

        /// Optional TSV of each neighbour's taxonomy assignment
        #[clap(short = 'a', long = "assignments")]
        assignments: Option<PathBuf>,
    },

    /// write iTOL annotation files that colour a tree by taxonomic category
    Decorate {
        /// Newick gene tree (required)
        #[clap(short = 't', long = "tree", required = true)]
        tree: PathBuf,

        /// Taxonomy table (required)
        #[clap(short = 'x', long = "taxonomy", required = true)]
        taxonomy: PathBuf,

        /// Query sequences in FASTA format (required)
        #[clap(short = 'q', long = "query", required = true)]
        query: PathBuf,

        /// Directory where annotation files will be saved (required)
        #[clap(short = 'o', long = "out_dir", required = true)]
        out_dir: PathBuf,
    },

    /// find the closest tree neighbours of each query sequence
    Neighbours {
        /// Newick gene tree (required)
        #[clap(short = 't', long = "tree", required = true)]
        tree: PathBuf,

        /// Query sequences in FASTA format, named after their gene (required)
        #[clap(short = 'q', long = "query", required = true)]
        query: PathBuf,

        /// Subject IDs, one per line (required)
        #[clap(short = 's', long = "subjects", required = true)]
        subjects: PathBuf,

        /// Output CSV (required)
        #[clap(short = 'o', long = "out", required = true)]
        out: PathBuf,

        /// Maximum neighbours per query
        #[clap(short = 'n', long = "num_neighbours", default_value = "10")]
        num_neighbours: usize,

        /// Exclude neighbours more than this many times the closest distance, set to 0 to disable
        #[clap(long = "max_ratio", default_value = "2.0")]
        max_ratio: f64,

        /// Only use queries whose genome prefix starts with one of these (comma-delimited)
        #[clap(long = "query_filter")]
        query_filter: Option<String>,

        /// Optional file where unique neighbour IDs will be saved
        #[clap(long = "extract_list")]
        extract_list: Option<PathBuf>,

        /// Number of CPU threads
        #[clap(long = "threads", default_value = "8")]
        threads: usize,
    },

    /// place queries in a tree and classify their closest neighbours
    Placements {
        /// Newick gene tree (required)
        #[clap(short = 't', long = "tree", required = true)]
        tree: PathBuf,

        /// Comma-delimited leaf name prefixes that identify queries
        #[clap(short = 'p', long = "query_prefixes", default_value = "Hype,Klos")]
        query_prefixes: String,

        /// Output JSON (required)
        #[clap(long = "out_json", required = true)]
        out_json: PathBuf,

        /// Output CSV (required)
        #[clap(long = "out_csv", required = true)]
        out_csv: PathBuf,

        /// Maximum neighbours per query
        #[clap(short = 'n', long = "num_neighbours", default_value = "5")]
        num_neighbours: usize,

        /// Neighbours closer than this distance are treated as self hits
        #[clap(long = "self_hit_threshold", default_value = "0.001")]
        self_hit_threshold: f64,

        /// Exclude neighbours more than this many times the closest distance, set to 0 to disable
        /// (placement runs made before this option existed had no cutoff)
        #[clap(long = "max_ratio", default_value = "2.0")]
        max_ratio: f64,

        /// Optional taxonomy table
        #[clap(short = 'x', long = "taxonomy")]
        taxonomy: Option<PathBuf>,

        /// Taxonomic rank used to group neighbours
        #[clap(long = "rank", value_enum, default_value = "domain")]
        rank: Rank,

        /// Don't guess taxonomy from accession prefixes when the table has no entry
        #[clap(long = "no_patterns")]
        no_patterns: bool,

        /// Number of CPU threads
        #[clap(long = "threads", default_value = "8")]
        threads: usize,
    },

    /// per-query distances to other queries and to each taxonomic category
    Stats {
        /// Newick gene tree (required)
        #[clap(short = 't', long = "tree", required = true)]
        tree: PathBuf,

        /// Taxonomy table (required)
        #[clap(short = 'x', long = "taxonomy", required = true)]
        taxonomy: PathBuf,

        /// Query sequences in FASTA format (required)
        #[clap(short = 'q', long = "query", required = true)]
        query: PathBuf,

        /// Output TSV (required)
        #[clap(short = 'o', long = "out", required = true)]
        out: PathBuf,

        /// Number of CPU threads
        #[clap(long = "threads", default_value = "8")]
        threads: usize,
    },
}


fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Annotate { in_csv, taxonomy, out_csv, assignments }) => {
            annotate::annotate(in_csv, taxonomy, out_csv, assignments);
        },
        Some(Commands::Decorate { tree, taxonomy, query, out_dir }) => {
            decorate::decorate(tree, taxonomy, query, out_dir);
        },
        Some(Commands::Neighbours { tree, query, subjects, out, num_neighbours, max_ratio,
                                    query_filter, extract_list, threads }) => {
            neighbours::neighbours(tree, query, subjects, out, num_neighbours, max_ratio,
                                   query_filter, extract_list, threads);
        },
        Some(Commands::Placements { tree, query_prefixes, out_json, out_csv, num_neighbours,
                                    self_hit_threshold, max_ratio, taxonomy, rank, no_patterns,
                                    threads }) => {
            placements::placements(tree, query_prefixes, out_json, out_csv, num_neighbours,
                                   self_hit_threshold, max_ratio, taxonomy, rank, no_patterns,
                                   threads);
        },
        Some(Commands::Stats { tree, taxonomy, query, out, threads }) => {
            stats::stats(tree, taxonomy, query, out, threads);
        },
        None => {}
    }
}
