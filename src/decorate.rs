// This file contains the code for the cladeseek decorate subcommand, which colours a gene tree by
// broad taxonomic category and writes the result as iTOL annotation files.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashSet;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::log::{section_header, explanation, warning};
use crate::misc::{check_if_dir_is_not_dir, check_if_file_exists, create_dir, format_duration,
                  load_fasta_ids, quit_with_error};
use crate::selector::resolve_query_leaves;
use crate::taxonomy::{broad_category, classify, propagate_categories, Rank, TaxonomyTable};
use crate::tree::{load_tree_input, Order, Tree, TreeInput};


const LABELS_FILE: &str = "itol_labels.txt";
const BRANCH_COLOURS_FILE: &str = "itol_branch_colors.txt";
const QUERY_CIRCLES_FILE: &str = "itol_query_circles.txt";
const QUERY_COLOUR: &str = "#FF0000";


pub fn category_colour(category: &str) -> &'static str {
    match category {
        "Bacteria"  => "#FF0000",
        "Viruses"   => "#00FF00",
        "Eukaryota" => "#0000FF",
        "Archaea"   => "#FFFF00",
        _           => "#808080",
    }
}


pub fn decorate(tree_file: PathBuf, taxonomy_file: PathBuf, query_file: PathBuf, out_dir: PathBuf) {
    let start_time = Instant::now();
    check_settings(&tree_file, &taxonomy_file, &query_file, &out_dir);
    starting_message();
    print_settings(&tree_file, &taxonomy_file, &query_file, &out_dir);

    let table = TaxonomyTable::load(&taxonomy_file);
    eprintln!("Loaded {} taxonomy assignments", table.len());
    let query_ids = load_fasta_ids(&query_file);
    eprintln!("Loaded {} query sequences", query_ids.len());
    let tree = match load_tree_input(&tree_file) {
        Ok(TreeInput::Parsed(tree)) => tree,
        Ok(_) => quit_with_error(&format!("{} does not contain a tree", tree_file.display())),
        Err(e) => quit_with_error(&format!("failed to load tree {}\n{}", tree_file.display(), e)),
    };
    eprintln!("Loaded tree with {} leaves", tree.leaf_count());
    eprintln!();

    let categories = node_categories(&tree, &table);
    let resolved = resolve_query_leaves(&tree, &query_ids);
    for query_id in &resolved.unresolved {
        warning(&format!("query {} not found in tree", query_id));
    }
    let queries = resolved.leaf_set();

    create_dir(&out_dir);
    let files = write_itol_files(&tree, &categories, &queries, &out_dir);
    finished_message(start_time, &files);
}


fn check_settings(tree_file: &Path, taxonomy_file: &Path, query_file: &Path, out_dir: &Path) {
    check_if_file_exists(tree_file);
    check_if_file_exists(taxonomy_file);
    check_if_file_exists(query_file);
    check_if_dir_is_not_dir(out_dir);
}


fn starting_message() {
    section_header("Starting cladeseek decorate");
    explanation("This command assigns each leaf of a gene tree to a broad taxonomic category. \
                 Internal nodes take their children's category when the children agree, and are \
                 Other when they don't. The categories are saved as iTOL annotation files, \
                 along with markers for the query sequences.");
}


fn print_settings(tree_file: &Path, taxonomy_file: &Path, query_file: &Path, out_dir: &Path) {
    eprintln!("Settings:");
    eprintln!("  --tree {}", tree_file.display());
    eprintln!("  --taxonomy {}", taxonomy_file.display());
    eprintln!("  --query {}", query_file.display());
    eprintln!("  --out_dir {}", out_dir.display());
    eprintln!();
}


fn finished_message(start_time: Instant, files: &[PathBuf]) {
    section_header("Finished!");
    explanation("The annotation files can be dragged onto the tree in iTOL.");
    for f in files {
        eprintln!("  {}", f.display());
    }
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


pub fn node_categories(tree: &Tree, table: &TaxonomyTable) -> Vec<String> {
    // Leaves without a taxonomy are Other.
    propagate_categories(tree, |leaf| {
        broad_category(&classify(tree.name(leaf), table, Rank::Domain)).to_string()
    })
}


fn write_itol_files(tree: &Tree, categories: &[String], queries: &FxHashSet<usize>,
                    out_dir: &Path) -> Vec<PathBuf> {
    let labels = out_dir.join(LABELS_FILE);
    let branches = out_dir.join(BRANCH_COLOURS_FILE);
    let circles = out_dir.join(QUERY_CIRCLES_FILE);
    for (path, result) in [(&labels, write_labels(&labels, tree, categories)),
                           (&branches, write_branch_colours(&branches, tree, categories)),
                           (&circles, write_query_circles(&circles, tree, queries))] {
        if let Err(e) = result {
            quit_with_error(&format!("failed to write {}\n{}", path.display(), e));
        }
    }
    vec![labels, branches, circles]
}


fn write_labels(filename: &Path, tree: &Tree, categories: &[String]) -> io::Result<()> {
    let mut f = BufWriter::new(File::create(filename)?);
    writeln!(f, "LABELS\nSEPARATOR TAB\nDATA")?;
    for &leaf in tree.leaves() {
        writeln!(f, "{}\t{}", tree.name(leaf), categories[leaf])?;
    }
    f.flush()
}


fn write_branch_colours(filename: &Path, tree: &Tree, categories: &[String]) -> io::Result<()> {
    // iTOL needs a node ID for each line, so unnamed internal nodes can't be coloured here.
    let mut f = BufWriter::new(File::create(filename)?);
    writeln!(f, "TREE_COLORS\nSEPARATOR TAB\nDATA")?;
    let mut unnamed = 0;
    for id in tree.traverse(Order::PreOrder) {
        if id == tree.root() { continue; }
        if tree.name(id).is_empty() {
            unnamed += 1;
            continue;
        }
        writeln!(f, "{}\tbranch\t{}\tnormal\t1", tree.name(id), category_colour(&categories[id]))?;
    }
    if unnamed > 0 {
        eprintln!("{} unnamed internal node(s) left out of {}", unnamed, filename.display());
    }
    f.flush()
}


fn write_query_circles(filename: &Path, tree: &Tree, queries: &FxHashSet<usize>)
        -> io::Result<()> {
    let mut f = BufWriter::new(File::create(filename)?);
    writeln!(f, "DATASET_SYMBOL\nSEPARATOR TAB\nDATASET_LABEL\tQuery sequences\nCOLOR\t{}\n\
                 MAX_SIZE\t10\nSHOW_INTERNAL\t0\nDATA", QUERY_COLOUR)?;
    for &leaf in tree.leaves() {
        if queries.contains(&leaf) {
            writeln!(f, "{}\t1\t{}", tree.name(leaf), QUERY_COLOUR)?;
        }
    }
    f.flush()
}


#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use tempfile::tempdir;
    use super::*;

    #[test]
    fn test_category_colour() {
        assert_eq!(category_colour("Bacteria"), "#FF0000");
        assert_eq!(category_colour("Archaea"), "#FFFF00");
        assert_eq!(category_colour("Other"), "#808080");
        assert_eq!(category_colour("Unknown"), "#808080");
    }

    #[test]
    fn test_node_categories_and_itol_files() {
        let tree = Tree::from_newick("((WP_1:0.1,WP_2:0.1)bact:0.2,(XP_1:0.1,Q1:0.2):0.1);")
            .unwrap();
        let table = TaxonomyTable::from_entries(hashmap!{
            "WP_1".to_string() => "Bacteria;Bacillota".to_string(),
            "WP_2".to_string() => "Bacteria;Pseudomonadota".to_string(),
            "XP_1".to_string() => "Eukaryota;Fungi".to_string()});
        let categories = node_categories(&tree, &table);
        assert_eq!(categories[tree.root()], "Other");
        assert_eq!(categories[tree.leaf_by_name("Q1").unwrap()], "Other");
        assert_eq!(categories[tree.node(tree.leaf_by_name("WP_1").unwrap()).parent.unwrap()],
                   "Bacteria");

        let temp_dir = tempdir().unwrap();
        let queries: FxHashSet<usize> = [tree.leaf_by_name("Q1").unwrap()].into_iter().collect();
        let files = write_itol_files(&tree, &categories, &queries, temp_dir.path());
        assert_eq!(files.len(), 3);

        let labels = std::fs::read_to_string(temp_dir.path().join(LABELS_FILE)).unwrap();
        assert_eq!(labels, "LABELS\nSEPARATOR TAB\nDATA\nWP_1\tBacteria\nWP_2\tBacteria\n\
                            XP_1\tEukaryota\nQ1\tOther\n");

        let branches = std::fs::read_to_string(temp_dir.path().join(BRANCH_COLOURS_FILE))
            .unwrap();
        assert!(branches.starts_with("TREE_COLORS\nSEPARATOR TAB\nDATA\n"));
        assert!(branches.contains("bact\tbranch\t#FF0000\tnormal\t1\n"));
        assert!(branches.contains("XP_1\tbranch\t#0000FF\tnormal\t1\n"));
        assert!(branches.contains("Q1\tbranch\t#808080\tnormal\t1\n"));

        let circles = std::fs::read_to_string(temp_dir.path().join(QUERY_CIRCLES_FILE)).unwrap();
        assert!(circles.contains("DATASET_LABEL\tQuery sequences\n"));
        assert!(circles.ends_with("DATA\nQ1\t1\t#FF0000\n"));
    }
}
