// This file contains the code for the cladeseek annotate subcommand, which adds a taxonomy column
// to a table of closest neighbours.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use csv::StringRecord;
use fxhash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::log::{section_header, explanation, warning};
use crate::misc::{check_if_file_exists, format_duration, quit_with_error};
use crate::tabular::read_marker_line;
use crate::taxonomy::{lookup_all, TableSource, TaxonomySource, TaxonomyTable, UNKNOWN};


const DEFAULT_OUT_NAME: &str = "closest_neighbors_with_taxonomy.csv";
const TAXONOMY_COLUMN: &str = "taxonomy";


pub fn annotate(in_csv: PathBuf, taxonomy_file: PathBuf, out_csv: Option<PathBuf>,
                assignments: Option<PathBuf>) {
    let start_time = Instant::now();
    check_settings(&in_csv, &taxonomy_file);
    let out_csv = out_csv.unwrap_or_else(|| default_out_csv(&in_csv));
    starting_message();
    print_settings(&in_csv, &taxonomy_file, &out_csv, &assignments);

    let table = Arc::new(TaxonomyTable::load(&taxonomy_file));
    eprintln!("Loaded {} taxonomy assignments", table.len());
    eprintln!();
    let source = TableSource::new(table);
    let og_name = orthogroup_name(&in_csv);
    let subjects = annotate_table(&in_csv, &out_csv, &source);
    if let Some(filename) = &assignments {
        write_assignments(filename, &og_name, &subjects);
    }
    finished_message(start_time, &out_csv, &assignments);
}


fn check_settings(in_csv: &Path, taxonomy_file: &Path) {
    check_if_file_exists(in_csv);
    check_if_file_exists(taxonomy_file);
}


fn starting_message() {
    section_header("Starting cladeseek annotate");
    explanation("This command looks up the taxonomy of every neighbour in a closest-neighbours \
                 table and writes a copy of the table with a taxonomy column. Neighbours whose \
                 lookup fails are given Unknown, with the reason in brackets.");
}


fn print_settings(in_csv: &Path, taxonomy_file: &Path, out_csv: &Path,
                  assignments: &Option<PathBuf>) {
    eprintln!("Settings:");
    eprintln!("  --in_csv {}", in_csv.display());
    eprintln!("  --taxonomy {}", taxonomy_file.display());
    eprintln!("  --out_csv {}", out_csv.display());
    if let Some(filename) = assignments {
        eprintln!("  --assignments {}", filename.display());
    }
    eprintln!();
}


fn finished_message(start_time: Instant, out_csv: &Path, assignments: &Option<PathBuf>) {
    section_header("Finished!");
    eprintln!("Annotated neighbours: {}", out_csv.display());
    if let Some(filename) = assignments {
        eprintln!("Taxonomy assignments: {}", filename.display());
    }
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


fn default_out_csv(in_csv: &Path) -> PathBuf {
    in_csv.with_file_name(DEFAULT_OUT_NAME)
}


fn orthogroup_name(in_csv: &Path) -> String {
    // Neighbour tables live in a directory named after their orthogroup.
    in_csv.parent().and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| ".".to_string())
}


pub fn annotate_table(in_csv: &Path, out_csv: &Path, source: &dyn TaxonomySource)
        -> Vec<(String, String)> {
    // Returns each distinct subject with its taxonomy, in order of first appearance. A marker
    // file (or an empty file) is passed through unchanged and gives no subjects.
    match read_marker_line(in_csv) {
        Ok(Some(marker)) => {
            warning(&format!("{} has no neighbour table ({})", in_csv.display(),
                             marker.trim_start_matches('#').trim()));
            if in_csv != out_csv {
                if let Err(e) = std::fs::copy(in_csv, out_csv) {
                    quit_with_error(&format!("failed to write {}\n{}", out_csv.display(), e));
                }
            }
            return Vec::new();
        }
        Ok(None) => {}
        Err(e) => quit_with_error(&format!("failed to read {}\n{}", in_csv.display(), e)),
    }
    let (header, rows) = read_table(in_csv);
    if header.is_empty() {
        warning(&format!("{} is empty", in_csv.display()));
        if let Err(e) = File::create(out_csv) {
            quit_with_error(&format!("failed to write {}\n{}", out_csv.display(), e));
        }
        return Vec::new();
    }
    if rows.is_empty() {
        warning(&format!("no neighbours in {}", in_csv.display()));
    }
    let subject_col = match header.iter().position(|h| h == "subject") {
        Some(i) => i,
        None => quit_with_error(&format!("{} has no subject column", in_csv.display())),
    };
    let mut seen = FxHashSet::default();
    let subjects: Vec<String> = rows.iter().filter_map(|r| r.get(subject_col))
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(|s| s.to_string()).collect();
    eprintln!("Found {} unique subject IDs", subjects.len());

    let fetched = lookup_all(source, &subjects);
    let failed = subjects.iter()
        .filter(|s| fetched.get(s).map_or(true, |t| t.starts_with(UNKNOWN))).count();
    if failed > 0 {
        warning(&format!("taxonomy lookup failed for {} of {} subjects", failed, subjects.len()));
    }
    write_annotated_table(in_csv, out_csv, &header, &rows, subject_col, &fetched);
    subjects.into_iter().map(|s| {
        let taxonomy = fetched.get(&s).unwrap_or(UNKNOWN).to_string();
        (s, taxonomy)
    }).collect()
}


fn read_table(in_csv: &Path) -> (StringRecord, Vec<StringRecord>) {
    let result = csv::ReaderBuilder::new().flexible(true).from_path(in_csv)
        .and_then(|mut reader| {
            let header = reader.headers()?.clone();
            let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
            Ok((header, rows))
        });
    match result {
        Ok(table) => table,
        Err(e) => quit_with_error(&format!("failed to read {}\n{}", in_csv.display(), e)),
    }
}


fn write_annotated_table(in_csv: &Path, out_csv: &Path, header: &StringRecord,
                         rows: &[StringRecord], subject_col: usize, fetched: &TaxonomyTable) {
    // An existing taxonomy column is replaced, otherwise one is appended.
    let existing = header.iter().position(|h| h == TAXONOMY_COLUMN);
    let writer = csv::WriterBuilder::new().flexible(true).from_path(out_csv);
    let result = writer.and_then(|mut writer| {
        writer.write_record(&with_taxonomy(header, existing, TAXONOMY_COLUMN))?;
        for row in rows {
            let Some(subject) = row.get(subject_col) else {
                warning(&format!("malformed line in {}: {:?}", in_csv.display(), row));
                writer.write_record(row)?;
                continue;
            };
            let taxonomy = fetched.get(subject).unwrap_or(UNKNOWN);
            writer.write_record(&with_taxonomy(row, existing, taxonomy))?;
        }
        writer.flush()?;
        Ok(())
    });
    if let Err(e) = result {
        quit_with_error(&format!("failed to write {}\n{}", out_csv.display(), e));
    }
}


fn with_taxonomy(record: &StringRecord, existing: Option<usize>, taxonomy: &str) -> StringRecord {
    let mut fields: Vec<&str> = record.iter().collect();
    match existing {
        Some(i) if i < fields.len() => fields[i] = taxonomy,
        _                           => fields.push(taxonomy),
    }
    StringRecord::from(fields)
}


fn write_assignments(filename: &Path, og_name: &str, subjects: &[(String, String)]) {
    let result = File::create(filename).map(BufWriter::new).and_then(|mut writer| {
        writeln!(writer, "OG\tAccession\tTaxonomy")?;
        for (accession, taxonomy) in subjects {
            writeln!(writer, "{}\t{}\t{}", og_name, accession, taxonomy)?;
        }
        writer.flush()
    });
    if let Err(e) = result {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use tempfile::tempdir;
    use super::*;
    use crate::tests::make_test_file;

    fn source() -> TableSource {
        TableSource::new(Arc::new(TaxonomyTable::from_entries(hashmap!{
            "WP_1".to_string() => "Bacteria;Bacillota".to_string(),
            "XP_2".to_string() => "Eukaryota;Fungi".to_string()})))
    }

    #[test]
    fn test_default_out_csv() {
        assert_eq!(default_out_csv(Path::new("OG1/closest_neighbors.csv")),
                   PathBuf::from("OG1/closest_neighbors_with_taxonomy.csv"));
        assert_eq!(orthogroup_name(Path::new("results/OG1/closest_neighbors.csv")), "OG1");
    }

    #[test]
    fn test_annotate_table() {
        let temp_dir = tempdir().unwrap();
        let in_csv = temp_dir.path().join("closest_neighbors.csv");
        let out_csv = temp_dir.path().join("out.csv");
        make_test_file(&in_csv, "query,subject,gene,distance\n\
                                 Q1,WP_1.1,OG1,0.100000\n\
                                 Q1,XP_2,OG1,0.200000\n\
                                 Q2,WP_1.1,OG1,0.300000\n\
                                 Q2,ZZ_9,OG1,0.400000\n");
        let subjects = annotate_table(&in_csv, &out_csv, &source());
        assert_eq!(subjects, vec![
            ("WP_1.1".to_string(), "Bacteria;Bacillota".to_string()),
            ("XP_2".to_string(), "Eukaryota;Fungi".to_string()),
            ("ZZ_9".to_string(), "Unknown (not in taxonomy table)".to_string())]);
        assert_eq!(std::fs::read_to_string(&out_csv).unwrap(),
                   "query,subject,gene,distance,taxonomy\n\
                    Q1,WP_1.1,OG1,0.100000,Bacteria;Bacillota\n\
                    Q1,XP_2,OG1,0.200000,Eukaryota;Fungi\n\
                    Q2,WP_1.1,OG1,0.300000,Bacteria;Bacillota\n\
                    Q2,ZZ_9,OG1,0.400000,Unknown (not in taxonomy table)\n");

        // Annotating an annotated table replaces the taxonomy column.
        let again = temp_dir.path().join("again.csv");
        annotate_table(&out_csv, &again, &source());
        assert_eq!(std::fs::read_to_string(&again).unwrap(),
                   std::fs::read_to_string(&out_csv).unwrap());
    }

    #[test]
    fn test_annotate_sentinel_passes_through() {
        let temp_dir = tempdir().unwrap();
        let in_csv = temp_dir.path().join("closest_neighbors.csv");
        let out_csv = temp_dir.path().join("out.csv");
        make_test_file(&in_csv, "# Tree indicates no hits\n");
        assert!(annotate_table(&in_csv, &out_csv, &source()).is_empty());
        assert_eq!(std::fs::read_to_string(&out_csv).unwrap(), "# Tree indicates no hits\n");
    }

    #[test]
    fn test_annotate_upstream_error_passes_through() {
        let temp_dir = tempdir().unwrap();
        let in_csv = temp_dir.path().join("closest_neighbors.csv");
        let out_csv = temp_dir.path().join("out.csv");
        let contents = "# Error: something failed upstream\nTraceback line\n";
        make_test_file(&in_csv, contents);
        assert!(annotate_table(&in_csv, &out_csv, &source()).is_empty());
        assert_eq!(std::fs::read_to_string(&out_csv).unwrap(), contents);
    }

    #[test]
    fn test_write_assignments() {
        let temp_dir = tempdir().unwrap();
        let tsv = temp_dir.path().join("assignments.tsv");
        write_assignments(&tsv, "OG1", &[("WP_1".to_string(), "Bacteria".to_string())]);
        assert_eq!(std::fs::read_to_string(&tsv).unwrap(),
                   "OG\tAccession\tTaxonomy\nOG1\tWP_1\tBacteria\n");
        let table = TaxonomyTable::load(&tsv);
        assert_eq!(table.get("WP_1"), Some("Bacteria"));
    }
}
