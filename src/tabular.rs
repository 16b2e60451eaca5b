// This file contains the code for reading and writing CladeSeek's delimited result tables and the
// one-line marker files written in place of a table when there is nothing to report.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::log::warning;
use crate::misc::quit_with_error;
use crate::selector::NeighbourRecord;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    NoValidTree,
    NoHits,
    NoQueries,
    NoSubjects,
}

impl Sentinel {
    pub fn text(self) -> &'static str {
        match self {
            Sentinel::NoValidTree => "# No valid tree found",
            Sentinel::NoHits      => "# Tree indicates no hits",
            Sentinel::NoQueries   => "# No query IDs found",
            Sentinel::NoSubjects  => "# No subject IDs found",
        }
    }
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighbourRow {
    pub query: String,
    pub subject: String,
    pub gene: String,
    pub distance: f64,
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementRow {
    pub query_id: String,
    pub neighbor_id: String,
    pub distance: String,  // six decimal places, as in the neighbour table
    pub domain: String,
}


pub fn write_sentinel(filename: &Path, sentinel: Sentinel) {
    warning(&format!("{} ({})", sentinel.text().trim_start_matches("# "), filename.display()));
    let result = File::create(filename)
        .and_then(|mut f| writeln!(f, "{}", sentinel.text()));
    if let Err(e) = result {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


pub fn read_marker_line(filename: &Path) -> io::Result<Option<String>> {
    // Any file whose first line starts with '#' holds a marker (ours or an upstream error
    // message) rather than a table.
    let text = std::fs::read_to_string(filename)?;
    Ok(text.lines().next().filter(|line| line.starts_with('#')).map(|line| line.to_string()))
}


pub fn write_neighbour_table(filename: &Path, records: &[NeighbourRecord], gene: &str) {
    if let Err(e) = try_write_neighbour_table(filename, records, gene) {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


fn try_write_neighbour_table(filename: &Path, records: &[NeighbourRecord], gene: &str)
        -> Result<(), csv::Error> {
    // Distances are written with six decimal places, regardless of their magnitude.
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record(["query", "subject", "gene", "distance"])?;
    for r in records {
        let distance = format!("{:.6}", r.distance);
        writer.write_record([r.query_id.as_str(), r.neighbour_id.as_str(), gene, &distance])?;
    }
    writer.flush()?;
    Ok(())
}


pub fn read_neighbour_table(filename: &Path) -> Result<Vec<NeighbourRow>, csv::Error> {
    // Marker files start with '#', so they read back as an empty table.
    let mut reader = csv::ReaderBuilder::new().comment(Some(b'#')).from_path(filename)?;
    reader.deserialize().collect()
}


pub fn write_placement_table(filename: &Path, rows: &[PlacementRow]) {
    if let Err(e) = try_write_placement_table(filename, rows) {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


fn try_write_placement_table(filename: &Path, rows: &[PlacementRow]) -> Result<(), csv::Error> {
    // The header comes from the first serialized row, so an empty table needs it written by hand.
    let mut writer = csv::Writer::from_path(filename)?;
    if rows.is_empty() {
        writer.write_record(["query_id", "neighbor_id", "distance", "domain"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}


pub fn write_tsv(filename: &Path, header: &[String], rows: &[Vec<String>]) {
    if let Err(e) = try_write_tsv(filename, header, rows) {
        quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
    }
}


fn try_write_tsv(filename: &Path, header: &[String], rows: &[Vec<String>])
        -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(filename)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
