// This file contains miscellaneous functions used by various parts of CladeSeek.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use indicatif::{ProgressBar, ProgressStyle};
use flate2::read::MultiGzDecoder;
use rayon::ThreadPoolBuilder;
use std::fs::{File, create_dir_all};
use std::io;
use std::io::{prelude::*, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::log::warning;


pub fn create_dir(dir_path: &Path) {
    match create_dir_all(dir_path) {
        Ok(_) => {},
        Err(e) => quit_with_error(&format!("failed to create directory {}\n{}", dir_path.display(), e)),
    }
}


pub fn load_file_lines(filename: &Path) -> Vec<String> {
    let text = read_text_maybe_gzipped(filename).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to read file {}\n{}", filename.display(), e));
    });
    text.lines().map(|l| l.to_string()).collect()
}


pub fn load_fasta_ids(filename: &Path) -> Vec<String> {
    // Returns the ID (header text up to the first whitespace) of each FASTA record, in file
    // order. Sequences themselves are not needed here, so they are not kept.
    let mut ids = Vec::new();
    for line in load_file_lines(filename) {
        if let Some(header) = line.strip_prefix('>') {
            match header.split_whitespace().next() {
                Some(id) => ids.push(id.to_string()),
                None     => quit_with_error(&format!("{} has an unnamed sequence", filename.display())),
            }
        }
    }
    ids
}


pub fn load_id_list(filename: &Path) -> Vec<String> {
    // One ID per line, blank lines ignored.
    load_file_lines(filename).iter().map(|l| l.trim())
        .filter(|l| !l.is_empty()).map(|l| l.to_string()).collect()
}


pub fn check_if_file_exists(filename: &Path) {
    // Quits with an error if the given path is not an existing file.
    if !filename.exists() {
        quit_with_error(&format!("file does not exist: {}", filename.display()));
    }
    if !filename.is_file() {
        quit_with_error(&format!("{} is not a file", filename.display()));
    }
}


pub fn check_if_dir_is_not_dir(dir: &Path) {
    // Quits with an error if the given path exists but is not a directory (not existing is okay).
    if dir.exists() && !dir.is_dir() {
        quit_with_error(&format!("{} exists but is not a directory", dir.display()));
    }
}


pub fn check_threads(threads: usize) {
    if threads < 1   { quit_with_error("--threads cannot be less than 1"); }
    if threads > 100 { quit_with_error("--threads cannot be greater than 100"); }
}


pub fn init_thread_pool(threads: usize) {
    // The global pool can only be built once per process. Later calls (e.g. several subcommands
    // run from one test binary) keep the existing pool, so its size is checked afterwards.
    let built = ThreadPoolBuilder::new().num_threads(threads).build_global();
    if let Some(message) = thread_count_mismatch(threads, rayon::current_num_threads(),
                                                 built.err()) {
        warning(&message);
    }
}


fn thread_count_mismatch(requested: usize, actual: usize,
                         error: Option<rayon::ThreadPoolBuildError>) -> Option<String> {
    if requested == actual { return None; }
    let mut message = format!("using {} thread(s) instead of the requested {}", actual, requested);
    if let Some(e) = error {
        message.push_str(&format!(" ({})", e));
    }
    Some(message)
}


#[cfg(not(test))]
pub fn quit_with_error(text: &str) -> ! {
    // For friendly error messages, this function normally just prints the error and quits.
    eprintln!();
    eprintln!("Error: {}", text);
    std::process::exit(1);
}
#[cfg(test)]
pub fn quit_with_error(text: &str) -> ! {
    // But when running unit tests, this function instead panics so I can catch it for the test.
    panic!("{}", text);
}


fn is_file_gzipped(filename: &Path) -> io::Result<bool> {
    // Based on the first two bytes. Files shorter than that are not gzipped.
    let mut reader = BufReader::new(File::open(filename)?);
    let mut buf = [0u8; 2];
    match reader.read_exact(&mut buf) {
        Ok(_)                                               => Ok(buf[0] == 31 && buf[1] == 139),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e)                                              => Err(e),
    }
}


pub fn read_text_maybe_gzipped(filename: &Path) -> io::Result<String> {
    let file = File::open(filename)?;
    let mut reader: Box<dyn Read> = if is_file_gzipped(filename)? {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}


pub fn output_path_with_extension(path: &Path, extension: &str) -> PathBuf {
    // Swaps the final extension, e.g. neighbours.csv -> neighbours.yaml.
    path.with_extension(extension)
}


pub fn format_duration(duration: std::time::Duration) -> String {
    let microseconds = duration.as_micros() % 1000000;
    let seconds =      duration.as_micros() / 1000000 % 60;
    let minutes =      duration.as_micros() / 1000000 / 60 % 60;
    let hours =        duration.as_micros() / 1000000 / 60 / 60;
    format!("{}:{:02}:{:02}.{:06}", hours, minutes, seconds, microseconds)
}


pub fn format_float(num: f64) -> String {
    // Formats a float with up to six decimal places but then drops trailing zeros.
    let mut formatted = format!("{:.6}", num);
    if !formatted.contains('.') { return formatted }
    while formatted.ends_with('0') { formatted.pop(); }
    if formatted.ends_with('.') { formatted.pop(); }
    formatted
}


pub fn spinner(message: &str) -> ProgressBar {
    if cfg!(test) {
        ProgressBar::hidden() // don't show a spinner during unit tests
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])  // dots3 from github.com/sindresorhus/cli-spinners
                .template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb
    }
}


pub fn progress_bar(length: u64, message: &str) -> ProgressBar {
    if cfg!(test) {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(length);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(message.to_string());
        pb
    }
}
