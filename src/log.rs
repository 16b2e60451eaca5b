// This file contains functions for writing CladeSeek's progress messages to stderr.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use colored::Colorize;


const MAX_WIDTH: usize = 100;


pub fn section_header(text: &str) {
    eprintln!();
    eprintln!("{}", text.bold().bright_yellow().underline());
}


pub fn explanation(text: &str) {
    // Explanations are wrapped to the terminal width (up to a limit) and dimmed so they stand
    // apart from the actual results.
    for line in textwrap::wrap(text, terminal_width()) {
        eprintln!("{}", line.dimmed());
    }
    eprintln!();
}


pub fn warning(text: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), text);
}


fn terminal_width() -> usize {
    match term_size::dimensions_stderr() {
        Some((w, _)) => w.min(MAX_WIDTH),
        None         => MAX_WIDTH,
    }
}
