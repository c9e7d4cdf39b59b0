//! Terminal output for the CLI
//!
//! Documents go to stdout; messages go to stderr.

use colored::Colorize;
use std::io::{self, Write};

/// Prints documents, messages and tables
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    use_color: bool,
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        Self {
            use_color,
            verbosity,
        }
    }

    /// Print a rendered document as-is
    pub fn document(&self, content: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(content.as_bytes());
        if !content.ends_with('\n') {
            let _ = stdout.write_all(b"\n");
        }
        let _ = stdout.flush();
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.use_color {
            println!("{}", message.green());
        } else {
            println!("{}", message);
        }
    }

    /// Print an informational message (shown with -v)
    pub fn info(&self, message: &str) {
        if self.verbosity == 0 {
            return;
        }
        if self.use_color {
            eprintln!("{}", message.cyan());
        } else {
            eprintln!("{}", message);
        }
    }

    /// Print a table with aligned columns
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        print!("{}", self.render_table(headers, rows));
    }

    fn render_table(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = format_row(headers.iter().copied(), &widths);
        let separator = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");

        let mut out = String::new();
        if self.use_color {
            out.push_str(&format!("{}\n{}\n", header_line.bright_white().bold(), separator.bright_black()));
        } else {
            out.push_str(&format!("{}\n{}\n", header_line, separator));
        }
        for row in rows {
            out.push_str(&format_row(row.iter().map(String::as_str), &widths));
            out.push('\n');
        }
        out
    }
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{:width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}
