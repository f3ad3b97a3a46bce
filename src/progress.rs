//! Progress reporting for the pipeline
//!
//! Provides a live spinner (indicatif) while the run is in flight and a
//! printed summary once it finishes.

use crate::reader::ReaderStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner-based progress display
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the display from the reader counters
    pub fn update(&self, stats: &ReaderStats, total_files: u64, shards_pending: usize) {
        let msg = format!(
            "Files: {}/{} | Lines: {} | Skipped: {} | Read: {} | Pending shards: {}",
            stats.files_processed() + stats.files_failed(),
            total_files,
            format_number(stats.lines_read()),
            format_number(stats.lines_skipped()),
            format_size(stats.bytes_read(), BINARY),
            shards_pending,
        );
        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a banner before the run starts
pub fn print_header(input: &str, readers: usize, output: &str) {
    println!("{}", style("ndjson2sqlite").bold());
    println!("  input:   {}", input);
    println!("  readers: {}", readers);
    println!("  output:  {}", output);
}

/// Print a summary of the finished run
pub fn print_summary(report: &crate::pipeline::PipelineReport) {
    let secs = report.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        report.lines_read as f64 / secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Run complete").bold().green());
    println!(
        "  files:   {} processed, {} failed",
        format_number(report.files_processed),
        format_number(report.files_failed)
    );
    println!(
        "  lines:   {} read, {} skipped ({})",
        format_number(report.lines_read),
        format_number(report.lines_skipped),
        format_size(report.bytes_read, BINARY)
    );
    println!(
        "  rows:    {}",
        format_number(report.rows_written)
    );
    println!(
        "  merges:  {} rounds, {} shards absorbed",
        report.merge_rounds, report.shards_absorbed
    );
    println!("  elapsed: {:.1}s ({:.0} lines/s)", secs, rate);
    println!("  output:  {}", report.output.display());
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
