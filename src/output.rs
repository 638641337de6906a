//! Tab-separated output table.
//!
//! One header line for the whole run, then one data row per emitted frame.
//! Every numeric cell is printed with three decimal places; frame times are
//! in milliseconds while segment boundaries stay in seconds, matching the
//! reference output files.

use std::io::Write;

use crate::config::Configuration;
use crate::error::PipelineError;

/// A single output row before formatting. Label fields are always populated;
/// whether they are printed is the writer's decision.
#[derive(Debug)]
pub struct OutputRow<'a> {
    pub filename: &'a str,
    pub label: &'a str,
    pub seg_start_ms: f64,
    pub seg_end_ms: f64,
    pub t_ms: f64,
    pub values: &'a [f64],
}

/// Streams the table to any `Write` sink.
pub struct TableWriter<'w> {
    out: &'w mut dyn Write,
    labels_visible: bool,
    nan_token: String,
    header_pending: bool,
}

impl<'w> TableWriter<'w> {
    pub fn new(out: &'w mut dyn Write, cfg: &Configuration) -> Self {
        Self {
            out,
            labels_visible: cfg.labels_visible(),
            nan_token: cfg.nan_token.clone(),
            header_pending: true,
        }
    }

    /// Writes the header if it has not been written yet. Called once per
    /// input file; only the first call emits anything, so multi-file runs
    /// share a single header.
    pub fn write_header(&mut self, columns: &[String]) -> Result<(), PipelineError> {
        if !self.header_pending {
            return Ok(());
        }
        self.header_pending = false;
        let mut fields: Vec<&str> = vec!["Filename"];
        if self.labels_visible {
            fields.extend(["Label", "seg_Start", "seg_End"]);
        }
        fields.push("t_ms");
        fields.extend(columns.iter().map(|c| c.as_str()));
        writeln!(self.out, "{}", fields.join("\t"))
            .map_err(|e| PipelineError::io("writing output table", e))
    }

    pub fn write_row(&mut self, row: &OutputRow<'_>) -> Result<(), PipelineError> {
        let mut line = String::with_capacity(64);
        line.push_str(row.filename);
        if self.labels_visible {
            line.push('\t');
            line.push_str(row.label);
            // Segment boundaries are reported in seconds.
            line.push_str(&format!(
                "\t{:.3}\t{:.3}",
                row.seg_start_ms / 1000.0,
                row.seg_end_ms / 1000.0
            ));
        }
        line.push_str(&format!("\t{:.3}", row.t_ms));
        for &v in row.values {
            line.push('\t');
            if v.is_nan() {
                line.push_str(&self.nan_token);
            } else {
                line.push_str(&format!("{v:.3}"));
            }
        }
        writeln!(self.out, "{line}").map_err(|e| PipelineError::io("writing output table", e))
    }
}
