// ==============================================================================
// models.rs - Stream and Variant Data Models
// ==============================================================================
// Description: Data structures shared by the line source, filter and router
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2025-11-28
// Version: 1.1.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::FIXED_COLUMNS;

/// Meta-header lines and the column header of one input stream
///
/// Built once by the line source and shared read-only with every data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// `##` lines in stream order, without line terminators
    pub meta_lines: Vec<String>,

    /// Column names of the `#` line; positions 9+ are sample identifiers
    pub columns: Vec<String>,
}

impl StreamHeader {
    /// Sample identifiers in column order
    pub fn sample_ids(&self) -> &[String] {
        self.columns.get(FIXED_COLUMNS..).unwrap_or(&[])
    }

    /// Column header restricted to the fixed columns plus one sample
    pub fn sample_column_header(&self, sample: &str) -> String {
        let mut columns: Vec<&str> = self
            .columns
            .iter()
            .take(FIXED_COLUMNS)
            .map(String::as_str)
            .collect();
        columns.push(sample);
        columns.join("\t")
    }
}

/// One data line of the decoded stream
#[derive(Debug, Clone)]
pub struct DataLine {
    /// 0-based position in the decoded stream, header lines included
    pub ordinal: u64,

    /// Raw tab-delimited text without the line terminator
    pub text: String,

    pub header: Arc<StreamHeader>,
}

impl DataLine {
    pub fn fields(&self) -> Vec<&str> {
        self.text.split('\t').collect()
    }
}

/// Normalized variant locus, used both as cache key and annotation request
///
/// Field order is part of the key format: both the request body and the
/// cache key list `chr`, `pos`, `ref`, `alt`, `reference_version` in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantLocus {
    #[serde(rename = "chr")]
    pub chromosome: String,

    #[serde(rename = "pos")]
    pub position: u64,

    #[serde(rename = "ref")]
    pub reference: String,

    #[serde(rename = "alt")]
    pub alternate: String,

    /// Reference genome build (e.g., "hg19")
    pub reference_version: String,
}

impl VariantLocus {
    pub fn new(
        chromosome: impl Into<String>,
        position: u64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
        reference_version: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            reference: reference.into(),
            alternate: alternate.into(),
            reference_version: reference_version.into(),
        }
    }

    /// Canonical cache key
    ///
    /// Same text as Python's `json.dumps` with default settings (`", "` and
    /// `": "` separators, non-ASCII escaped), so existing cache files keep
    /// hitting.
    pub fn cache_key(&self) -> String {
        format!(
            r#"{{"chr": {}, "pos": {}, "ref": {}, "alt": {}, "reference_version": {}}}"#,
            ascii_json_string(&self.chromosome),
            self.position,
            ascii_json_string(&self.reference),
            ascii_json_string(&self.alternate),
            ascii_json_string(&self.reference_version),
        )
    }
}

/// JSON string literal with every character outside printable ASCII escaped
fn ascii_json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');

    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units).iter() {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }

    out.push('"');
    out
}
