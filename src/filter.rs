// ==============================================================================
// filter.rs - Per-Sample Variant Filter
// ==============================================================================
// Description: Relevance and range/depth predicates for one (line, sample)
//              pair, and INFO enrichment of accepted records
// Author: Matt Barham
// Created: 2025-11-22
// Modified: 2025-12-04
// Version: 1.1.0
// ==============================================================================

use thiserror::Error;

use crate::config::{ColumnLayout, FilterThresholds, RunConfiguration, FIXED_COLUMNS};
use crate::models::VariantLocus;

/// Missing-data marker for a genotype field
const MISSING: &str = ".";

/// Malformed (line, sample) unit: logged and skipped, never fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("row has {found} columns, sample column {column} is missing")]
    MissingColumn { column: usize, found: usize },

    #[error("FORMAT has {keys} keys but the genotype has {values} values")]
    FieldCountMismatch { keys: usize, values: usize },

    #[error("invalid position '{0}'")]
    InvalidPosition(String),

    #[error("depth key '{0}' not present in FORMAT")]
    MissingDepth(String),

    #[error("invalid depth '{0}'")]
    InvalidDepth(String),
}

/// Outcome of filtering one sample on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// At least one genotype field holds the missing-data marker
    Irrelevant,
    /// Position outside the window or depth not above the threshold
    OutOfRange,
    Accepted(AcceptedRecord),
}

/// Record that passed both predicates, waiting for its gene annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRecord {
    /// The fixed columns followed by this sample's genotype field
    columns: Vec<String>,
    info_index: usize,
    locus: VariantLocus,
}

impl AcceptedRecord {
    pub fn locus(&self) -> &VariantLocus {
        &self.locus
    }

    /// Output row with `;GENE=<gene>` appended to INFO, newline-terminated
    pub fn into_row(mut self, gene: &str) -> String {
        let info = &mut self.columns[self.info_index];
        info.push_str(";GENE=");
        info.push_str(gene);

        let mut row = self.columns.join("\t");
        row.push('\n');
        row
    }
}

/// Filter configured from the run configuration
#[derive(Debug, Clone)]
pub struct VariantFilter {
    layout: ColumnLayout,
    thresholds: FilterThresholds,
    depth_key: String,
    reference_version: String,
}

impl VariantFilter {
    pub fn new(
        layout: ColumnLayout,
        thresholds: FilterThresholds,
        depth_key: impl Into<String>,
        reference_version: impl Into<String>,
    ) -> Self {
        Self {
            layout,
            thresholds,
            depth_key: depth_key.into(),
            reference_version: reference_version.into(),
        }
    }

    pub fn from_config(config: &RunConfiguration) -> Self {
        Self::new(
            config.columns,
            config.thresholds(),
            config.depth_key.clone(),
            config.reference_version.clone(),
        )
    }

    /// Evaluate sample number `sample_index` (0-based, in column order)
    ///
    /// `fields` is the tab-split data line.
    pub fn evaluate(&self, fields: &[&str], sample_index: usize) -> Result<Verdict, RecordError> {
        let column = FIXED_COLUMNS + sample_index;
        let genotype = fields.get(column).ok_or(RecordError::MissingColumn {
            column,
            found: fields.len(),
        })?;

        let raw_position = fields[self.layout.position];
        let position: u64 = raw_position
            .parse()
            .map_err(|_| RecordError::InvalidPosition(raw_position.to_string()))?;

        let keys: Vec<&str> = fields[self.layout.format].split(':').collect();
        let values: Vec<&str> = genotype.split(':').collect();
        if keys.len() != values.len() {
            return Err(RecordError::FieldCountMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        if values.iter().any(|value| *value == MISSING) {
            return Ok(Verdict::Irrelevant);
        }

        let raw_depth = keys
            .iter()
            .position(|key| *key == self.depth_key)
            .map(|i| values[i])
            .ok_or_else(|| RecordError::MissingDepth(self.depth_key.clone()))?;
        let depth: i64 = raw_depth
            .parse()
            .map_err(|_| RecordError::InvalidDepth(raw_depth.to_string()))?;

        if !self.in_range(position, depth) {
            return Ok(Verdict::OutOfRange);
        }

        let mut columns: Vec<String> = fields[..FIXED_COLUMNS]
            .iter()
            .map(|field| field.to_string())
            .collect();
        columns.push(genotype.to_string());

        let locus = VariantLocus::new(
            fields[self.layout.chromosome],
            position,
            fields[self.layout.reference],
            fields[self.layout.alternate],
            self.reference_version.as_str(),
        );

        Ok(Verdict::Accepted(AcceptedRecord {
            columns,
            info_index: self.layout.info,
            locus,
        }))
    }

    /// Inclusive position window, strictly greater depth
    fn in_range(&self, position: u64, depth: i64) -> bool {
        self.thresholds.start <= position
            && position <= self.thresholds.end
            && depth > self.thresholds.min_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "chr1\t100\t.\tA\tG\t.\t.\t.\tDP:GT\t30:0/1";

    fn filter(start: u64, end: u64, min_depth: i64) -> VariantFilter {
        VariantFilter::new(
            ColumnLayout::default(),
            FilterThresholds {
                start,
                end,
                min_depth,
            },
            "DP",
            "hg19",
        )
    }

    fn evaluate(filter: &VariantFilter, line: &str, sample_index: usize) -> Result<Verdict, RecordError> {
        let fields: Vec<&str> = line.split('\t').collect();
        filter.evaluate(&fields, sample_index)
    }

    fn with_sample(genotype: &str) -> String {
        LINE.replace("30:0/1", genotype)
    }

    #[test]
    fn test_accepts_and_annotates() {
        let verdict = evaluate(&filter(1, 1000, 10), LINE, 0).unwrap();
        let record = match verdict {
            Verdict::Accepted(record) => record,
            other => panic!("Expected Accepted, got {:?}", other),
        };

        assert_eq!(record.locus(), &VariantLocus::new("chr1", 100, "A", "G", "hg19"));
        assert_eq!(
            record.into_row("BRCA2"),
            "chr1\t100\t.\tA\tG\t.\t.\t.;GENE=BRCA2\tDP:GT\t30:0/1\n"
        );
    }

    #[test]
    fn test_empty_gene_name() {
        let Verdict::Accepted(record) = evaluate(&filter(1, 1000, 10), LINE, 0).unwrap() else {
            panic!("Expected Accepted");
        };
        assert_eq!(
            record.into_row(""),
            "chr1\t100\t.\tA\tG\t.\t.\t.;GENE=\tDP:GT\t30:0/1\n"
        );
    }

    #[test]
    fn test_missing_marker_rejects_regardless_of_depth() {
        let f = filter(1, 1000, 10);
        assert_eq!(evaluate(&f, &with_sample(".:0/1"), 0), Ok(Verdict::Irrelevant));
        assert_eq!(evaluate(&f, &with_sample("30:."), 0), Ok(Verdict::Irrelevant));
        // "./." is a value, not the marker
        assert!(matches!(
            evaluate(&f, &with_sample("30:./."), 0),
            Ok(Verdict::Accepted(_))
        ));
    }

    #[test]
    fn test_depth_boundary() {
        let f = filter(1, 1000, 10);
        assert_eq!(evaluate(&f, &with_sample("5:0/1"), 0), Ok(Verdict::OutOfRange));
        assert_eq!(evaluate(&f, &with_sample("10:0/1"), 0), Ok(Verdict::OutOfRange));
        assert!(matches!(
            evaluate(&f, &with_sample("11:0/1"), 0),
            Ok(Verdict::Accepted(_))
        ));
    }

    #[test]
    fn test_position_window_is_inclusive() {
        assert!(matches!(evaluate(&filter(100, 1000, 10), LINE, 0), Ok(Verdict::Accepted(_))));
        assert!(matches!(evaluate(&filter(1, 100, 10), LINE, 0), Ok(Verdict::Accepted(_))));
        assert_eq!(evaluate(&filter(101, 1000, 10), LINE, 0), Ok(Verdict::OutOfRange));
        assert_eq!(evaluate(&filter(1, 99, 10), LINE, 0), Ok(Verdict::OutOfRange));
    }

    #[test]
    fn test_selects_requested_sample() {
        let line = format!("{}\t.:0/0\t50:1/1", LINE);
        let f = filter(1, 1000, 10);

        assert_eq!(evaluate(&f, &line, 1), Ok(Verdict::Irrelevant));
        let Verdict::Accepted(record) = evaluate(&f, &line, 2).unwrap() else {
            panic!("Expected Accepted");
        };
        assert!(record.into_row("X").ends_with("\tDP:GT\t50:1/1\n"));
    }

    #[test]
    fn test_malformed_records() {
        let f = filter(1, 1000, 10);

        assert_eq!(
            evaluate(&f, &with_sample("30"), 0),
            Err(RecordError::FieldCountMismatch { keys: 2, values: 1 })
        );
        assert_eq!(
            evaluate(&f, &with_sample("deep:0/1"), 0),
            Err(RecordError::InvalidDepth("deep".to_string()))
        );
        assert_eq!(
            evaluate(&f, &LINE.replace("\t100\t", "\tabc\t"), 0),
            Err(RecordError::InvalidPosition("abc".to_string()))
        );
        assert_eq!(
            evaluate(&f, LINE, 1),
            Err(RecordError::MissingColumn { column: 10, found: 10 })
        );

        // position is checked before relevance, so it fails for every sample
        assert_eq!(
            evaluate(&f, &LINE.replace("\t100\t", "\tabc\t").replace("30:0/1", ".:0/1"), 0),
            Err(RecordError::InvalidPosition("abc".to_string()))
        );

        let no_depth = LINE.replace("DP:GT", "AD:GT");
        assert_eq!(
            evaluate(&f, &no_depth, 0),
            Err(RecordError::MissingDepth("DP".to_string()))
        );
    }

    #[test]
    fn test_custom_layout() {
        // INFO and FORMAT swapped in a nonstandard layout
        let layout = ColumnLayout {
            format: 7,
            info: 8,
            ..ColumnLayout::default()
        };
        let f = VariantFilter::new(
            layout,
            FilterThresholds {
                start: 1,
                end: 1000,
                min_depth: 10,
            },
            "DP",
            "hg38",
        );
        let line = "chr2\t150\t.\tT\tC\t.\t.\tDP:GT\tAF=0.5\t30:0/1";
        let fields: Vec<&str> = line.split('\t').collect();

        let Verdict::Accepted(record) = f.evaluate(&fields, 0).unwrap() else {
            panic!("Expected Accepted");
        };
        assert_eq!(record.locus().reference_version, "hg38");
        assert_eq!(
            record.into_row("EGFR"),
            "chr2\t150\t.\tT\tC\t.\t.\tDP:GT\tAF=0.5;GENE=EGFR\t30:0/1\n"
        );
    }
}
