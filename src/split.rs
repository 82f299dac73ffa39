//! Partitioning of one physical table into per-record-type row subsets.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::schema::SchemaDocument;
use crate::types::RawDataset;

/// How a physical table maps onto record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingStrategy {
    /// No discriminator column: the whole table is the default record type.
    SingleType,
    /// Rows are routed by the discriminator column.
    MultiType,
}

/// Structure of a physical table, as seen by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAnalysis {
    pub has_record_type: bool,
    /// Distinct non-empty discriminator values in first-seen order.
    pub record_types: Vec<String>,
    pub record_type_counts: BTreeMap<String, usize>,
    pub strategy: LoadingStrategy,
    pub total_rows: usize,
    pub columns: Vec<String>,
}

impl SourceAnalysis {
    /// Inspect `raw` for the discriminator column `discriminator`.
    pub fn of(raw: &RawDataset, discriminator: &str) -> Self {
        let mut analysis = Self {
            has_record_type: false,
            record_types: Vec::new(),
            record_type_counts: BTreeMap::new(),
            strategy: LoadingStrategy::SingleType,
            total_rows: raw.row_count(),
            columns: raw.columns.clone(),
        };

        if let Some(values) = raw.column(discriminator) {
            analysis.has_record_type = true;
            analysis.strategy = LoadingStrategy::MultiType;
            for value in values.filter_map(|v| v.as_text()) {
                let count = analysis.record_type_counts.entry(value.clone()).or_insert(0);
                if *count == 0 {
                    analysis.record_types.push(value);
                }
                *count += 1;
            }
        }
        analysis
    }
}

/// Result of splitting one table.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    pub analysis: SourceAnalysis,
    /// Carved subsets for known record types, in first-seen order.
    pub parts: Vec<(String, RawDataset)>,
    /// Skipped discriminator values and rows.
    pub warnings: Vec<String>,
}

/// Routes rows of a physical table to the record types of a schema.
#[derive(Debug, Clone, Copy)]
pub struct RecordTypeSplitter<'a> {
    schema: &'a SchemaDocument,
}

impl<'a> RecordTypeSplitter<'a> {
    pub fn new(schema: &'a SchemaDocument) -> Self {
        Self { schema }
    }

    /// Split `raw` into one dataset per known record type.
    ///
    /// Without a discriminator column the whole table is the schema's default record type.
    /// With one, rows are grouped by value; values with no record type are skipped with a
    /// warning each, and the discriminator column is dropped from the carved datasets.
    pub fn split(&self, raw: &RawDataset) -> SplitOutcome {
        let discriminator = self.schema.settings.record_type_column.as_str();
        let analysis = SourceAnalysis::of(raw, discriminator);
        let mut warnings = Vec::new();

        if analysis.strategy == LoadingStrategy::SingleType {
            let default = self.schema.settings.default_record_type.clone();
            tracing::debug!(record_type = %default, "no discriminator column, single-type source");
            return SplitOutcome {
                analysis,
                parts: vec![(default, raw.clone())],
                warnings,
            };
        }

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut untagged = 0usize;
        if let Some(idx) = raw.index_of(discriminator) {
            for (row_idx, row) in raw.rows.iter().enumerate() {
                match row.get(idx).and_then(|v| v.as_text()) {
                    Some(value) => groups.entry(value).or_default().push(row_idx),
                    None => untagged += 1,
                }
            }
        }
        if untagged > 0 {
            warnings.push(format!(
                "{untagged} row(s) with an empty '{discriminator}' value were skipped"
            ));
        }

        let mut parts = Vec::new();
        for value in &analysis.record_types {
            let Some(indices) = groups.get(value) else {
                continue;
            };
            if self.schema.record_type(value).is_none() {
                tracing::warn!(record_type = %value, rows = indices.len(), "unknown record type skipped");
                warnings.push(format!(
                    "unknown record type '{value}' ({} row(s)) skipped",
                    indices.len()
                ));
                continue;
            }
            parts.push((value.clone(), raw.take_rows(indices, Some(discriminator))));
        }

        SplitOutcome {
            analysis,
            parts,
            warnings,
        }
    }
}

/// Rows of `raw` whose `column` equals `value`, with `column` dropped.
pub fn carve(raw: &RawDataset, column: &str, value: &str) -> RawDataset {
    let indices: Vec<usize> = match raw.column(column) {
        Some(values) => values
            .enumerate()
            .filter(|(_, v)| v.as_text().as_deref() == Some(value))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };
    raw.take_rows(&indices, Some(column))
}
