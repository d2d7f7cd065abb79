use crate::chart::ChartSpec;
use crate::config::Comparison;
use crate::table::Table;
use feedback_lens_common::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: u64,
    pub percentage: f64,
}

/// Per-field frequency statistics; `value_frequency` keeps first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field: String,
    pub unique_value_count: usize,
    pub value_frequency: IndexMap<String, u64>,
}

impl FieldSummary {
    pub fn total(&self) -> u64 {
        self.value_frequency.values().sum()
    }

    pub fn count_of(&self, value: &str) -> Option<u64> {
        self.value_frequency.get(value).copied()
    }

    /// Most frequent values first; ties keep first-seen order.
    pub fn top_n(&self, n: usize) -> Vec<FrequencyEntry> {
        let total = self.total();
        let mut entries: Vec<(&String, &u64)> = self.value_frequency.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1)); // stable
        entries
            .into_iter()
            .take(n)
            .map(|(v, c)| FrequencyEntry {
                value: v.clone(),
                count: *c,
                percentage: if total > 0 {
                    *c as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect()
    }

    pub fn chart_spec(&self) -> ChartSpec {
        ChartSpec::bar(
            &self.field,
            self.value_frequency.keys().cloned().collect(),
            self.value_frequency.values().map(|&c| c as f64).collect(),
        )
    }
}

/// Count `values` in first-seen order.
pub fn tally<I>(field: &str, values: I) -> FieldSummary
where
    I: IntoIterator<Item = String>,
{
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    FieldSummary {
        field: field.to_owned(),
        unique_value_count: counts.len(),
        value_frequency: counts,
    }
}

pub fn summarize(table: &Table, field: &str) -> Result<FieldSummary> {
    // missing cells count as ""
    Ok(tally(field, table.column(field)?.map(|c| c.to_string())))
}

/// Primary field first, then each related field in order.
pub fn summarize_comparison(table: &Table, comparison: &Comparison) -> Result<Vec<FieldSummary>> {
    comparison
        .fields()
        .map(|f| summarize(table, f))
        .collect()
}
