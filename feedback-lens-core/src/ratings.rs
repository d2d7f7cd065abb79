//! Likert-scale breakdowns for survey exports whose question headers look like
//! `"Faculty [Explains clearly]"`.

use crate::chart::{ChartSeries, ChartSpec};
use crate::config::RatingsScope;
use crate::table::{Cell, Table};
use feedback_lens_common::Result;
use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

static RE_BRACKET: OnceLock<Regex> = OnceLock::new();
static RE_CATEGORY: OnceLock<Regex> = OnceLock::new();

fn re_bracket() -> &'static Regex { RE_BRACKET.get_or_init(|| Regex::new(r"\[([^\]]+)\]").unwrap()) }
fn re_category() -> &'static Regex { RE_CATEGORY.get_or_init(|| Regex::new(r"^([^\[]+)").unwrap()) }

/// Scores reported, highest first.
pub const SCORES: [u8; 4] = [4, 3, 2, 1];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub columns: Vec<String>,
}

/// Text inside the first `[...]`, or the whole header.
pub fn question_label(header: &str) -> &str {
    re_bracket()
        .captures(header)
        .and_then(|c| c.get(1))
        .map_or(header, |m| m.as_str())
}

/// Text before the first `[`, trimmed.
pub fn category_name(header: &str) -> &str {
    re_category()
        .captures(header.trim())
        .and_then(|c| c.get(1))
        .map_or(header, |m| m.as_str().trim())
}

/// Groups bracketed question headers under their category; other headers stand alone.
/// Categories keep first-appearance order.
pub fn group_columns_by_category(header: &[String]) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for col in header {
        let category = if col.contains('[') && col.contains(']') {
            category_name(col)
        } else {
            col.as_str()
        };
        match groups.iter_mut().find(|g| g.category == category) {
            Some(g) => g.columns.push(col.clone()),
            None => groups.push(CategoryGroup {
                category: category.to_owned(),
                columns: vec![col.clone()],
            }),
        }
    }
    groups
}

/// A rating column has numeric values and its smallest one is a valid 1..=5 score.
pub fn is_likert_column(table: &Table, column: &str) -> Result<bool> {
    let min = table
        .column(column)?
        .filter_map(Cell::as_f64)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))));
    Ok(matches!(min, Some(m) if (1.0..=5.0).contains(&m)))
}

/// Category groups narrowed to their Likert columns; groups left empty are dropped.
pub fn likert_groups(table: &Table) -> Result<Vec<CategoryGroup>> {
    let mut out = Vec::new();
    for group in group_columns_by_category(table.header()) {
        let mut columns = Vec::new();
        for col in group.columns {
            if is_likert_column(table, &col)? {
                columns.push(col);
            }
        }
        if !columns.is_empty() {
            out.push(CategoryGroup {
                category: group.category,
                columns,
            });
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingRow {
    pub question: String,
    pub total: u64,
    /// Counts for scores 4, 3, 2, 1.
    pub counts: [u64; 4],
    pub percentages: [f64; 4],
}

impl RatingRow {
    fn from_counts(question: &str, counts: [u64; 4]) -> Self {
        let total: u64 = counts.iter().sum();
        let percentages = counts.map(|c| {
            if total == 0 {
                0.0
            } else {
                (c as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
            }
        });
        Self {
            question: question.to_owned(),
            total,
            counts,
            percentages,
        }
    }

    /// Cells in table order: question, total, then count and percentage per score.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.question.clone(), self.total.to_string()];
        for (count, pct) in self.counts.iter().zip(&self.percentages) {
            cells.push(count.to_string());
            cells.push(format_percent(*pct));
        }
        cells
    }
}

fn format_percent(p: f64) -> String {
    let s = format!("{p:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBreakdown {
    pub category: String,
    pub rows: Vec<RatingRow>,
}

impl RatingBreakdown {
    pub const COLUMNS: [&'static str; 10] = [
        "Category", "Total", "4", "% of 4", "3", "% of 3", "2", "% of 2", "1", "% of 1",
    ];

    pub fn score_totals(&self) -> [u64; 4] {
        let mut totals = [0; 4];
        for row in &self.rows {
            for (t, c) in totals.iter_mut().zip(row.counts) {
                *t += c;
            }
        }
        totals
    }

    /// Questions along the x axis, one bar per score (4..=1) within each question.
    pub fn chart_spec(&self, subtitle: &str) -> ChartSpec {
        let series = SCORES
            .iter()
            .enumerate()
            .map(|(i, score)| ChartSeries {
                name: score.to_string(),
                values: self.rows.iter().map(|r| r.counts[i] as f64).collect(),
            })
            .collect();
        ChartSpec::grouped(
            &format!("{} Ratings - {subtitle}", self.category),
            self.rows.iter().map(|r| r.question.clone()).collect(),
            series,
        )
        .with_y_label("No. of Responses")
    }
}

/// Counts integer scores 4..=1 per question column; decimals are truncated and
/// anything outside 1..=4 is ignored.
pub fn score_breakdown(table: &Table, category: &str, columns: &[String]) -> Result<RatingBreakdown> {
    let mut rows = Vec::with_capacity(columns.len());
    for col in columns {
        let mut counts = [0u64; 4];
        for v in table.column(col)?.filter_map(Cell::as_f64) {
            let score = v.trunc() as i64;
            if (1..=4).contains(&score) {
                counts[(4 - score) as usize] += 1;
            }
        }
        rows.push(RatingRow::from_counts(question_label(col), counts));
    }
    Ok(RatingBreakdown {
        category: category.to_owned(),
        rows,
    })
}

pub fn branch_column(table: &Table) -> Option<&str> {
    table.find_field_containing("branch")
}

/// One sub-table per distinct non-empty branch value, in first-seen order.
pub fn split_by_branch(table: &Table, column: &str) -> Result<Vec<(String, Table)>> {
    let idx = table.column_index(column)?;
    let branches: IndexSet<String> = table
        .column(column)?
        .filter(|cell| !cell.is_empty())
        .map(|cell| cell.to_string())
        .collect();
    Ok(branches
        .into_iter()
        .map(|b| {
            let sub = table.filter_rows(|row| row[idx].to_string() == b);
            (b, sub)
        })
        .collect())
}

/// One ratings report to produce: who it is for and the rows it covers.
#[derive(Debug, Clone)]
pub struct RatingsTarget {
    pub name: &'static str,
    pub value: String,
    pub table: Table,
}

impl RatingsTarget {
    pub fn file_name(&self) -> String {
        report_file_name(self.name, &self.value)
    }

    /// `file_name()` without the `_report.pdf` tail.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.name, safe_file_value(&self.value))
    }

    pub fn subtitle(&self) -> String {
        format!("{}_{}", self.name, self.value)
    }
}

/// Expands a scope into the reports it asks for. Branch scopes without a branch
/// column fall back to the overall report.
pub fn plan_targets(table: &Table, scope: RatingsScope) -> Result<Vec<RatingsTarget>> {
    let overall = || RatingsTarget {
        name: "Overall",
        value: "All_Students".to_owned(),
        table: table.clone(),
    };
    let branch_col = match (scope, branch_column(table)) {
        (RatingsScope::Overall, _) => return Ok(vec![overall()]),
        (_, None) => {
            tracing::warn!(?scope, "no branch column; producing the overall report only");
            return Ok(vec![overall()]);
        }
        (_, Some(col)) => col,
    };
    let mut targets = Vec::new();
    if scope == RatingsScope::Both {
        targets.push(overall());
    }
    for (value, sub) in split_by_branch(table, branch_col)? {
        targets.push(RatingsTarget {
            name: "Branch",
            value,
            table: sub,
        });
    }
    Ok(targets)
}

/// Replaces characters that would break a flat archive path.
pub fn safe_file_value(value: &str) -> String {
    value.replace(' ', "_").replace('/', "-").replace('.', "_")
}

pub fn report_file_name(name: &str, value: &str) -> String {
    format!("{name}_{}_report.pdf", safe_file_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> Table {
        Table::from_rows(vec![
            vec![
                "Branch".into(),
                "Faculty [Explains clearly]".into(),
                "Faculty [On time]".into(),
                "Campus [Library]".into(),
                "Roll No".into(),
                "Suggestions".into(),
            ],
            vec!["CSE".into(), 4i64.into(), 3i64.into(), 2i64.into(), 1001i64.into(), "More labs".into()],
            vec!["ECE".into(), 4i64.into(), 4i64.into(), 1i64.into(), 1002i64.into(), Cell::Empty],
            vec!["CSE".into(), 2i64.into(), 5i64.into(), 3.6.into(), 1003i64.into(), "Wifi".into()],
            vec![Cell::Empty, 1i64.into(), "n/a".into(), 4i64.into(), 1004i64.into(), Cell::Empty],
        ])
    }

    #[test]
    fn labels_from_brackets() {
        assert_eq!(question_label("Faculty [Explains clearly]"), "Explains clearly");
        assert_eq!(question_label("Roll No"), "Roll No");
        assert_eq!(category_name("  Faculty [x]"), "Faculty");
    }

    #[test]
    fn grouping_keeps_first_appearance() {
        let t = survey();
        let groups = group_columns_by_category(t.header());
        let names: Vec<_> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, ["Branch", "Faculty", "Campus", "Roll No", "Suggestions"]);
        assert_eq!(groups[1].columns.len(), 2);
    }

    #[test]
    fn likert_filter_drops_ids_and_text() {
        let t = survey();
        let groups = likert_groups(&t).unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, ["Faculty", "Campus"]);
        assert!(!is_likert_column(&t, "Roll No").unwrap());
        assert!(!is_likert_column(&t, "Suggestions").unwrap());
    }

    #[test]
    fn breakdown_counts_and_percentages() {
        let t = survey();
        let cols = vec!["Faculty [Explains clearly]".to_string(), "Faculty [On time]".to_string()];
        let b = score_breakdown(&t, "Faculty", &cols).unwrap();
        assert_eq!(b.rows[0].question, "Explains clearly");
        assert_eq!(b.rows[0].counts, [2, 0, 1, 1]);
        assert_eq!(b.rows[0].total, 4);
        assert_eq!(b.rows[0].percentages, [50.0, 0.0, 25.0, 25.0]);
        // the 5 is outside the reported range, "n/a" is not numeric
        assert_eq!(b.rows[1].counts, [1, 1, 0, 0]);
        assert_eq!(b.score_totals(), [3, 1, 1, 1]);
        let spec = b.chart_spec("Overall_All_Students");
        assert_eq!(spec.labels, ["Explains clearly", "On time"]);
        let names: Vec<_> = spec.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["4", "3", "2", "1"]);
        assert_eq!(spec.series[0].values, [2.0, 1.0]);
        assert_eq!(spec.series[1].values, [0.0, 1.0]);
        assert_eq!(spec.series[3].values, [1.0, 0.0]);
        assert_eq!(spec.title, "Faculty Ratings - Overall_All_Students");
        assert_eq!(spec.y_label.as_deref(), Some("No. of Responses"));
        spec.validate().unwrap();
    }

    #[test]
    fn decimals_truncate_and_percentages_round() {
        let t = survey();
        let b = score_breakdown(&t, "Campus", &["Campus [Library]".to_string()]).unwrap();
        assert_eq!(b.rows[0].counts, [1, 1, 1, 1]);
        let row = RatingRow::from_counts("q", [1, 1, 1, 0]);
        assert_eq!(row.percentages[0], 33.33);
        assert_eq!(row.cells(), ["q", "3", "1", "33.33", "1", "33.33", "1", "33.33", "0", "0"]);
        assert_eq!(RatingRow::from_counts("q", [0; 4]).percentages, [0.0; 4]);
    }

    #[test]
    fn branch_split_skips_empty_values() {
        let t = survey();
        let parts = split_by_branch(&t, "Branch").unwrap();
        let names: Vec<_> = parts.iter().map(|(b, _)| b.as_str()).collect();
        assert_eq!(names, ["CSE", "ECE"]);
        assert_eq!(parts[0].1.record_count(), 2);
        assert_eq!(parts[1].1.record_count(), 1);
    }

    #[test]
    fn scopes_expand_to_targets() {
        let t = survey();
        let files = |scope| -> Vec<String> {
            plan_targets(&t, scope)
                .unwrap()
                .iter()
                .map(RatingsTarget::file_name)
                .collect()
        };
        assert_eq!(files(RatingsScope::Overall), ["Overall_All_Students_report.pdf"]);
        assert_eq!(
            files(RatingsScope::Branch),
            ["Branch_CSE_report.pdf", "Branch_ECE_report.pdf"]
        );
        assert_eq!(files(RatingsScope::Both).len(), 3);
    }

    #[test]
    fn branch_scope_without_branch_column_falls_back() {
        let t = Table::from_rows(vec![
            vec!["Faculty [Pace]".into()],
            vec![3i64.into()],
        ]);
        let targets = plan_targets(&t, RatingsScope::Both).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "Overall");
    }

    #[test]
    fn safe_names() {
        assert_eq!(safe_file_value("B.Tech CSE/AI"), "B_Tech_CSE-AI");
        assert_eq!(report_file_name("Branch", "M.Sc"), "Branch_M_Sc_report.pdf");
    }
}
