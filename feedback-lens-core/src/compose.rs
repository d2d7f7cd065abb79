use crate::aggregate::{summarize, FieldSummary};
use crate::config::{FeedbackType, ReportConfig};
use crate::pdf::{sanitize_text, text_width, wrap_text, write_pdf, Align, DocumentLayout, Font, PageFlow};
use crate::ratings::RatingBreakdown;
use crate::table::Table;
use chrono::{DateTime, Local};
use feedback_lens_common::{FeedbackLensError, ReportLayoutConfig, Result};
use image::{DynamicImage, RgbaImage};

const HEADER_GAP: f32 = 20.0;
const ROW_PITCH: f32 = 15.0;
const MAX_SUGGESTIONS: usize = 50;
const RECURRING_TOP: usize = 5;

// ratings table geometry
const CELL_ROW: f32 = 14.0;
const CELL_PAD: f32 = 3.0;
const QUESTION_SHARE: f32 = 0.3;

pub struct ReportComposer {
    layout: ReportLayoutConfig,
    generated_at: Option<DateTime<Local>>,
}

impl Default for ReportComposer {
    fn default() -> Self {
        Self::new(ReportLayoutConfig::default())
    }
}

impl ReportComposer {
    pub fn new(layout: ReportLayoutConfig) -> Self {
        Self {
            layout,
            generated_at: None,
        }
    }

    /// Pin the subtitle timestamp (defaults to the wall clock at compose time).
    pub fn with_generated_at(mut self, at: DateTime<Local>) -> Self {
        self.generated_at = Some(at);
        self
    }

    pub fn layout_config(&self) -> &ReportLayoutConfig {
        &self.layout
    }

    pub fn compose(&self, table: &Table, config: &ReportConfig) -> Result<Vec<u8>> {
        let layout = self.compose_layout(table, config)?;
        write_pdf(&layout)
    }

    /// Validates everything first; nothing is laid out unless the whole report can be.
    pub fn compose_layout(&self, table: &Table, config: &ReportConfig) -> Result<DocumentLayout> {
        config.validate(table)?;
        let column_width = self.column_width(table)?;
        let summaries = collect_summaries(table, config)?;

        let mut flow = PageFlow::new(&self.layout, &self.layout.title)?;
        self.title_block(&mut flow, &self.layout.title);

        flow.font(Font::Bold, 16.0)
            .text(&format!("Report Type: {}", config.heading()));
        flow.move_down(1.0);

        match config {
            ReportConfig::Generalized { comparisons } => {
                flow.font(Font::Bold, 14.0).text("Comparisons:");
                let mut n = 0;
                for cmp in comparisons {
                    let primary = &summaries[cmp.primary_field.as_str()];
                    for related in &cmp.related_fields {
                        n += 1;
                        let related = &summaries[related.as_str()];
                        flow.move_down(0.5);
                        flow.font(Font::Regular, 12.0)
                            .text(&format!("{n}. {} vs {}", primary.field, related.field));
                        flow.move_down(0.5);
                        flow.font(Font::Regular, 10.0);
                        flow.text(&unique_line(primary));
                        flow.text(&unique_line(related));
                    }
                }
            }
            ReportConfig::Fieldwise { selection } => {
                flow.font(Font::Bold, 14.0).text("Field Selection:");
                flow.move_down(0.5);
                flow.font(Font::Regular, 12.0)
                    .text(&format!("Year Field: {}", selection.year))
                    .text(&format!("Facility Field: {}", selection.facility));
                flow.move_down(1.0);
                flow.font(Font::Bold, 12.0).text("Data Summary:");
                flow.font(Font::Regular, 10.0)
                    .text(&format!("Total records: {}", table.record_count()))
                    .text(&format!(
                        "Unique years: {}",
                        summaries[selection.year.as_str()].unique_value_count
                    ))
                    .text(&format!(
                        "Unique facilities: {}",
                        summaries[selection.facility.as_str()].unique_value_count
                    ));
            }
        }

        self.sample_section(&mut flow, table, column_width);
        let layout = flow.finish();
        tracing::debug!(pages = layout.page_count(), "composed report layout");
        Ok(layout)
    }

    /// Free-text digest of the first column whose header mentions "suggestion".
    pub fn compose_suggestions(&self, table: &Table, feedback_type: FeedbackType) -> Result<Vec<u8>> {
        let layout = self.compose_suggestions_layout(table, feedback_type)?;
        write_pdf(&layout)
    }

    pub fn compose_suggestions_layout(
        &self,
        table: &Table,
        feedback_type: FeedbackType,
    ) -> Result<DocumentLayout> {
        let column = suggestion_column(table)?;
        let summary = summarize_responses(table, column)?;

        let mut flow = PageFlow::new(&self.layout, "Suggestion Summary")?;
        self.title_block(&mut flow, "Suggestion Summary");
        flow.font(Font::Bold, 16.0)
            .text(&format!("Feedback Type: {}", feedback_type.label()));
        flow.move_down(1.0);
        write_suggestion_digest(&mut flow, column, &summary);
        Ok(flow.finish())
    }

    pub fn compose_ratings(
        &self,
        table: &Table,
        name: &str,
        value: &str,
        breakdowns: &[RatingBreakdown],
        charts: Vec<RgbaImage>,
    ) -> Result<Vec<u8>> {
        let layout = self.compose_ratings_layout(table, name, value, breakdowns, charts)?;
        write_pdf(&layout)
    }

    /// Summary table per category, then one chart page per category (`charts[i]` belongs
    /// to `breakdowns[i]`), then the suggestion digest when the table has a suggestion column.
    pub fn compose_ratings_layout(
        &self,
        table: &Table,
        name: &str,
        value: &str,
        breakdowns: &[RatingBreakdown],
        charts: Vec<RgbaImage>,
    ) -> Result<DocumentLayout> {
        if charts.len() != breakdowns.len() {
            return Err(FeedbackLensError::Layout(format!(
                "{} charts for {} rating categories",
                charts.len(),
                breakdowns.len()
            )));
        }
        let suggestions = match suggestion_column(table) {
            Ok(column) => Some((column, summarize_responses(table, column)?)),
            Err(_) => None,
        };

        let mut flow = PageFlow::new(&self.layout, &format!("{name} Feedback Report: {value}"))?;
        flow.font(Font::Bold, 14.0)
            .text_aligned("Ratings Report", Align::Center);
        flow.move_down(0.5);
        flow.font(Font::Bold, 12.0)
            .text(&format!("{name} Feedback Report: {value}"));

        for breakdown in breakdowns {
            flow.move_down(1.0);
            flow.font(Font::Bold, 11.0)
                .text(&format!("{} Feedback Summary", breakdown.category));
            flow.move_down(0.5);
            ratings_table(&mut flow, breakdown);
        }

        for chart in charts {
            flow.new_page();
            flow.font(Font::Bold, 14.0)
                .text_aligned("Ratings Report", Align::Center);
            flow.move_down(1.0);
            let width = flow.content_width();
            flow.image(DynamicImage::ImageRgba8(chart).to_rgb8(), width);
        }

        if let Some((column, summary)) = suggestions {
            flow.new_page();
            flow.font(Font::Bold, 14.0).text("Suggestion Summary");
            flow.move_down(0.5);
            write_suggestion_digest(&mut flow, column, &summary);
        }
        Ok(flow.finish())
    }

    pub(crate) fn title_block(&self, flow: &mut PageFlow, title: &str) {
        let at = self.generated_at.unwrap_or_else(Local::now);
        flow.font(Font::Bold, 24.0).text_aligned(title, Align::Center);
        flow.move_down(1.0);
        flow.font(Font::Regular, 12.0).text_aligned(
            &format!("Generated on: {}", at.format("%-m/%-d/%Y")),
            Align::Center,
        );
        flow.move_down(2.0);
    }

    fn column_width(&self, table: &Table) -> Result<f32> {
        if table.width() == 0 {
            return Err(FeedbackLensError::Layout(
                "table has no header columns to lay out".into(),
            ));
        }
        Ok((self.layout.page_width - 2.0 * self.layout.margin) / table.width() as f32)
    }

    fn sample_section(&self, flow: &mut PageFlow, table: &Table, column_width: f32) {
        let rows = &table.data_rows()[..table.record_count().min(self.layout.sample_rows)];
        flow.move_down(2.0);
        flow.font(Font::Bold, 14.0).text(&format!(
            "Sample Data (First {} rows):",
            self.layout.sample_rows
        ));
        flow.move_down(1.0);

        let left = flow.margin();
        let bottom = flow.bottom();
        flow.ensure_space(HEADER_GAP + ROW_PITCH);
        let mut top = draw_grid_header(flow, table.header(), left, column_width);
        let mut row_y = top + HEADER_GAP;
        for row in rows {
            if row_y + ROW_PITCH > bottom {
                flow.new_page();
                top = draw_grid_header(flow, table.header(), left, column_width);
                row_y = top + HEADER_GAP;
            }
            flow.font(Font::Regular, 8.0);
            for (i, cell) in row.iter().enumerate() {
                let x = left + i as f32 * column_width;
                flow.text_at(x, row_y, column_width - 2.0, &cell.to_string());
            }
            row_y += ROW_PITCH;
        }
        flow.set_y(row_y);
    }
}

fn draw_grid_header(flow: &mut PageFlow, header: &[String], left: f32, column_width: f32) -> f32 {
    let top = flow.y();
    flow.font(Font::Bold, 10.0);
    for (i, name) in header.iter().enumerate() {
        flow.text_at(left + i as f32 * column_width, top, column_width - 2.0, name);
    }
    top
}

fn ratings_table(flow: &mut PageFlow, breakdown: &RatingBreakdown) {
    let left = flow.margin();
    let first = flow.content_width() * QUESTION_SHARE;
    let other = (flow.content_width() - first) / (RatingBreakdown::COLUMNS.len() - 1) as f32;
    let column = |i: usize| {
        if i == 0 {
            (left, first)
        } else {
            (left + first + (i - 1) as f32 * other, other)
        }
    };

    flow.ensure_space(2.0 * CELL_ROW);
    let y = flow.y();
    flow.font(Font::Bold, 9.0);
    for (i, name) in RatingBreakdown::COLUMNS.iter().enumerate() {
        let (x, w) = column(i);
        flow.rect(x, y, w, CELL_ROW);
        bordered_cell(flow, x, y, w, name, i > 0);
    }
    flow.set_y(y + CELL_ROW);

    flow.font(Font::Regular, 8.0);
    let line_h = flow.line_height();
    for row in &breakdown.rows {
        let lines = wrap_text(&sanitize_text(&row.question), Font::Regular, 8.0, first - 2.0 * CELL_PAD);
        let height = (lines.len() as f32 * line_h + 2.0 * CELL_PAD).max(CELL_ROW);
        flow.ensure_space(height);
        let y = flow.y();
        for (i, cell) in row.cells().iter().enumerate() {
            let (x, w) = column(i);
            flow.rect(x, y, w, height);
            if i == 0 {
                for (k, line) in lines.iter().enumerate() {
                    bordered_cell(flow, x, y + k as f32 * line_h, w, line, false);
                }
            } else {
                bordered_cell(flow, x, y, w, cell, true);
            }
        }
        flow.set_y(y + height);
    }
}

// text inside a table cell whose border is drawn separately
fn bordered_cell(flow: &mut PageFlow, x: f32, y: f32, w: f32, text: &str, centered: bool) {
    let inner = w - 2.0 * CELL_PAD;
    let x = if centered {
        let (font, size) = flow.current_font();
        x + ((w - text_width(text, font, size)) / 2.0).max(CELL_PAD)
    } else {
        x + CELL_PAD
    };
    flow.text_at(x, y + CELL_PAD, inner, text);
}

fn unique_line(summary: &FieldSummary) -> String {
    format!("{} unique values: {}", summary.field, summary.unique_value_count)
}

fn collect_summaries<'a>(
    table: &Table,
    config: &'a ReportConfig,
) -> Result<std::collections::HashMap<&'a str, FieldSummary>> {
    config
        .referenced_fields()
        .into_iter()
        .map(|f| Ok((f, summarize(table, f)?)))
        .collect()
}

pub(crate) fn suggestion_column(table: &Table) -> Result<&str> {
    table
        .find_field_containing("suggestion")
        .ok_or_else(|| FeedbackLensError::FieldNotFound("suggestion column".into()))
}

/// Non-blank responses of `column`, trimmed, counted in first-seen order.
pub(crate) fn summarize_responses(table: &Table, column: &str) -> Result<FieldSummary> {
    let responses = table
        .column(column)?
        .map(|cell| cell.to_string().trim().to_owned())
        .filter(|text| !text.is_empty());
    Ok(crate::aggregate::tally(column, responses))
}

pub(crate) fn write_suggestion_digest(flow: &mut PageFlow, column: &str, summary: &FieldSummary) {
    flow.font(Font::Bold, 14.0).text(&format!("Source column: {column}"));
    flow.font(Font::Regular, 10.0)
        .text(&format!("Responses: {}", summary.total()))
        .text(&format!("Distinct suggestions: {}", summary.unique_value_count));
    flow.move_down(1.0);

    if summary.unique_value_count == 0 {
        flow.text("No suggestions were provided.");
        return;
    }

    let recurring: Vec<_> = summary
        .top_n(RECURRING_TOP)
        .into_iter()
        .filter(|e| e.count > 1)
        .collect();
    if !recurring.is_empty() {
        flow.font(Font::Bold, 12.0).text("Recurring suggestions:");
        flow.font(Font::Regular, 10.0);
        for entry in &recurring {
            flow.text(&format!("- ({}x) {}", entry.count, entry.value));
        }
        flow.move_down(1.0);
    }

    flow.font(Font::Bold, 12.0).text("All suggestions:");
    flow.font(Font::Regular, 10.0);
    for value in summary.value_frequency.keys().take(MAX_SUGGESTIONS) {
        flow.text(&format!("- {value}"));
    }
    if summary.unique_value_count > MAX_SUGGESTIONS {
        flow.text(&format!(
            "... and {} more",
            summary.unique_value_count - MAX_SUGGESTIONS
        ));
    }
}
