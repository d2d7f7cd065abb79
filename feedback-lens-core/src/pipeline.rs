use crate::aggregate::summarize;
use crate::bundle::{chart_file_name, zip_outputs, NamedOutput, UniqueNames, REPORT_FILE};
use crate::chart::ChartRenderer;
use crate::compose::ReportComposer;
use crate::config::{FeedbackType, RatingsScope, ReportConfig};
use crate::parser::{parse_as, UploadPolicy};
use crate::ratings::{likert_groups, plan_targets, score_breakdown, RatingBreakdown};
use crate::table::Table;
use feedback_lens_common::{Config, Result};
use rayon::prelude::*;
use serde::Serialize;

/// One rasterized chart for a referenced field.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedChart {
    pub field: String,
    pub title: String,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Stateless orchestration: every call goes bytes -> table -> validated config -> outputs.
#[derive(Default)]
pub struct ReportPipeline {
    policy: UploadPolicy,
    composer: ReportComposer,
    renderer: ChartRenderer,
}

impl ReportPipeline {
    pub fn new(policy: UploadPolicy, composer: ReportComposer, renderer: ChartRenderer) -> Self {
        Self {
            policy,
            composer,
            renderer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            UploadPolicy::from_config(&config.upload),
            ReportComposer::new(config.report.clone()),
            ChartRenderer::from_config(&config.chart),
        )
    }

    pub fn with_composer(mut self, composer: ReportComposer) -> Self {
        self.composer = composer;
        self
    }

    fn load(&self, bytes: &[u8], hint: &str) -> Result<Table> {
        let format = self.policy.check(bytes, hint)?;
        parse_as(bytes, format)
    }

    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn headers(&self, bytes: &[u8], hint: &str) -> Result<Vec<String>> {
        Ok(self.load(bytes, hint)?.header().to_vec())
    }

    #[tracing::instrument(skip(self, bytes, config), fields(size = bytes.len()))]
    pub fn generate_report(&self, bytes: &[u8], hint: &str, config: &ReportConfig) -> Result<Vec<u8>> {
        let table = self.load(bytes, hint)?;
        let pdf = self.composer.compose(&table, config)?;
        tracing::info!(records = table.record_count(), pdf_bytes = pdf.len(), "report generated");
        Ok(pdf)
    }

    /// One chart per distinct referenced field, in first-reference order.
    #[tracing::instrument(skip(self, bytes, config), fields(size = bytes.len()))]
    pub fn generate_charts(
        &self,
        bytes: &[u8],
        hint: &str,
        config: &ReportConfig,
    ) -> Result<Vec<RenderedChart>> {
        let table = self.load(bytes, hint)?;
        let charts = self.render_charts(&table, config)?;
        tracing::info!(charts = charts.len(), "charts generated");
        Ok(charts)
    }

    fn render_charts(&self, table: &Table, config: &ReportConfig) -> Result<Vec<RenderedChart>> {
        config.validate(table)?;
        let summaries = config
            .referenced_fields()
            .into_iter()
            .map(|f| summarize(table, f))
            .collect::<Result<Vec<_>>>()?;
        // par_iter + collect keeps input order
        summaries
            .par_iter()
            .map(|s| {
                let spec = s.chart_spec();
                let png = self.renderer.render(&spec)?;
                Ok(RenderedChart {
                    field: s.field.clone(),
                    title: spec.title,
                    png,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn get_suggestions(&self, bytes: &[u8], hint: &str, feedback_type: FeedbackType) -> Result<Vec<u8>> {
        let table = self.load(bytes, hint)?;
        let pdf = self.composer.compose_suggestions(&table, feedback_type)?;
        tracing::info!(pdf_bytes = pdf.len(), "suggestion summary generated");
        Ok(pdf)
    }

    /// One ratings PDF per target the scope expands to.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn generate_ratings(
        &self,
        bytes: &[u8],
        hint: &str,
        scope: RatingsScope,
    ) -> Result<Vec<NamedOutput>> {
        let table = self.load(bytes, hint)?;
        let groups = likert_groups(&table)?;
        tracing::debug!(categories = groups.len(), "likert categories detected");

        let mut outputs = Vec::new();
        let mut names = UniqueNames::default();
        for target in plan_targets(&table, scope)? {
            let breakdowns = groups
                .iter()
                .map(|g| score_breakdown(&target.table, &g.category, &g.columns))
                .collect::<Result<Vec<RatingBreakdown>>>()?;
            let subtitle = target.subtitle();
            let charts = breakdowns
                .par_iter()
                .map(|b| self.renderer.render_image(&b.chart_spec(&subtitle)))
                .collect::<Result<Vec<_>>>()?;
            let pdf = self.composer.compose_ratings(
                &target.table,
                target.name,
                &target.value,
                &breakdowns,
                charts,
            )?;
            // "B.Tech" and "B Tech" share a safe name
            let name = names.claim(&target.file_stem(), '_', "_report.pdf");
            outputs.push(NamedOutput::new(name, pdf));
        }
        tracing::info!(reports = outputs.len(), "ratings reports generated");
        Ok(outputs)
    }

    /// Ratings reports packed into a single archive.
    pub fn generate_ratings_archive(&self, bytes: &[u8], hint: &str, scope: RatingsScope) -> Result<Vec<u8>> {
        zip_outputs(&self.generate_ratings(bytes, hint, scope)?)
    }

    /// Report PDF plus every chart, zipped.
    #[tracing::instrument(skip(self, bytes, config), fields(size = bytes.len()))]
    pub fn generate_bundle(&self, bytes: &[u8], hint: &str, config: &ReportConfig) -> Result<Vec<u8>> {
        let table = self.load(bytes, hint)?;
        let charts = self.render_charts(&table, config)?;
        let pdf = self.composer.compose(&table, config)?;

        let mut outputs = Vec::with_capacity(charts.len() + 1);
        outputs.push(NamedOutput::new(REPORT_FILE, pdf));
        for (i, chart) in charts.into_iter().enumerate() {
            outputs.push(NamedOutput::new(chart_file_name(i, &chart.field), chart.png));
        }
        let zip = zip_outputs(&outputs)?;
        tracing::info!(entries = outputs.len(), zip_bytes = zip.len(), "bundle generated");
        Ok(zip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Comparison;
    use feedback_lens_common::{FeedbackLensError, UploadConfig};
    use std::io::Cursor;

    const SCENARIO: &[u8] = b"Name,Dept,Score\nA,X,5\nB,X,7\nB,Y,5\n";

    fn dept_vs_score() -> ReportConfig {
        ReportConfig::Generalized {
            comparisons: vec![Comparison::new("Dept", ["Score", "Name"])],
        }
    }

    #[test]
    fn report_from_csv() {
        let pdf = ReportPipeline::default()
            .generate_report(SCENARIO, "data.csv", &dept_vs_score())
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn policy_runs_before_parsing() {
        let p = ReportPipeline::default();
        assert!(matches!(
            p.generate_report(SCENARIO, "data.txt", &dept_vs_score()),
            Err(FeedbackLensError::UnsupportedFormat(_))
        ));
        let small = ReportPipeline::new(
            UploadPolicy::from_config(&UploadConfig {
                max_bytes: 8,
                ..UploadConfig::default()
            }),
            ReportComposer::default(),
            ChartRenderer::default(),
        );
        assert!(matches!(
            small.headers(SCENARIO, "csv"),
            Err(FeedbackLensError::FileTooLarge { limit: 8, .. })
        ));
    }

    #[test]
    fn charts_follow_reference_order() {
        let cfg = ReportConfig::Generalized {
            comparisons: vec![
                Comparison::new("Dept", ["Score"]),
                Comparison::new("Name", ["Dept"]),
            ],
        };
        let charts = ReportPipeline::default()
            .generate_charts(SCENARIO, "csv", &cfg)
            .unwrap();
        let fields: Vec<_> = charts.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, ["Dept", "Score", "Name"]);
        let img = image::load_from_memory(&charts[0].png).unwrap();
        assert_eq!((img.width(), img.height()), (600, 400));
    }

    #[test]
    fn charts_reject_unknown_fields() {
        let cfg = ReportConfig::Generalized {
            comparisons: vec![Comparison::new("Dept", ["Salary"])],
        };
        assert!(matches!(
            ReportPipeline::default().generate_charts(SCENARIO, "csv", &cfg),
            Err(FeedbackLensError::FieldNotFound(_))
        ));
    }

    #[test]
    fn bundle_contains_report_and_charts() {
        let zip = ReportPipeline::default()
            .generate_bundle(SCENARIO, "csv", &dept_vs_score())
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect();
        assert_eq!(
            names,
            [
                "feedback-report.pdf",
                "chart-01-Dept.png",
                "chart-02-Score.png",
                "chart-03-Name.png"
            ]
        );
    }

    #[test]
    fn ratings_by_branch() {
        let csv = b"Branch,Faculty [Pace],Faculty [Clarity],Suggestions\n\
                    CSE,4,3,More labs\n\
                    ECE,2,4,\n\
                    CSE,1,4,Wifi\n";
        let p = ReportPipeline::default();
        let outputs = p.generate_ratings(csv, "csv", RatingsScope::Both).unwrap();
        let names: Vec<_> = outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Overall_All_Students_report.pdf",
                "Branch_CSE_report.pdf",
                "Branch_ECE_report.pdf"
            ]
        );
        assert!(outputs.iter().all(|o| o.bytes.starts_with(b"%PDF-")));

        let zip = p.generate_ratings_archive(csv, "csv", RatingsScope::Branch).unwrap();
        assert_eq!(zip::ZipArchive::new(Cursor::new(zip)).unwrap().len(), 2);
    }

    #[test]
    fn branches_with_the_same_safe_name_stay_apart() {
        let csv = b"Branch,Faculty [Pace]\nB.Tech,4\nB Tech,3\n";
        let p = ReportPipeline::default();
        let outputs = p.generate_ratings(csv, "csv", RatingsScope::Branch).unwrap();
        let names: Vec<_> = outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Branch_B_Tech_report.pdf", "Branch_B_Tech_2_report.pdf"]);

        let zip = p.generate_ratings_archive(csv, "csv", RatingsScope::Branch).unwrap();
        assert_eq!(zip::ZipArchive::new(Cursor::new(zip)).unwrap().len(), 2);
    }

    #[test]
    fn suggestions_pdf() {
        let csv = b"Name,Suggestion\nA,More labs\nB,More labs\n";
        let pdf = ReportPipeline::default()
            .get_suggestions(csv, "text/csv", FeedbackType::Stakeholder)
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }
}
