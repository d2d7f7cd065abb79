mod batch;
mod input;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use feedback_lens_common::{Config, FeedbackLensError};
use feedback_lens_core::bundle::chart_file_name;
use feedback_lens_core::{
    Comparison, FeedbackType, FieldSelection, RatingsScope, ReportConfig, ReportPipeline,
};
use input::{read_input, resolve_inputs};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "feedback-lens", version, about = "Feedback spreadsheet reports and charts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Either a JSON config file or the inline flags for one of the two report kinds.
#[derive(Args, Debug, Clone)]
struct ReportArgs {
    /// JSON report config ({"reportType": "generalized" | "fieldwise", ...})
    #[arg(long, conflicts_with_all = ["primary", "year"])]
    config: Option<PathBuf>,
    /// primary field of a single generalized comparison
    #[arg(long, requires = "related", conflicts_with = "year")]
    primary: Option<String>,
    #[arg(long, value_delimiter = ',')]
    related: Vec<String>,
    /// fieldwise report: year column
    #[arg(long, requires = "facility")]
    year: Option<String>,
    #[arg(long)]
    facility: Option<String>,
}

impl ReportArgs {
    fn resolve(&self) -> anyhow::Result<ReportConfig> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading report config {}", path.display()))?;
            return Ok(ReportConfig::from_json(&text)?);
        }
        if let Some(primary) = &self.primary {
            return Ok(ReportConfig::Generalized {
                comparisons: vec![Comparison::new(primary, self.related.iter().cloned())],
            });
        }
        if let (Some(year), Some(facility)) = (&self.year, &self.facility) {
            return Ok(ReportConfig::Fieldwise {
                selection: FieldSelection {
                    year: year.clone(),
                    facility: facility.clone(),
                },
            });
        }
        Err(FeedbackLensError::ConfigValidation(
            "pass --config, --primary/--related or --year/--facility".into(),
        )
        .into())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header row as JSON
    Headers { path: PathBuf },
    /// Generalized or field-wise PDF report
    Report {
        path: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
        #[arg(short, long, default_value = "feedback-report.pdf")]
        output: PathBuf,
    },
    /// One PNG chart per referenced field
    Charts {
        path: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Digest of the free-text suggestion column
    Suggestions {
        path: PathBuf,
        #[arg(long = "type", default_value = "stakeholder")]
        feedback_type: FeedbackType,
        #[arg(short, long, default_value = "suggestion-summary.pdf")]
        output: PathBuf,
    },
    /// Likert ratings reports: overall (1), per branch (2) or both (3)
    Ratings {
        path: PathBuf,
        #[arg(long, default_value = "overall")]
        scope: RatingsScope,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// write a single zip archive instead of loose PDFs
        #[arg(long)]
        zip: Option<PathBuf>,
    },
    /// Report PDF and charts in one zip
    Bundle {
        path: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
        #[arg(short, long, default_value = "feedback-report.zip")]
        output: PathBuf,
    },
    /// Run the same report over every spreadsheet matched by a file, directory or glob
    Batch {
        input: String,
        #[command(flatten)]
        report: ReportArgs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Shell completion script
    Completions { shell: clap_complete::Shell },
}

fn init_tracing(fallback: &str) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();
    init_tracing(&config.logging.filter);
    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit_with(e),
    }
}

/// 4xx-class failures exit 2, everything else 1.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FeedbackLensError>() {
        Some(e) if e.is_client_error() => 2,
        _ => 1,
    }
}

fn error_body(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<FeedbackLensError>() {
        Some(e) => e.to_json(),
        None => serde_json::json!({ "error": format!("{err:#}") }),
    }
}

fn exit_with(err: anyhow::Error) -> ExitCode {
    eprintln!("{}", error_body(&err));
    ExitCode::from(exit_status(&err))
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    let pipeline = ReportPipeline::from_config(&config);
    match command {
        Commands::Headers { path } => {
            let (bytes, hint) = read_input(&path)?;
            let headers = pipeline.headers(&bytes, &hint)?;
            println!("{}", serde_json::to_string(&headers)?);
        }
        Commands::Report { path, report, output } => {
            let (bytes, hint) = read_input(&path)?;
            let pdf = pipeline.generate_report(&bytes, &hint, &report.resolve()?)?;
            write_output(&output, &pdf)?;
        }
        Commands::Charts { path, report, out_dir } => {
            let (bytes, hint) = read_input(&path)?;
            let charts = pipeline.generate_charts(&bytes, &hint, &report.resolve()?)?;
            for (i, chart) in charts.iter().enumerate() {
                write_output(&out_dir.join(chart_file_name(i, &chart.field)), &chart.png)?;
            }
        }
        Commands::Suggestions { path, feedback_type, output } => {
            let (bytes, hint) = read_input(&path)?;
            let pdf = pipeline.get_suggestions(&bytes, &hint, feedback_type)?;
            write_output(&output, &pdf)?;
        }
        Commands::Ratings { path, scope, out_dir, zip } => {
            let (bytes, hint) = read_input(&path)?;
            match zip {
                Some(archive) => {
                    let bytes = pipeline.generate_ratings_archive(&bytes, &hint, scope)?;
                    write_output(&archive, &bytes)?;
                }
                None => {
                    for out in pipeline.generate_ratings(&bytes, &hint, scope)? {
                        write_output(&out_dir.join(&out.name), &out.bytes)?;
                    }
                }
            }
        }
        Commands::Bundle { path, report, output } => {
            let (bytes, hint) = read_input(&path)?;
            let zip = pipeline.generate_bundle(&bytes, &hint, &report.resolve()?)?;
            write_output(&output, &zip)?;
        }
        Commands::Batch { input, report, out_dir } => {
            let inputs = resolve_inputs(&input)?;
            if inputs.is_empty() {
                return Err(FeedbackLensError::FileNotFound(input).into());
            }
            std::fs::create_dir_all(&out_dir)?;
            let report = Arc::new(report.resolve()?);
            let deadline = Duration::from_secs(config.processing.timeout_secs);
            let outcomes =
                batch::run_batch(Arc::new(pipeline), report, inputs, &out_dir, deadline).await;
            for outcome in &outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} batch inputs failed", outcomes.len());
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "feedback-lens", &mut std::io::stdout());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(primary: Option<&str>, related: &[&str]) -> ReportArgs {
        ReportArgs {
            config: None,
            primary: primary.map(str::to_owned),
            related: related.iter().map(|s| s.to_string()).collect(),
            year: None,
            facility: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn inline_generalized_flags() {
        let cfg = args(Some("Dept"), &["Score", "Name"]).resolve().unwrap();
        assert_eq!(
            cfg,
            ReportConfig::Generalized {
                comparisons: vec![Comparison::new("Dept", ["Score", "Name"])],
            }
        );
    }

    #[test]
    fn missing_flags_are_client_errors() {
        let err = args(None, &[]).resolve().unwrap_err();
        let err = err.downcast_ref::<FeedbackLensError>().unwrap();
        assert!(err.is_client_error());
    }

    #[test]
    fn config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{"reportType":"fieldwise","selection":{"year":"Year","facility":"Site"}}"#,
        )
        .unwrap();
        let mut a = args(None, &[]);
        a.config = Some(path);
        assert!(matches!(a.resolve().unwrap(), ReportConfig::Fieldwise { .. }));
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from([
            "feedback-lens", "ratings", "survey.xlsx", "--scope", "3", "--zip", "out.zip",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ratings { scope: RatingsScope::Both, zip: Some(_), .. }
        ));
        assert!(Cli::try_parse_from(["feedback-lens", "suggestions", "f.csv", "--type", "subject"]).is_ok());
    }

    #[test]
    fn client_errors_exit_two() {
        let missing: anyhow::Error = FeedbackLensError::FieldNotFound("X".into()).into();
        assert_eq!(exit_status(&missing), 2);
        assert_eq!(error_body(&missing)["error"], "Field not found: X");
        let render: anyhow::Error = FeedbackLensError::Render("boom".into()).into();
        assert_eq!(exit_status(&render), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("other")), 1);
    }
}
