use crate::input::{read_input, report_stem};
use feedback_lens_core::bundle::UniqueNames;
use feedback_lens_core::{ReportConfig, ReportPipeline};
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One report per input on the blocking pool, each bounded by `deadline`.
/// Output is only written once a run has finished in time. Inputs sharing a
/// file stem get numbered report names (`survey-report.pdf`, `survey-2-report.pdf`).
pub async fn run_batch(
    pipeline: Arc<ReportPipeline>,
    config: Arc<ReportConfig>,
    inputs: Vec<PathBuf>,
    out_dir: &Path,
    deadline: Duration,
) -> Vec<BatchOutcome> {
    let mut names = UniqueNames::default();
    let planned: Vec<(PathBuf, String)> = inputs
        .into_iter()
        .map(|input| {
            let name = names.claim(&report_stem(&input), '-', "-report.pdf");
            (input, name)
        })
        .collect();

    let runs = planned.into_iter().map(|(input, name)| {
        let pipeline = Arc::clone(&pipeline);
        let config = Arc::clone(&config);
        let out_dir = out_dir.to_path_buf();
        async move {
            let job_input = input.clone();
            let job = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
                let (bytes, hint) = read_input(&job_input)?;
                Ok(pipeline.generate_report(&bytes, &hint, &config)?)
            });
            let result = match tokio::time::timeout(deadline, job).await {
                Err(_) => Err(format!("timed out after {}s", deadline.as_secs())),
                Ok(Err(join)) => Err(format!("worker failed: {join}")),
                Ok(Ok(Err(e))) => Err(format!("{e:#}")),
                Ok(Ok(Ok(pdf))) => {
                    let path = out_dir.join(name);
                    std::fs::write(&path, pdf)
                        .map(|_| path)
                        .map_err(|e| format!("write failed: {e}"))
                }
            };
            match result {
                Ok(path) => {
                    tracing::info!(input = %input.display(), output = %path.display(), "batch item done");
                    BatchOutcome { input, output: Some(path), error: None }
                }
                Err(error) => {
                    tracing::warn!(input = %input.display(), %error, "batch item failed");
                    BatchOutcome { input, output: None, error: Some(error) }
                }
            }
        }
    });
    join_all(runs).await
}
