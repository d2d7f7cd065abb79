use feedback_lens_common::{FeedbackLensError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A generated artifact and the file name it is delivered under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedOutput {
    pub name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl NamedOutput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.name.rsplit('.').next() {
            Some("pdf") => "application/pdf",
            Some("png") => "image/png",
            Some("zip") => "application/zip",
            _ => "application/octet-stream",
        }
    }
}

pub const REPORT_FILE: &str = "feedback-report.pdf";

/// `chart-03-Dept.png`; the field name is reduced to archive-safe characters.
pub fn chart_file_name(index: usize, field: &str) -> String {
    let safe: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("chart-{:02}-{safe}.png", index + 1)
}

/// Hands out output names that are unique within one run. A repeated stem gets
/// `{sep}2`, `{sep}3`, ... appended before `tail`.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn claim(&mut self, stem: &str, sep: char, tail: &str) -> String {
        let mut name = format!("{stem}{tail}");
        let mut n = 1;
        while self.taken.contains(&name) {
            n += 1;
            name = format!("{stem}{sep}{n}{tail}");
        }
        if n > 1 {
            tracing::warn!(%name, "output name already taken; numbered");
        }
        self.taken.insert(name.clone());
        name
    }
}

fn zip_err(e: impl std::fmt::Display) -> FeedbackLensError {
    FeedbackLensError::Render(format!("zip write failed: {e}"))
}

/// Deflated archive with one entry per output, in input order.
pub fn zip_outputs(outputs: &[NamedOutput]) -> Result<Vec<u8>> {
    let mut seen = HashSet::new();
    for out in outputs {
        if !seen.insert(out.name.as_str()) {
            return Err(FeedbackLensError::ConfigValidation(format!(
                "duplicate output name: {}",
                out.name
            )));
        }
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for out in outputs {
        zip.start_file(out.name.as_str(), options).map_err(zip_err)?;
        zip.write_all(&out.bytes)?;
    }
    let cursor = zip.finish().map_err(zip_err)?;
    tracing::debug!(entries = outputs.len(), "bundled outputs");
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn entries_keep_order_and_content() {
        let outputs = vec![
            NamedOutput::new("b.pdf", b"%PDF-1.4 fake".to_vec()),
            NamedOutput::new("a.png", vec![0u8; 2048]),
        ];
        let bytes = zip_outputs(&outputs).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "b.pdf");
        assert_eq!(first.compression(), CompressionMethod::Deflated);
        let mut body = Vec::new();
        first.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"%PDF-1.4 fake");
        drop(first);
        assert_eq!(archive.by_index(1).unwrap().name(), "a.png");
    }

    #[test]
    fn duplicate_names_rejected() {
        let outputs = vec![
            NamedOutput::new("x.pdf", Vec::new()),
            NamedOutput::new("x.pdf", Vec::new()),
        ];
        assert!(matches!(
            zip_outputs(&outputs),
            Err(FeedbackLensError::ConfigValidation(_))
        ));
    }

    #[test]
    fn empty_bundle_is_valid() {
        let bytes = zip_outputs(&[]).unwrap();
        assert_eq!(ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 0);
    }

    #[test]
    fn repeated_stems_are_numbered() {
        let mut names = UniqueNames::default();
        assert_eq!(names.claim("Branch_B_Tech", '_', "_report.pdf"), "Branch_B_Tech_report.pdf");
        assert_eq!(names.claim("Branch_B_Tech", '_', "_report.pdf"), "Branch_B_Tech_2_report.pdf");
        assert_eq!(names.claim("Branch_B_Tech", '_', "_report.pdf"), "Branch_B_Tech_3_report.pdf");
        assert_eq!(names.claim("survey", '-', "-report.pdf"), "survey-report.pdf");
    }

    #[test]
    fn names() {
        assert_eq!(chart_file_name(0, "Dept"), "chart-01-Dept.png");
        assert_eq!(chart_file_name(11, "Year of study"), "chart-12-Year_of_study.png");
        assert_eq!(NamedOutput::new("r.pdf", Vec::new()).content_type(), "application/pdf");
    }
}
