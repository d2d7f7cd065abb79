use feedback_lens_common::FeedbackLensError;
use feedback_lens_core::TabularFormat;
use std::path::{Path, PathBuf};

/// Same extension rules the parser applies to an upload's file name.
fn is_tabular(path: &Path) -> bool {
    path.extension().is_some()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| TabularFormat::from_hint(n).is_ok())
}

/// Bytes of an input file plus the file name used as its format hint.
pub fn read_input(path: &Path) -> anyhow::Result<(Vec<u8>, String)> {
    if !path.is_file() {
        return Err(FeedbackLensError::FileNotFound(path.display().to_string()).into());
    }
    let bytes = std::fs::read(path)?;
    let hint = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((bytes, hint))
}

/// Resolve a single file, a directory (recursive), or a glob pattern to spreadsheet inputs.
pub fn resolve_inputs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let path = Path::new(input);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut out = Vec::new();
    if path.is_dir() {
        scan_recursive(path, &mut out)?;
    } else {
        for entry in glob::glob(input)?.flatten() {
            if entry.is_file() && is_tabular(&entry) {
                out.push(entry);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn scan_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_recursive(&path, out)?;
        } else if is_tabular(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// `data/survey.xlsx` -> `survey`
pub fn report_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directory_scan_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/b.XLSX"), b"PK").unwrap();

        let found = resolve_inputs(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["a.csv", "b.XLSX"]);
    }

    #[test]
    fn extension_rules_follow_the_parser() {
        assert!(is_tabular(Path::new("a/Survey.CSV")));
        assert!(is_tabular(Path::new("b.xlsx")));
        assert!(!is_tabular(Path::new("c.xls")));
        assert!(!is_tabular(Path::new("csv")));
        assert!(!is_tabular(Path::new("notes.txt")));
    }

    #[test]
    fn glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.csv"), "x\n").unwrap();
        fs::write(dir.path().join("two.csv"), "x\n").unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        assert_eq!(resolve_inputs(&pattern).unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_input(Path::new("/definitely/missing.csv")).unwrap_err();
        let err = err.downcast_ref::<FeedbackLensError>().unwrap();
        assert!(matches!(err, FeedbackLensError::FileNotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn report_names() {
        assert_eq!(report_stem(Path::new("data/survey.xlsx")), "survey");
    }
}
