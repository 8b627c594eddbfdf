//! Parameter-sweep result files named `<parameter>_<value>.txt`.
//!
//! These are exported by the solver's own sweep studies, not by the
//! optimizer. Each holds a numeric table; comment lines start with `%` or `#`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use tt_types::{TtError, TtResult};

/// One loaded sweep file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFile {
    pub path: PathBuf,
    pub parameter: String,
    pub value: f64,
    pub rows: Vec<Vec<f64>>,
}

impl SweepFile {
    /// Width of the widest row.
    pub fn columns(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Split `<parameter>_<value>.txt` on the last underscore. Parameter names
/// may contain underscores themselves.
pub fn parse_sweep_file_name(file_name: &str) -> Option<(String, f64)> {
    let stem = file_name.strip_suffix(".txt")?;
    let (parameter, value) = stem.rsplit_once('_')?;
    if parameter.is_empty() {
        return None;
    }
    let value: f64 = value.parse().ok()?;
    value.is_finite().then(|| (parameter.to_string(), value))
}

fn parse_table(text: &str) -> Result<Vec<Vec<f64>>, String> {
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|_| format!("line {}: {cell:?} is not a number", lineno + 1))
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Load one sweep file whose name follows the convention.
pub fn load_sweep_file(path: impl AsRef<Path>) -> TtResult<SweepFile> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (parameter, value) = parse_sweep_file_name(file_name).ok_or_else(|| {
        TtError::InvalidData(format!(
            "{} does not follow the <parameter>_<value>.txt convention",
            path.display()
        ))
    })?;

    let text = std::fs::read_to_string(path)?;
    let rows = parse_table(&text)
        .map_err(|message| TtError::InvalidData(format!("{}: {message}", path.display())))?;

    Ok(SweepFile {
        path: path.to_path_buf(),
        parameter,
        value,
        rows,
    })
}

/// Load every conforming sweep file in `dir`, sorted by parameter then value.
pub fn load_sweep_dir(dir: impl AsRef<Path>) -> TtResult<Vec<SweepFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let conforming = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_sweep_file_name)
            .is_some();
        if !path.is_file() || !conforming {
            debug!("Skipping non-sweep file {}", path.display());
            continue;
        }
        files.push(load_sweep_file(&path)?);
    }
    files.sort_by(|a, b| {
        a.parameter
            .cmp(&b.parameter)
            .then(a.value.total_cmp(&b.value))
    });
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_split_on_last_underscore() {
        assert_eq!(
            parse_sweep_file_name("V_rf_300.txt"),
            Some(("V_rf".to_string(), 300.0))
        );
        assert_eq!(
            parse_sweep_file_name("rod_spacing_0.005.txt"),
            Some(("rod_spacing".to_string(), 0.005))
        );
        assert_eq!(
            parse_sweep_file_name("f_1e7.txt"),
            Some(("f".to_string(), 1e7))
        );
        assert_eq!(parse_sweep_file_name("notes.txt"), None);
        assert_eq!(parse_sweep_file_name("V_rf_high.txt"), None);
        assert_eq!(parse_sweep_file_name("V_rf_300.csv"), None);
        assert_eq!(parse_sweep_file_name("_300.txt"), None);
    }

    #[test]
    fn table_skips_comments_and_mixed_delimiters() {
        let text = "% Model: trap.mph\n% x  y  V\n\n0.0 0.0 1.5\n0.1,0.0,1.4\n# trailing\n";
        let rows = parse_table(text).unwrap();
        assert_eq!(rows, vec![vec![0.0, 0.0, 1.5], vec![0.1, 0.0, 1.4]]);
    }

    #[test]
    fn bad_cell_reports_line() {
        let err = parse_table("1 2 3\n4 five 6\n").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn directory_load_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("V_rf_500.txt"), "1 2\n").unwrap();
        std::fs::write(dir.path().join("V_rf_300.txt"), "3 4\n5 6\n").unwrap();
        std::fs::write(dir.path().join("V_dc_50.txt"), "7\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "not a sweep").unwrap();

        let files = load_sweep_dir(dir.path()).unwrap();
        let keys: Vec<(&str, f64)> = files
            .iter()
            .map(|f| (f.parameter.as_str(), f.value))
            .collect();
        assert_eq!(keys, vec![("V_dc", 50.0), ("V_rf", 300.0), ("V_rf", 500.0)]);
        assert_eq!(files[1].rows.len(), 2);
        assert_eq!(files[1].columns(), 2);
    }
}
