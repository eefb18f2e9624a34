use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Header names of the columns read from a simulation CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesColumns {
    /// Time index column
    pub time: String,
    /// Observed value column
    pub metric: String,
}

impl Default for SeriesColumns {
    fn default() -> Self {
        Self {
            time: "update".into(),
            metric: "eaten".into(),
        }
    }
}

/// One row of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Time index
    pub t: i64,
    /// Metric value
    pub v: f64,
}

/// Time-indexed output of one replicate
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Artifact key the series was published under
    pub key: String,
    /// Rows in file order, non-decreasing in `t`
    pub records: Vec<Record>,
}

/// Read a series from a CSV file. The time column must be integer-valued and
/// non-decreasing; extra columns are ignored.
pub fn read_series(
    key: &str,
    path: &Path,
    columns: &SeriesColumns,
) -> Result<Series, PipelineError> {
    let format_err = |reason: String| PipelineError::SeriesFormat {
        key: key.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format_err(format!("failed to open {}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| format_err(format!("failed to read header: {}", e)))?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format_err(format!("missing column {:?}", name)))
    };
    let time_idx = position(columns.time.as_str())?;
    let metric_idx = position(columns.metric.as_str())?;

    let mut records: Vec<Record> = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let line = row + 2;
        let record = result.map_err(|e| format_err(format!("line {}: {}", line, e)))?;
        let t = parse_time(record.get(time_idx).unwrap_or_default())
            .ok_or_else(|| format_err(format!("line {}: invalid time index", line)))?;
        let v: f64 = record
            .get(metric_idx)
            .unwrap_or_default()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| format_err(format!("line {}: invalid metric value", line)))?;

        if let Some(prev) = records.last() {
            if t < prev.t {
                return Err(format_err(format!(
                    "line {}: time index {} decreases (previous {})",
                    line, t, prev.t
                )));
            }
        }
        records.push(Record { t, v });
    }

    Ok(Series {
        key: key.to_string(),
        records,
    })
}

/// Integers, or floats with no fractional part (`12.0`) that fit in an i64
fn parse_time(raw: &str) -> Option<i64> {
    if let Ok(t) = raw.parse::<i64>() {
        return Some(t);
    }
    let f: f64 = raw.parse().ok()?;
    let in_range = f.is_finite() && f.abs() < 2f64.powi(63);
    (in_range && f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("LOD_data.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_series_selects_columns_by_name() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "ID,update,score,eaten\n7, 0, 9, 1.5\n8, 1, 9, 2\n9, 1, 9, 2.5\n",
        );

        let series = read_series("predictable-rep0", &path, &SeriesColumns::default()).unwrap();
        assert_eq!(series.key, "predictable-rep0");
        assert_eq!(
            series.records,
            vec![
                Record { t: 0, v: 1.5 },
                Record { t: 1, v: 2.0 },
                Record { t: 1, v: 2.5 },
            ]
        );
    }

    #[test]
    fn test_read_series_accepts_integral_float_time() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,eaten\n0.0,1\n1.0,2\n");
        let series = read_series("k", &path, &SeriesColumns::default()).unwrap();
        assert_eq!(series.records[1].t, 1);
    }

    #[test]
    fn test_read_series_header_only_is_empty() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,eaten\n");
        let series = read_series("k", &path, &SeriesColumns::default()).unwrap();
        assert!(series.records.is_empty());
    }

    #[test]
    fn test_read_series_missing_column() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,score\n0,1\n");
        let err = read_series("k", &path, &SeriesColumns::default()).unwrap_err();
        assert!(err.to_string().contains("missing column \"eaten\""));
    }

    #[test]
    fn test_read_series_rejects_decreasing_time() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,eaten\n0,1\n2,1\n1,1\n");
        let err = read_series("k", &path, &SeriesColumns::default()).unwrap_err();
        assert!(err.to_string().contains("decreases"));
    }

    #[test]
    fn test_read_series_rejects_bad_values() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,eaten\n0.5,1\n");
        assert!(read_series("k", &path, &SeriesColumns::default()).is_err());

        let path = write(dir.path(), "update,eaten\n0,abc\n");
        assert!(read_series("k", &path, &SeriesColumns::default()).is_err());
    }

    #[test]
    fn test_read_series_rejects_out_of_range_time() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "update,eaten\n1e30,1\n");
        let err = read_series("k", &path, &SeriesColumns::default()).unwrap_err();
        assert!(err.to_string().contains("invalid time index"));

        assert_eq!(parse_time("-1e30"), None);
        assert_eq!(parse_time("4096.0"), Some(4096));
    }

    #[test]
    fn test_read_series_rejects_non_finite_metric() {
        let dir = tempdir().unwrap();
        for value in ["NaN", "inf", "-inf"] {
            let path = write(dir.path(), &format!("update,eaten\n0,{}\n", value));
            match read_series("k", &path, &SeriesColumns::default()) {
                Err(PipelineError::SeriesFormat { reason, .. }) => {
                    assert!(reason.contains("invalid metric value"), "{value}: {reason}");
                }
                other => panic!("{value}: unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_read_series_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_series("k", &dir.path().join("none.csv"), &SeriesColumns::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SeriesFormat { .. }));
    }
}
