//! Manifests for exported tables: digest, row count, time range and gaps.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::series::sampling_interval;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub start_ts: i64,
    pub end_ts: i64,
    pub missing_rows: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub ts_min: Option<i64>,
    pub ts_max: Option<i64>,
    pub interval: Option<i64>,
    pub gaps: Vec<Gap>,
    /// Cells left empty because the value was absent.
    pub absent_cells: u64,
    pub warnings: Vec<String>,
    pub generated_at_epoch: i64,
}

/// Scans a table written by `export`. The first column is treated as the
/// row key when it parses as an integer.
pub fn analyze_table(path: &Path, now_ts: i64) -> Result<DatasetManifest> {
    let hash = file_sha256(path)?;
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let columns: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

    let mut warnings = Vec::new();
    let mut keys: Vec<i64> = Vec::new();
    let mut row_count = 0u64;
    let mut absent_cells = 0u64;

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(err) => {
                warnings.push(format!("bad_row {}: {}", line + 2, err));
                continue;
            }
        };
        row_count += 1;
        absent_cells += record.iter().skip(1).filter(|f| f.trim().is_empty()).count() as u64;
        if let Some(Ok(ts)) = record.get(0).map(|f| f.trim().parse::<i64>()) {
            if let Some(&prev) = keys.last() {
                if ts <= prev {
                    warnings.push(format!("non_monotonic_key: prev={} current={}", prev, ts));
                }
            }
            keys.push(ts);
        }
    }

    let interval = sampling_interval(&keys);
    let gaps = find_gaps(&keys, interval);

    Ok(DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count,
        columns,
        ts_min: keys.iter().min().copied(),
        ts_max: keys.iter().max().copied(),
        interval,
        gaps,
        absent_cells,
        warnings,
        generated_at_epoch: now_ts,
    })
}

fn find_gaps(keys: &[i64], interval: Option<i64>) -> Vec<Gap> {
    let Some(step) = interval else {
        return Vec::new();
    };
    keys.windows(2)
        .filter(|w| w[1] - w[0] > step)
        .map(|w| Gap {
            start_ts: w[0],
            end_ts: w[1],
            missing_rows: (w[1] - w[0]) / step - 1,
        })
        .collect()
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(table_path: &Path) -> PathBuf {
    let mut p = table_path.to_path_buf();
    let fname = table_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("table.csv");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}

pub fn write_manifest(manifest: &DatasetManifest, table_path: &Path) -> Result<PathBuf> {
    let out = default_manifest_path(table_path);
    std::fs::write(&out, serde_json::to_string_pretty(manifest)?)
        .with_context(|| format!("write {}", out.display()))?;
    Ok(out)
}
