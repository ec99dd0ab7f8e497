//! Tabular export. Absent values are written as empty fields, never zero.
//!
//! Every writer also drops a `<file>.manifest.json` next to the table.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::fs::create_dir_all;
use std::path::Path;

use crate::align::{Axis, AlignedFrame, Column};
use crate::data::{analyze_table, write_manifest};
use crate::logging::log_export;
use crate::regime::RegimePeriod;
use crate::series::{DerivedSeries, SeriesKey};
use crate::volatility::VolatilityRecord;

const TIMESTAMP_HEADER: &str = "timestamp";
const ORIGIN_PREFIX: &str = "since_origin_";

#[derive(Debug, Serialize)]
struct RegimeRow<'a> {
    series: &'a str,
    start: i64,
    end: i64,
    duration: usize,
}

#[derive(Debug, Serialize)]
struct VolatilityRow<'a> {
    series: &'a str,
    start: i64,
    end: i64,
    duration: usize,
    reference_std: Option<f64>,
    subject_std: Option<f64>,
    ratio: Option<f64>,
}

fn axis_header(axis: Axis) -> String {
    match axis {
        Axis::Timestamp => TIMESTAMP_HEADER.to_string(),
        Axis::SinceOrigin { unit_secs } => format!("{}{}s", ORIGIN_PREFIX, unit_secs),
    }
}

fn parse_axis_header(header: &str) -> Result<Axis> {
    if header == TIMESTAMP_HEADER {
        return Ok(Axis::Timestamp);
    }
    header
        .strip_prefix(ORIGIN_PREFIX)
        .and_then(|rest| rest.strip_suffix('s'))
        .and_then(|unit| unit.parse::<i64>().ok())
        .map(|unit_secs| Axis::SinceOrigin { unit_secs })
        .ok_or_else(|| anyhow!("unrecognized axis column {:?}", header))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    Ok(())
}

fn finish(path: &Path, rows: usize) -> Result<()> {
    let manifest = analyze_table(path, chrono::Utc::now().timestamp())?;
    write_manifest(&manifest, path)?;
    log_export(&path.display().to_string(), rows, &manifest.hash_sha256);
    Ok(())
}

/// Writes `frame` with a header naming the axis and each `source:metric`.
pub fn write_frame(frame: &AlignedFrame, path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;

    let mut header = vec![axis_header(frame.axis)];
    header.extend(frame.columns.iter().map(|c| c.key.label()));
    writer.write_record(&header)?;

    for (row, ts) in frame.index.iter().enumerate() {
        let mut record = Vec::with_capacity(frame.columns.len() + 1);
        record.push(ts.to_string());
        for column in &frame.columns {
            record.push(column.cells[row].map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    drop(writer);

    finish(path, frame.rows())?;
    Ok(frame.rows())
}

/// Reads a table written by `write_frame`. Empty fields come back absent.
pub fn read_frame(path: &Path) -> Result<AlignedFrame> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let mut fields = headers.iter();
    let axis = parse_axis_header(fields.next().ok_or_else(|| anyhow!("empty header"))?)?;
    let keys: Vec<SeriesKey> = fields
        .map(|label| {
            SeriesKey::parse_label(label).ok_or_else(|| anyhow!("bad column label {:?}", label))
        })
        .collect::<Result<_>>()?;

    let mut index = Vec::new();
    let mut columns: Vec<Column> = keys
        .into_iter()
        .map(|key| Column { key, cells: Vec::new() })
        .collect();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != columns.len() + 1 {
            bail!("row {} has {} fields, expected {}", line + 2, record.len(), columns.len() + 1);
        }
        index.push(
            record[0]
                .trim()
                .parse::<i64>()
                .with_context(|| format!("row {}: bad axis value", line + 2))?,
        );
        for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
            let field = field.trim();
            let cell = if field.is_empty() {
                None
            } else {
                Some(
                    field
                        .parse::<f64>()
                        .with_context(|| format!("row {}: bad value {:?}", line + 2, field))?,
                )
            };
            column.cells.push(cell);
        }
    }

    Ok(AlignedFrame { axis, index, columns })
}

/// Outer-joins derived series into one frame for export.
pub fn derived_frame(series: &[DerivedSeries]) -> Option<AlignedFrame> {
    let mut index: Vec<i64> = series.iter().flat_map(|s| s.timestamps.iter().copied()).collect();
    index.sort_unstable();
    index.dedup();
    if index.is_empty() {
        return None;
    }
    let columns = series
        .iter()
        .map(|s| {
            let lookup = s.lookup();
            Column {
                key: s.key.clone(),
                cells: index.iter().map(|ts| lookup.get(ts).copied().flatten()).collect(),
            }
        })
        .collect();
    Some(AlignedFrame { axis: Axis::Timestamp, index, columns })
}

pub fn write_derived(series: &[DerivedSeries], path: &Path) -> Result<usize> {
    match derived_frame(series) {
        Some(frame) => write_frame(&frame, path),
        None => {
            // keep the header so downstream readers see the columns
            let empty = AlignedFrame {
                axis: Axis::Timestamp,
                index: Vec::new(),
                columns: series
                    .iter()
                    .map(|s| Column { key: s.key.clone(), cells: Vec::new() })
                    .collect(),
            };
            write_frame(&empty, path)
        }
    }
}

pub fn write_regimes(rows: &[(String, RegimePeriod)], path: &Path) -> Result<usize> {
    write_rows(
        rows.iter().map(|(series, p)| RegimeRow {
            series,
            start: p.start,
            end: p.end,
            duration: p.duration,
        }),
        &["series", "start", "end", "duration"],
        path,
    )
}

pub fn write_volatility(rows: &[(String, VolatilityRecord)], path: &Path) -> Result<usize> {
    write_rows(
        rows.iter().map(|(series, r)| VolatilityRow {
            series,
            start: r.period.start,
            end: r.period.end,
            duration: r.period.duration,
            reference_std: r.reference_std,
            subject_std: r.subject_std,
            ratio: r.ratio,
        }),
        &[
            "series",
            "start",
            "end",
            "duration",
            "reference_std",
            "subject_std",
            "ratio",
        ],
        path,
    )
}

/// Writes any flat serializable rows (market listings, TVL snapshots).
/// `header` is written explicitly so an empty table still names its columns.
pub fn write_rows<T, I>(rows: I, header: &[&str], path: &Path) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    drop(writer);

    finish(path, count)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_header_roundtrip() {
        for axis in [Axis::Timestamp, Axis::SinceOrigin { unit_secs: 86_400 }] {
            assert_eq!(parse_axis_header(&axis_header(axis)).unwrap(), axis);
        }
        assert!(parse_axis_header("date").is_err());
    }
}
