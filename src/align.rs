//! Series alignment onto a shared time axis.
//!
//! Frames are column-major: `columns[i]` holds one cell per row of `axis`.
//! A missing observation is `None`, never zero.

use std::collections::{BTreeSet, HashMap};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::series::{DerivedSeries, SeriesKey, TimeSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    Keep,
    ForwardFill,
    DropIncomplete,
}

/// Meaning of the values on the frame axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Timestamp,
    /// Integer offsets from the first row, in `unit_secs` units.
    SinceOrigin { unit_secs: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: SeriesKey,
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    pub axis: Axis,
    pub index: Vec<i64>,
    pub columns: Vec<Column>,
}

impl AlignedFrame {
    pub fn rows(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, key: &SeriesKey) -> Option<&Column> {
        self.columns.iter().find(|c| &c.key == key)
    }

    pub fn cell(&self, row: usize, key: &SeriesKey) -> Option<f64> {
        self.column(key).and_then(|c| c.cells.get(row).copied().flatten())
    }

    /// One column as a derived series on the frame axis.
    pub fn series(&self, key: &SeriesKey) -> Option<DerivedSeries> {
        self.column(key)
            .map(|c| DerivedSeries::new(c.key.clone(), self.index.clone(), c.cells.clone()))
    }

    pub fn apply_fill(&self, policy: FillPolicy) -> AlignedFrame {
        match policy {
            FillPolicy::Keep => self.clone(),
            FillPolicy::ForwardFill => {
                let columns = self
                    .columns
                    .iter()
                    .map(|c| {
                        let mut last = None;
                        let cells = c
                            .cells
                            .iter()
                            .map(|cell| {
                                if cell.is_some() {
                                    last = *cell;
                                }
                                last
                            })
                            .collect();
                        Column {
                            key: c.key.clone(),
                            cells,
                        }
                    })
                    .collect();
                AlignedFrame {
                    axis: self.axis,
                    index: self.index.clone(),
                    columns,
                }
            }
            FillPolicy::DropIncomplete => {
                let keep: Vec<usize> = (0..self.rows())
                    .filter(|&row| self.columns.iter().all(|c| c.cells[row].is_some()))
                    .collect();
                AlignedFrame {
                    axis: self.axis,
                    index: keep.iter().map(|&row| self.index[row]).collect(),
                    columns: self
                        .columns
                        .iter()
                        .map(|c| Column {
                            key: c.key.clone(),
                            cells: keep.iter().map(|&row| c.cells[row]).collect(),
                        })
                        .collect(),
                }
            }
        }
    }
}

/// Joins the given series on timestamp. Empty inputs are left out of the
/// join; `None` when nothing remains.
pub fn align(series: &[TimeSeries], join: JoinKind) -> Option<AlignedFrame> {
    let present: Vec<&TimeSeries> = series.iter().filter(|s| !s.is_empty()).collect();
    if present.is_empty() {
        log(
            Level::Warn,
            Domain::Align,
            "align_empty",
            obj(&[("inputs", v_num(series.len() as f64))]),
        );
        return None;
    }

    let index: Vec<i64> = match join {
        JoinKind::Outer => present
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.ts))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        JoinKind::Inner => {
            let mut common: BTreeSet<i64> = present[0].points().iter().map(|p| p.ts).collect();
            for s in &present[1..] {
                let ts: BTreeSet<i64> = s.points().iter().map(|p| p.ts).collect();
                common = common.intersection(&ts).copied().collect();
            }
            common.into_iter().collect()
        }
    };

    let columns = present
        .iter()
        .map(|s| {
            let by_ts: HashMap<i64, f64> = s.points().iter().map(|p| (p.ts, p.value)).collect();
            Column {
                key: s.key().clone(),
                cells: index.iter().map(|ts| by_ts.get(ts).copied()).collect(),
            }
        })
        .collect();

    log(
        Level::Debug,
        Domain::Align,
        "aligned",
        obj(&[
            ("join", v_str(if join == JoinKind::Inner { "inner" } else { "outer" })),
            ("columns", v_num(present.len() as f64)),
            ("rows", v_num(index.len() as f64)),
            ("skipped_empty", v_num((series.len() - present.len()) as f64)),
        ]),
    );

    Some(AlignedFrame {
        axis: Axis::Timestamp,
        index,
        columns,
    })
}

/// Replaces absolute timestamps with offsets from the frame's first row.
/// Frames already on an origin axis are returned unchanged.
pub fn normalize_origin(frame: &AlignedFrame, unit_secs: i64) -> AlignedFrame {
    if frame.axis != Axis::Timestamp {
        return frame.clone();
    }
    let unit = unit_secs.max(1);
    let origin = frame.index.first().copied().unwrap_or(0);
    AlignedFrame {
        axis: Axis::SinceOrigin { unit_secs: unit },
        index: frame
            .index
            .iter()
            .map(|ts| (ts - origin).div_euclid(unit))
            .collect(),
        columns: frame.columns.clone(),
    }
}

/// Re-bases every series to its own first observation, then outer-joins on
/// the offsets. Compares entities that started at different calendar dates.
pub fn align_since_launch(series: &[TimeSeries], unit_secs: i64) -> Option<AlignedFrame> {
    let unit = unit_secs.max(1);
    let rebased: Vec<TimeSeries> = series.iter().map(|s| s.since_first(unit)).collect();
    let mut frame = align(&rebased, JoinKind::Outer)?;
    frame.axis = Axis::SinceOrigin { unit_secs: unit };
    Some(frame)
}
