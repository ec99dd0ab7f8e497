//! Regime detection over a derived series.
//!
//! A regime is a run of contiguous samples that satisfy a threshold
//! comparison. Contiguity is measured against the series' native sampling
//! interval, so a missing sample splits a run even if the values on both
//! sides qualify.

use serde::Serialize;

use crate::logging::{log, log_regime, obj, v_num, v_str, Domain, Level};
use crate::series::DerivedSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Below,
    Above,
}

impl Comparator {
    pub fn qualifies(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Below => value < threshold,
            Comparator::Above => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegimePeriod {
    pub start: i64,
    pub end: i64,
    /// Number of contiguous qualifying samples, inclusive of both ends.
    pub duration: usize,
}

impl RegimePeriod {
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

pub fn find_regimes(
    series: &DerivedSeries,
    threshold: f64,
    comparator: Comparator,
) -> Vec<RegimePeriod> {
    let interval = series.sampling_interval();
    let mut periods = Vec::new();
    let mut open: Option<RegimePeriod> = None;

    for (ts, value) in series.iter() {
        let qualifies = value.map_or(false, |v| comparator.qualifies(v, threshold));
        if !qualifies {
            if let Some(p) = open.take() {
                periods.push(p);
            }
            continue;
        }

        open = match open.take() {
            Some(mut p) if interval == Some(ts - p.end) => {
                p.end = ts;
                p.duration += 1;
                Some(p)
            }
            Some(p) => {
                periods.push(p);
                Some(RegimePeriod { start: ts, end: ts, duration: 1 })
            }
            None => Some(RegimePeriod { start: ts, end: ts, duration: 1 }),
        };
    }
    if let Some(p) = open {
        periods.push(p);
    }

    log(
        Level::Debug,
        Domain::Regime,
        "regime_scan",
        obj(&[
            ("series", v_str(&series.key.label())),
            ("threshold", v_num(threshold)),
            ("samples", v_num(series.len() as f64)),
            ("periods", v_num(periods.len() as f64)),
        ]),
    );
    for p in &periods {
        log_regime(&series.key.label(), p.start, p.end, p.duration);
    }
    periods
}
