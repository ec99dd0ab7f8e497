//! Time-stamped series as fetched from a source and as derived from them.
//!
//! Timestamps are UTC epoch seconds throughout the crate. Adapters convert
//! provider units before a `TimeSeries` is built.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Price,
    MarketCap,
    /// Traded volume of a coin as listed by the market source.
    DexVolume,
    /// Total DEX volume on a chain.
    ChainDexVolume,
    Tvl,
    Derived(String),
}

impl Metric {
    pub fn as_str(&self) -> &str {
        match self {
            Metric::Price => "price",
            Metric::MarketCap => "market_cap",
            Metric::DexVolume => "dex_volume",
            Metric::ChainDexVolume => "chain_dex_volume",
            Metric::Tvl => "tvl",
            Metric::Derived(name) => name.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "price" => Metric::Price,
            "market_cap" => Metric::MarketCap,
            "dex_volume" => Metric::DexVolume,
            "chain_dex_volume" => Metric::ChainDexVolume,
            "tvl" => Metric::Tvl,
            other => Metric::Derived(other.to_string()),
        }
    }
}

/// Identifies a column: which entity it describes and what was measured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub source: String,
    pub metric: Metric,
}

impl SeriesKey {
    pub fn new(source: &str, metric: Metric) -> Self {
        Self {
            source: source.to_string(),
            metric,
        }
    }

    /// Column label used in exports: `source:metric`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.source, self.metric.as_str())
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        let (source, metric) = label.split_once(':')?;
        if source.is_empty() || metric.is_empty() {
            return None;
        }
        Some(Self::new(source, Metric::parse(metric)))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub ts: i64,
    pub value: f64,
}

/// Observed series. Timestamps strictly increasing and unique.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    key: SeriesKey,
    points: Vec<Point>,
}

impl TimeSeries {
    /// Builds a series from unordered samples. Duplicated timestamps keep the
    /// last value seen; non-finite values are dropped.
    pub fn from_points(key: SeriesKey, samples: impl IntoIterator<Item = (i64, f64)>) -> Self {
        let mut by_ts: BTreeMap<i64, f64> = BTreeMap::new();
        for (ts, value) in samples {
            if value.is_finite() {
                by_ts.insert(ts, value);
            }
        }
        let points = by_ts
            .into_iter()
            .map(|(ts, value)| Point { ts, value })
            .collect();
        Self { key, points }
    }

    /// Same as `from_points` but buckets each timestamp to the start of its
    /// UTC day first. Used for providers that append an intraday sample to a
    /// daily history.
    pub fn daily(key: SeriesKey, samples: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Self::from_points(
            key,
            samples
                .into_iter()
                .map(|(ts, v)| (ts.div_euclid(SECS_PER_DAY) * SECS_PER_DAY, v)),
        )
    }

    pub fn empty(key: SeriesKey) -> Self {
        Self {
            key,
            points: Vec::new(),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_ts(&self) -> Option<i64> {
        self.points.first().map(|p| p.ts)
    }

    pub fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.ts).collect()
    }

    pub fn sampling_interval(&self) -> Option<i64> {
        sampling_interval(&self.timestamps())
    }

    /// Copy with every timestamp shifted so the first observation is 0 and
    /// expressed in `unit_secs` units.
    pub fn since_first(&self, unit_secs: i64) -> Self {
        let unit = unit_secs.max(1);
        let origin = self.first_ts().unwrap_or(0);
        Self::from_points(
            self.key.clone(),
            self.points
                .iter()
                .map(|p| ((p.ts - origin).div_euclid(unit), p.value)),
        )
    }
}

/// Computed series; `None` marks an absent value.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub key: SeriesKey,
    pub timestamps: Vec<i64>,
    pub values: Vec<Option<f64>>,
}

impl DerivedSeries {
    pub fn new(key: SeriesKey, timestamps: Vec<i64>, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        Self {
            key,
            timestamps,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn lookup(&self) -> HashMap<i64, Option<f64>> {
        self.iter().collect()
    }

    /// Chart-ready points; absent values are skipped.
    pub fn chart_points(&self) -> Vec<(i64, f64)> {
        self.iter().filter_map(|(ts, v)| v.map(|v| (ts, v))).collect()
    }

    pub fn sampling_interval(&self) -> Option<i64> {
        sampling_interval(&self.timestamps)
    }

    pub fn min_value(&self) -> Option<f64> {
        self.values
            .iter()
            .flatten()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
    }
}

impl From<&TimeSeries> for DerivedSeries {
    fn from(series: &TimeSeries) -> Self {
        Self {
            key: series.key.clone(),
            timestamps: series.points.iter().map(|p| p.ts).collect(),
            values: series.points.iter().map(|p| Some(p.value)).collect(),
        }
    }
}

/// Most frequent positive gap between consecutive timestamps; ties resolve to
/// the smallest gap. `None` for fewer than two timestamps.
pub fn sampling_interval(timestamps: &[i64]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in timestamps.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > 0 {
            *counts.entry(gap).or_insert(0) += 1;
        }
    }
    let mut best: Option<(i64, usize)> = None;
    for (gap, count) in counts {
        match best {
            Some((_, c)) if c >= count => {}
            _ => best = Some((gap, count)),
        }
    }
    best.map(|(gap, _)| gap)
}
