//! Derived metrics - returns, ratios and trailing window statistics.
//!
//! Each rolling statistic keeps its own window and is updated one sample at
//! a time. A window that holds an absent sample, or is not yet full, yields
//! `None`.

use std::collections::VecDeque;

use crate::series::{DerivedSeries, Metric, SeriesKey};

// =============================================================================
// Rolling Statistics
// =============================================================================

/// Simple moving average with fixed window
#[derive(Debug, Clone)]
pub struct Sma {
    window: VecDeque<Option<f64>>,
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period,
        }
    }

    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        push_bounded(&mut self.window, self.period, value);
        let full = full_window(&self.window, self.period)?;
        Some(full.iter().sum::<f64>() / full.len() as f64)
    }
}

/// Rolling sample standard deviation (n - 1)
#[derive(Debug, Clone)]
pub struct RollingStd {
    window: VecDeque<Option<f64>>,
    period: usize,
}

impl RollingStd {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period,
        }
    }

    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        push_bounded(&mut self.window, self.period, value);
        let full = full_window(&self.window, self.period)?;
        sample_std(&full)
    }
}

/// Rolling Pearson correlation of two paired streams
#[derive(Debug, Clone)]
pub struct RollingCorr {
    window: VecDeque<Option<(f64, f64)>>,
    period: usize,
}

impl RollingCorr {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period,
        }
    }

    pub fn update(&mut self, x: Option<f64>, y: Option<f64>) -> Option<f64> {
        let pair = x.zip(y);
        push_bounded(&mut self.window, self.period, pair);
        let full = full_window(&self.window, self.period)?;
        let (xs, ys): (Vec<f64>, Vec<f64>) = full.into_iter().unzip();
        pearson(&xs, &ys)
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, period: usize, value: T) {
    window.push_back(value);
    while window.len() > period {
        window.pop_front();
    }
}

fn full_window<T: Copy>(window: &VecDeque<Option<T>>, period: usize) -> Option<Vec<T>> {
    if period == 0 || window.len() < period {
        return None;
    }
    window.iter().copied().collect()
}

// =============================================================================
// Window-free statistics
// =============================================================================

/// Sample standard deviation; `None` for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let m2: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if is_flat(values, m2) {
        return Some(0.0);
    }
    Some((m2 / (n as f64 - 1.0)).sqrt())
}

/// True when `values` carry no spread beyond rounding noise. A constant
/// window of non-dyadic floats leaves a centered sum of squares around
/// 1e-33 rather than exactly zero.
fn is_flat(values: &[f64], m2: f64) -> bool {
    let Some(&first) = values.first() else {
        return true;
    };
    if values.iter().all(|v| *v == first) {
        return true;
    }
    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let noise = 4.0 * f64::EPSILON * scale;
    m2 <= noise * noise * values.len() as f64
}

/// Pearson correlation; `None` when either side is flat.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if is_flat(xs, var_x) || is_flat(ys, var_y) {
        return None;
    }
    let r = cov / (var_x * var_y).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

// =============================================================================
// Series transforms
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub enum RollingOp<'a> {
    Mean,
    Std,
    /// Correlation against another series, paired by timestamp.
    Corr(&'a DerivedSeries),
}

impl RollingOp<'_> {
    fn label(&self, window: usize) -> String {
        match self {
            RollingOp::Mean => format!("mean{}", window),
            RollingOp::Std => format!("std{}", window),
            RollingOp::Corr(other) => format!("corr{}({})", window, other.key.source),
        }
    }
}

/// Trailing window statistic over `series`. Output shares the input axis.
pub fn rolling(series: &DerivedSeries, window: usize, op: RollingOp<'_>) -> DerivedSeries {
    let values = match op {
        RollingOp::Mean => {
            let mut sma = Sma::new(window);
            series.values.iter().map(|v| sma.update(*v)).collect()
        }
        RollingOp::Std => {
            let mut std = RollingStd::new(window);
            series.values.iter().map(|v| std.update(*v)).collect()
        }
        RollingOp::Corr(other) => {
            let lookup = other.lookup();
            let mut corr = RollingCorr::new(window);
            series
                .iter()
                .map(|(ts, v)| corr.update(v, lookup.get(&ts).copied().flatten()))
                .collect()
        }
    };
    DerivedSeries::new(
        derived_key(&series.key, &op.label(window)),
        series.timestamps.clone(),
        values,
    )
}

/// Pointwise `a / b` on `a`'s axis; absent where `b` is zero or absent.
pub fn ratio(a: &DerivedSeries, b: &DerivedSeries) -> DerivedSeries {
    let lookup = b.lookup();
    let values = a
        .iter()
        .map(|(ts, num)| {
            let den = lookup.get(&ts).copied().flatten()?;
            if den == 0.0 {
                return None;
            }
            let r = num? / den;
            r.is_finite().then_some(r)
        })
        .collect();
    let metric = format!("{}/{}", a.key.metric.as_str(), b.key.metric.as_str());
    DerivedSeries::new(derived_key(&a.key, &metric), a.timestamps.clone(), values)
}

/// Period-over-period change. Absent at the first point and wherever the
/// prior value is zero or absent.
pub fn pct_change(series: &DerivedSeries) -> DerivedSeries {
    let mut values = Vec::with_capacity(series.len());
    let mut prev: Option<f64> = None;
    for (i, v) in series.values.iter().enumerate() {
        let change = if i == 0 {
            None
        } else {
            match (prev, *v) {
                (Some(p), Some(cur)) if p != 0.0 => Some((cur - p) / p),
                _ => None,
            }
        };
        values.push(change);
        prev = *v;
    }
    DerivedSeries::new(
        derived_key(&series.key, "pct_change"),
        series.timestamps.clone(),
        values,
    )
}

/// Names of the `n` series whose smallest value is lowest, ascending.
/// Series without any value are skipped.
pub fn lowest_by_minimum(series: &[DerivedSeries], n: usize) -> Vec<(String, f64)> {
    let mut mins: Vec<(String, f64)> = series
        .iter()
        .filter_map(|s| s.min_value().map(|m| (s.key.source.clone(), m)))
        .collect();
    mins.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    mins.truncate(n);
    mins
}

fn derived_key(base: &SeriesKey, op: &str) -> SeriesKey {
    SeriesKey::new(
        &base.source,
        Metric::Derived(format!("{}.{}", base.metric.as_str(), op)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(source: &str, values: &[Option<f64>]) -> DerivedSeries {
        let ts = (0..values.len() as i64).map(|i| i * 86_400).collect();
        DerivedSeries::new(
            SeriesKey::new(source, Metric::DexVolume),
            ts,
            values.to_vec(),
        )
    }

    fn full(source: &str, values: &[f64]) -> DerivedSeries {
        let v: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
        ds(source, &v)
    }

    #[test]
    fn test_moving_average_scenario() {
        let s = full("a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let out = rolling(&s, 3, RollingOp::Mean);
        assert_eq!(
            out.values,
            vec![None, None, Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(6.0)]
        );
    }

    #[test]
    fn test_window_longer_than_series_is_all_absent() {
        let s = full("a", &[1.0, 2.0, 3.0]);
        for op in [RollingOp::Mean, RollingOp::Std] {
            let out = rolling(&s, 4, op);
            assert_eq!(out.len(), 3);
            assert!(out.values.iter().all(|v| v.is_none()));
        }
        assert!(rolling(&s, 0, RollingOp::Mean).values.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_absent_inside_window_propagates() {
        let s = ds("a", &[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)]);
        let out = rolling(&s, 2, RollingOp::Mean);
        assert_eq!(out.values, vec![None, None, None, Some(3.5), Some(4.5)]);
    }

    #[test]
    fn test_rolling_std_sample() {
        let s = full("a", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let out = rolling(&s, 8, RollingOp::Std);
        let last = out.values[7].unwrap();
        assert!((last - 2.138089935).abs() < 1e-6);
    }

    #[test]
    fn test_rolling_corr_perfect_and_constant() {
        let a = full("a", &[1.0, 2.0, 3.0, 4.0]);
        let b = full("b", &[2.0, 4.0, 6.0, 8.0]);
        let out = rolling(&a, 3, RollingOp::Corr(&b));
        assert_eq!(out.values[..2], [None, None]);
        assert!((out.values[3].unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(out.key.metric.as_str(), "dex_volume.corr3(b)");

        let flat = full("flat", &[5.0, 5.0, 5.0, 5.0]);
        let out = rolling(&a, 3, RollingOp::Corr(&flat));
        assert!(out.values.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_constant_non_dyadic_window_is_flat() {
        let xs: Vec<f64> = (0..15).map(|i| i as f64).collect();
        for c in [0.1, 0.7, 3.3] {
            let flat = vec![c; 15];
            assert_eq!(pearson(&xs, &flat), None);
            assert_eq!(pearson(&flat, &xs), None);
            assert_eq!(sample_std(&flat[..7]), Some(0.0));
        }

        let a = full("a", &xs);
        let flat = full("flat", &[0.1; 15]);
        let out = rolling(&a, 15, RollingOp::Corr(&flat));
        assert!(out.values.iter().all(|v| v.is_none()));
        let out = rolling(&flat, 5, RollingOp::Std);
        assert_eq!(out.values[14], Some(0.0));
    }

    #[test]
    fn test_small_real_spread_is_not_flat() {
        let ys = [1.0, 1.0 + 1e-9, 1.0 - 1e-9, 1.0 + 2e-9];
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!(sample_std(&ys).unwrap() > 0.0);
        assert!(pearson(&xs, &ys).is_some());
    }

    #[test]
    fn test_rolling_corr_pairs_by_timestamp() {
        let a = full("a", &[1.0, 2.0, 3.0]);
        let b = DerivedSeries::new(
            SeriesKey::new("b", Metric::DexVolume),
            vec![86_400, 2 * 86_400],
            vec![Some(1.0), Some(3.0)],
        );
        let out = rolling(&a, 2, RollingOp::Corr(&b));
        assert_eq!(out.values[0], None);
        assert_eq!(out.values[1], None);
        assert!((out.values[2].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_zero_denominator() {
        let a = full("a", &[10.0, 20.0, 30.0]);
        let b = ds("b", &[Some(2.0), Some(0.0), None]);
        let out = ratio(&a, &b);
        assert_eq!(out.values, vec![Some(5.0), None, None]);
    }

    #[test]
    fn test_pct_change() {
        let s = ds("a", &[Some(100.0), Some(110.0), Some(0.0), Some(5.0), None, Some(1.0)]);
        let out = pct_change(&s);
        assert_eq!(out.values[0], None);
        assert!((out.values[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((out.values[2].unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(out.values[3], None);
        assert_eq!(out.values[4], None);
        assert_eq!(out.values[5], None);
    }

    #[test]
    fn test_lowest_by_minimum() {
        let series = vec![
            ds("a", &[Some(0.9), Some(0.5)]),
            ds("b", &[Some(-0.2), Some(0.4)]),
            ds("c", &[None, None]),
            ds("d", &[Some(0.1)]),
        ];
        let low = lowest_by_minimum(&series, 2);
        assert_eq!(low, vec![("b".to_string(), -0.2), ("d".to_string(), 0.1)]);
    }

    #[test]
    fn test_sample_std_short() {
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(sample_std(&[3.0, 3.0]), Some(0.0));
    }
}
