//! Relative volatility of a subject series against a reference inside each
//! detected regime.

use serde::Serialize;

use crate::indicators::sample_std;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::regime::RegimePeriod;
use crate::series::DerivedSeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityRecord {
    pub period: RegimePeriod,
    pub reference_std: Option<f64>,
    pub subject_std: Option<f64>,
    /// `None` when the reference volatility is zero or could not be computed.
    pub ratio: Option<f64>,
}

/// Sample std of the present values of `series` within `[start, end]`.
pub fn period_std(series: &DerivedSeries, period: &RegimePeriod) -> Option<f64> {
    let slice: Vec<f64> = series
        .iter()
        .filter(|(ts, _)| period.contains(*ts))
        .filter_map(|(_, v)| v)
        .collect();
    sample_std(&slice)
}

/// One record per period, in input order. Periods whose ratio cannot be
/// formed are still reported.
pub fn score(
    periods: &[RegimePeriod],
    subject: &DerivedSeries,
    reference: &DerivedSeries,
) -> Vec<VolatilityRecord> {
    periods
        .iter()
        .map(|period| {
            let subject_std = period_std(subject, period);
            let reference_std = period_std(reference, period);
            let ratio = match (subject_std, reference_std) {
                (Some(s), Some(r)) if r != 0.0 => Some(s / r),
                _ => None,
            };
            if ratio.is_none() {
                log(
                    Level::Debug,
                    Domain::Volatility,
                    "ratio_undefined",
                    obj(&[
                        ("subject", v_str(&subject.key.label())),
                        ("reference", v_str(&reference.key.label())),
                        ("start", v_num(period.start as f64)),
                        ("end", v_num(period.end as f64)),
                    ]),
                );
            }
            VolatilityRecord {
                period: *period,
                reference_std,
                subject_std,
                ratio,
            }
        })
        .collect()
}
