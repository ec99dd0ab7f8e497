//! End-to-end studies: fetch → align → derive → regimes → volatility → export.
//!
//! Each stage takes explicit inputs and returns new values. Anything a stage
//! had to skip lands in the caller's `IssueLog`.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::align::{align, align_since_launch, AlignedFrame, JoinKind};
use crate::config::Config;
use crate::error::{IssueLog, PipelineIssue};
use crate::export;
use crate::indicators::{lowest_by_minimum, pct_change, ratio, rolling, RollingOp};
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::regime::{find_regimes, Comparator, RegimePeriod};
use crate::series::{DerivedSeries, TimeSeries, SECS_PER_DAY};
use crate::source::{ChainDirectory, ChainTvl, MarketChart, MarketCoin, MarketDataSource};
use crate::volatility::{score, VolatilityRecord};

const COINGECKO: &str = "coingecko";
const DEFILLAMA: &str = "defillama";

const MARKET_COIN_HEADER: [&str; 7] = [
    "id",
    "name",
    "symbol",
    "market_cap",
    "total_volume",
    "price",
    "circulating_supply",
];
const CHAIN_TVL_HEADER: [&str; 4] = ["name", "tvl", "symbol", "gecko_id"];

// =============================================================================
// Market fetch
// =============================================================================

/// Listing plus daily history for the reference coin and every listed coin.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub coins: Vec<MarketCoin>,
    pub reference_id: String,
    pub reference: Option<MarketChart>,
    /// Histories of listed coins other than the reference, listing order.
    pub charts: Vec<(String, MarketChart)>,
}

impl MarketData {
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
            && self.reference.as_ref().map_or(true, chart_is_empty)
            && self.charts.iter().all(|(_, c)| chart_is_empty(c))
    }

    /// Reference first, then the listed coins.
    pub fn all_charts(&self) -> impl Iterator<Item = (&str, &MarketChart)> + '_ {
        self.reference
            .iter()
            .map(move |c| (self.reference_id.as_str(), c))
            .chain(self.charts.iter().map(|(id, c)| (id.as_str(), c)))
    }

    pub fn chart(&self, coin_id: &str) -> Option<&MarketChart> {
        self.all_charts().find(|(id, _)| *id == coin_id).map(|(_, c)| c)
    }
}

fn chart_is_empty(chart: &MarketChart) -> bool {
    chart.price.is_empty() && chart.market_cap.is_empty() && chart.volume.is_empty()
}

pub async fn fetch_market<S>(source: &S, cfg: &Config, issues: &mut IssueLog) -> MarketData
where
    S: MarketDataSource + ?Sized,
{
    let _scope = ProfileScope::new("fetch_market");

    let coins = match source.top_coins(cfg.top_n).await {
        Some(coins) => coins,
        None => {
            issues.report(PipelineIssue::SourceUnavailable {
                source_name: COINGECKO.into(),
                identifier: "coins/markets".into(),
            });
            Vec::new()
        }
    };

    let reference = fetch_chart(source, &cfg.reference_coin, cfg.history_days, issues).await;

    let mut charts = Vec::with_capacity(coins.len());
    for coin in coins.iter().filter(|c| c.id != cfg.reference_coin) {
        if let Some(chart) = fetch_chart(source, &coin.id, cfg.history_days, issues).await {
            charts.push((coin.id.clone(), chart));
        }
    }

    log(
        Level::Info,
        Domain::Fetch,
        "market_fetched",
        obj(&[
            ("coins", v_num(coins.len() as f64)),
            ("charts", v_num(charts.len() as f64)),
            ("reference", v_str(&cfg.reference_coin)),
            ("reference_present", serde_json::Value::Bool(reference.is_some())),
        ]),
    );

    MarketData {
        coins,
        reference_id: cfg.reference_coin.clone(),
        reference,
        charts,
    }
}

async fn fetch_chart<S>(source: &S, coin_id: &str, days: u32, issues: &mut IssueLog) -> Option<MarketChart>
where
    S: MarketDataSource + ?Sized,
{
    let chart = source.market_chart(coin_id, days).await;
    if chart.is_none() {
        issues.report(PipelineIssue::SourceUnavailable {
            source_name: COINGECKO.into(),
            identifier: coin_id.to_string(),
        });
    }
    chart
}

// =============================================================================
// Correlation study
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct CorrelationStudy {
    /// Rolling correlation of each coin's volume against the reference.
    pub correlations: Vec<DerivedSeries>,
    /// `(coin id, minimum correlation)`, lowest first.
    pub lowest: Vec<(String, f64)>,
    pub regimes: Vec<(String, RegimePeriod)>,
    pub volatility: Vec<(String, VolatilityRecord)>,
}

struct AlignedPair {
    coin_id: String,
    subject: DerivedSeries,
    reference: DerivedSeries,
}

/// Rolling volume correlation of each coin against the reference coin, the
/// least-correlated coins, their low-correlation regimes and the relative
/// volatility of daily volume changes inside each regime.
pub fn correlation_study(market: &MarketData, cfg: &Config, issues: &mut IssueLog) -> CorrelationStudy {
    let _scope = ProfileScope::new("correlation_study");

    let reference = match market.reference.as_ref().map(|c| &c.volume) {
        Some(v) if !v.is_empty() => v,
        other => {
            issues.report(PipelineIssue::InsufficientData {
                what: format!("{} volume", market.reference_id),
                needed: cfg.corr_window,
                got: other.map_or(0, |v| v.len()),
            });
            return CorrelationStudy::default();
        }
    };

    let mut pairs = Vec::new();
    let mut correlations = Vec::new();
    for (coin_id, chart) in &market.charts {
        let Some(pair) = align_pair(coin_id, &chart.volume, reference) else {
            issues.report(PipelineIssue::InsufficientData {
                what: format!("{} volume", coin_id),
                needed: cfg.corr_window,
                got: 0,
            });
            continue;
        };
        if pair.subject.len() < cfg.corr_window {
            issues.report(PipelineIssue::InsufficientData {
                what: format!("{} correlation", coin_id),
                needed: cfg.corr_window,
                got: pair.subject.len(),
            });
            continue;
        }
        correlations.push(rolling(
            &pair.subject,
            cfg.corr_window,
            RollingOp::Corr(&pair.reference),
        ));
        pairs.push(pair);
    }

    let lowest = lowest_by_minimum(&correlations, cfg.lowest_n);

    let mut regimes = Vec::new();
    let mut volatility = Vec::new();
    for (coin_id, min_corr) in &lowest {
        let (Some(corr), Some(pair)) = (
            correlations.iter().find(|c| &c.key.source == coin_id),
            pairs.iter().find(|p| &p.coin_id == coin_id),
        ) else {
            continue;
        };
        let periods = find_regimes(corr, cfg.corr_threshold, Comparator::Below);
        let records = score(
            &periods,
            &pct_change(&pair.subject),
            &pct_change(&pair.reference),
        );
        log(
            Level::Info,
            Domain::Metrics,
            "low_correlation",
            obj(&[
                ("coin", v_str(coin_id)),
                ("min_corr", v_num(*min_corr)),
                ("regimes", v_num(periods.len() as f64)),
            ]),
        );
        regimes.extend(periods.into_iter().map(|p| (coin_id.clone(), p)));
        volatility.extend(records.into_iter().map(|r| (coin_id.clone(), r)));
    }

    CorrelationStudy {
        correlations,
        lowest,
        regimes,
        volatility,
    }
}

fn align_pair(coin_id: &str, subject: &TimeSeries, reference: &TimeSeries) -> Option<AlignedPair> {
    let frame = align(&[subject.clone(), reference.clone()], JoinKind::Inner)?;
    Some(AlignedPair {
        coin_id: coin_id.to_string(),
        subject: frame.series(subject.key())?,
        reference: frame.series(reference.key())?,
    })
}

pub async fn run_correlation_study<S>(
    source: &S,
    cfg: &Config,
    issues: &mut IssueLog,
) -> Option<CorrelationStudy>
where
    S: MarketDataSource + ?Sized,
{
    let market = fetch_market(source, cfg, issues).await;
    if market.is_empty() {
        issues.report(PipelineIssue::NoData);
        return None;
    }
    Some(correlation_study(&market, cfg, issues))
}

// =============================================================================
// Market cap / volume ratio study
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRatio {
    pub id: String,
    pub market_cap: Option<f64>,
    pub dex_volume: Option<f64>,
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RatioStudy {
    pub ratios: Vec<DerivedSeries>,
    /// Trailing mean of each ratio series.
    pub averages: Vec<DerivedSeries>,
    pub snapshot: Vec<SnapshotRatio>,
}

pub fn ratio_study(market: &MarketData, cfg: &Config, issues: &mut IssueLog) -> RatioStudy {
    let _scope = ProfileScope::new("ratio_study");

    let mut ratios = Vec::new();
    let mut averages = Vec::new();
    for (coin_id, chart) in market.all_charts() {
        if chart.market_cap.is_empty() || chart.volume.is_empty() {
            issues.report(PipelineIssue::InsufficientData {
                what: format!("{} market cap / volume", coin_id),
                needed: 1,
                got: 0,
            });
            continue;
        }
        let r = ratio(
            &DerivedSeries::from(&chart.market_cap),
            &DerivedSeries::from(&chart.volume),
        );
        if r.present_count() < cfg.ratio_ma_window {
            issues.report(PipelineIssue::InsufficientData {
                what: format!("{} ratio average", coin_id),
                needed: cfg.ratio_ma_window,
                got: r.present_count(),
            });
        }
        averages.push(rolling(&r, cfg.ratio_ma_window, RollingOp::Mean));
        ratios.push(r);
    }

    let snapshot = market
        .coins
        .iter()
        .map(|coin| snapshot_ratio(coin, market.chart(&coin.id), issues))
        .collect();

    RatioStudy {
        ratios,
        averages,
        snapshot,
    }
}

/// Listing market cap over the latest daily volume; the listing's own
/// 24h volume stands in when no history was fetched.
fn snapshot_ratio(coin: &MarketCoin, chart: Option<&MarketChart>, issues: &mut IssueLog) -> SnapshotRatio {
    let dex_volume = chart
        .and_then(|c| c.volume.last())
        .map(|p| p.value)
        .or(coin.total_volume);
    let ratio = match (coin.market_cap, dex_volume) {
        (Some(_), Some(v)) if v <= 0.0 => {
            issues.report(PipelineIssue::ZeroDivision {
                what: format!("{} market cap / volume", coin.id),
            });
            None
        }
        (Some(cap), Some(v)) => Some(cap / v),
        _ => None,
    };
    SnapshotRatio {
        id: coin.id.clone(),
        market_cap: coin.market_cap,
        dex_volume,
        ratio,
    }
}

pub async fn run_ratio_study<S>(source: &S, cfg: &Config, issues: &mut IssueLog) -> Option<RatioStudy>
where
    S: MarketDataSource + ?Sized,
{
    let market = fetch_market(source, cfg, issues).await;
    if market.is_empty() {
        issues.report(PipelineIssue::NoData);
        return None;
    }
    Some(ratio_study(&market, cfg, issues))
}

// =============================================================================
// Launch comparison
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct LaunchComparison {
    pub chains: Vec<ChainTvl>,
    /// Coin volumes and the comparison chain's TVL, in days since each
    /// series' first observation.
    pub frame: Option<AlignedFrame>,
}

impl LaunchComparison {
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty() && self.frame.is_none()
    }
}

pub async fn launch_comparison<S>(
    source: &S,
    market: &MarketData,
    cfg: &Config,
    issues: &mut IssueLog,
) -> LaunchComparison
where
    S: MarketDataSource + ?Sized,
{
    let _scope = ProfileScope::with_context("launch_comparison", &[("chain", v_str(&cfg.compare_chain))]);

    let chains = match source.chains_tvl().await {
        Some(chains) => chains,
        None => {
            issues.report(PipelineIssue::SourceUnavailable {
                source_name: DEFILLAMA.into(),
                identifier: "chains".into(),
            });
            Vec::new()
        }
    };
    let directory = ChainDirectory::new(chains);

    let mut series: Vec<TimeSeries> = market.all_charts().map(|(_, c)| c.volume.clone()).collect();

    let chain_name = directory
        .by_name(&cfg.compare_chain)
        .or_else(|| directory.by_gecko_id(&cfg.compare_chain.to_lowercase()))
        .map(|c| c.name.clone());
    match chain_name {
        Some(name) => {
            match source.chain_tvl_history(&name).await {
                Some(tvl) => series.push(tvl),
                None => {
                    issues.report(PipelineIssue::SourceUnavailable {
                        source_name: DEFILLAMA.into(),
                        identifier: format!("{}/tvl", name),
                    });
                }
            }
            match source.chain_dex_volume(&name).await {
                Some(volume) => series.push(volume),
                None => {
                    issues.report(PipelineIssue::SourceUnavailable {
                        source_name: DEFILLAMA.into(),
                        identifier: format!("{}/dexs", name),
                    });
                }
            }
        }
        None if !directory.chains().is_empty() => {
            issues.report(PipelineIssue::MalformedInput {
                identifier: cfg.compare_chain.clone(),
                reason: "no matching chain".into(),
            });
        }
        None => {}
    }

    let frame = align_since_launch(&series, SECS_PER_DAY);
    if let Some(f) = &frame {
        log(
            Level::Info,
            Domain::Align,
            "launch_aligned",
            obj(&[
                ("columns", v_num(f.columns.len() as f64)),
                ("days", v_num(f.rows() as f64)),
            ]),
        );
    }

    LaunchComparison {
        chains: directory.chains().to_vec(),
        frame,
    }
}

pub async fn run_launch_comparison<S>(
    source: &S,
    cfg: &Config,
    issues: &mut IssueLog,
) -> Option<LaunchComparison>
where
    S: MarketDataSource + ?Sized,
{
    let market = fetch_market(source, cfg, issues).await;
    let comparison = launch_comparison(source, &market, cfg, issues).await;
    if market.is_empty() && comparison.is_empty() {
        issues.report(PipelineIssue::NoData);
        return None;
    }
    Some(comparison)
}

// =============================================================================
// Full run
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub market: MarketData,
    pub correlation: CorrelationStudy,
    pub ratio: RatioStudy,
    pub launch: LaunchComparison,
}

/// Fetches once and runs every study over the same data. `None` when no
/// source returned anything.
pub async fn run_all<S>(source: &S, cfg: &Config, issues: &mut IssueLog) -> Option<Report>
where
    S: MarketDataSource + ?Sized,
{
    let market = fetch_market(source, cfg, issues).await;
    let launch = launch_comparison(source, &market, cfg, issues).await;
    if market.is_empty() && launch.is_empty() {
        issues.report(PipelineIssue::NoData);
        return None;
    }
    let correlation = correlation_study(&market, cfg, issues);
    let ratio = ratio_study(&market, cfg, issues);
    Some(Report {
        market,
        correlation,
        ratio,
        launch,
    })
}

#[derive(Debug, Serialize)]
struct LowestRow<'a> {
    series: &'a str,
    min_correlation: f64,
}

/// Writes every table of `report` under `out_dir`; returns the paths written.
pub fn export_report(report: &Report, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let _scope = ProfileScope::new("export_report");
    let mut written = Vec::new();
    let mut target = |name: &str| {
        let path = out_dir.join(name);
        written.push(path.clone());
        path
    };

    export::write_rows(&report.market.coins, &MARKET_COIN_HEADER, &target("market_snapshot.csv"))?;

    let c = &report.correlation;
    export::write_derived(&c.correlations, &target("correlations.csv"))?;
    export::write_rows(
        c.lowest.iter().map(|(series, min_correlation)| LowestRow {
            series,
            min_correlation: *min_correlation,
        }),
        &["series", "min_correlation"],
        &target("lowest_correlation.csv"),
    )?;
    export::write_regimes(&c.regimes, &target("regimes.csv"))?;
    export::write_volatility(&c.volatility, &target("volatility.csv"))?;

    let r = &report.ratio;
    let ratio_columns: Vec<DerivedSeries> = r.ratios.iter().chain(r.averages.iter()).cloned().collect();
    export::write_derived(&ratio_columns, &target("mcap_volume_ratio.csv"))?;
    export::write_rows(
        &r.snapshot,
        &["id", "market_cap", "dex_volume", "ratio"],
        &target("mcap_volume_snapshot.csv"),
    )?;

    export::write_rows(&report.launch.chains, &CHAIN_TVL_HEADER, &target("chain_tvl.csv"))?;
    if let Some(frame) = &report.launch.frame {
        export::write_frame(frame, &target("launch_comparison.csv"))?;
    }

    log(
        Level::Info,
        Domain::Export,
        "report_exported",
        obj(&[
            ("dir", v_str(&out_dir.display().to_string())),
            ("tables", v_num(written.len() as f64)),
        ]),
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Metric, SeriesKey};
    use async_trait::async_trait;
    use std::collections::HashMap;

    const DAY: i64 = SECS_PER_DAY;

    #[derive(Default)]
    struct StubSource {
        coins: Option<Vec<MarketCoin>>,
        charts: HashMap<String, MarketChart>,
        chains: Option<Vec<ChainTvl>>,
        tvl: HashMap<String, TimeSeries>,
        dex: HashMap<String, TimeSeries>,
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        async fn top_coins(&self, limit: usize) -> Option<Vec<MarketCoin>> {
            self.coins.clone().map(|mut c| {
                c.truncate(limit);
                c
            })
        }

        async fn market_chart(&self, coin_id: &str, _days: u32) -> Option<MarketChart> {
            self.charts.get(coin_id).cloned()
        }

        async fn chains_tvl(&self) -> Option<Vec<ChainTvl>> {
            self.chains.clone()
        }

        async fn chain_tvl_history(&self, chain: &str) -> Option<TimeSeries> {
            self.tvl.get(chain).cloned()
        }

        async fn chain_dex_volume(&self, chain: &str) -> Option<TimeSeries> {
            self.dex.get(chain).cloned()
        }
    }

    fn coin(id: &str, market_cap: Option<f64>, total_volume: Option<f64>) -> MarketCoin {
        MarketCoin {
            id: id.into(),
            name: id.to_uppercase(),
            symbol: id[..1].into(),
            market_cap,
            total_volume,
            price: Some(1.0),
            circulating_supply: None,
        }
    }

    fn chart(id: &str, start_day: i64, volumes: &[f64], caps: &[f64]) -> MarketChart {
        let at = |i: usize| (start_day + i as i64) * DAY;
        MarketChart {
            price: TimeSeries::from_points(SeriesKey::new(id, Metric::Price), volumes.iter().enumerate().map(|(i, _)| (at(i), 1.0))),
            market_cap: TimeSeries::from_points(SeriesKey::new(id, Metric::MarketCap), caps.iter().enumerate().map(|(i, v)| (at(i), *v))),
            volume: TimeSeries::from_points(SeriesKey::new(id, Metric::DexVolume), volumes.iter().enumerate().map(|(i, v)| (at(i), *v))),
        }
    }

    /// 20 days: alpha tracks the reference linearly, beta alternates and is
    /// uncorrelated with it over any 15-day window.
    fn stub() -> StubSource {
        let linear: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let alpha: Vec<f64> = linear.iter().map(|v| 2.0 * v + 3.0).collect();
        let beta: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { 11.0 }).collect();
        let caps = vec![100.0; 20];

        let mut charts = HashMap::new();
        charts.insert("ethereum".to_string(), chart("ethereum", 0, &linear, &caps));
        charts.insert("alpha".to_string(), chart("alpha", 0, &alpha, &caps));
        charts.insert("beta".to_string(), chart("beta", 0, &beta, &caps));

        let mut tvl = HashMap::new();
        tvl.insert(
            "Aptos".to_string(),
            TimeSeries::from_points(SeriesKey::new("aptos", Metric::Tvl), (0..5).map(|i| ((300 + i) * DAY, 10.0 + i as f64))),
        );
        let mut dex = HashMap::new();
        dex.insert(
            "Aptos".to_string(),
            TimeSeries::from_points(SeriesKey::new("aptos", Metric::ChainDexVolume), (0..3).map(|i| ((310 + i) * DAY, 2.0))),
        );

        StubSource {
            coins: Some(vec![
                coin("ethereum", Some(1000.0), Some(20.0)),
                coin("alpha", Some(500.0), Some(5.0)),
                coin("beta", Some(200.0), None),
            ]),
            charts,
            chains: Some(vec![ChainTvl {
                name: "Aptos".into(),
                tvl: Some(14.0),
                symbol: Some("APT".into()),
                gecko_id: Some("aptos".into()),
            }]),
            tvl,
            dex,
        }
    }

    #[tokio::test]
    async fn test_correlation_study_ranks_uncorrelated_first() {
        let cfg = Config::default();
        let mut issues = IssueLog::new();
        let study = run_correlation_study(&stub(), &cfg, &mut issues).await.unwrap();

        assert_eq!(study.correlations.len(), 2);
        assert_eq!(study.lowest[0].0, "beta");
        assert_eq!(study.lowest[1].0, "alpha");
        assert!(study.lowest[1].1 > 0.99);

        // correlation defined from day 14 to day 19, all below 0.2 for beta
        let beta: Vec<_> = study.regimes.iter().filter(|(c, _)| c == "beta").collect();
        assert_eq!(beta.len(), 1);
        assert_eq!(beta[0].1.start, 14 * DAY);
        assert_eq!(beta[0].1.duration, 6);
        assert!(study.regimes.iter().all(|(c, _)| c != "alpha"));

        assert_eq!(study.volatility.len(), 1);
        assert!(study.volatility[0].1.ratio.is_some());
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_short_history_reported() {
        let mut source = stub();
        source.charts.insert("alpha".to_string(), chart("alpha", 0, &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]));
        let mut issues = IssueLog::new();
        let study = run_correlation_study(&source, &Config::default(), &mut issues).await.unwrap();
        assert_eq!(study.correlations.len(), 1);
        assert_eq!(issues.count("insufficient_data"), 1);
    }

    #[tokio::test]
    async fn test_ratio_study_zero_volume_is_absent() {
        let mut source = stub();
        let mut volumes = vec![5.0; 10];
        volumes[9] = 0.0;
        source.charts.insert("alpha".to_string(), chart("alpha", 0, &volumes, &[50.0; 10]));
        let mut issues = IssueLog::new();
        let study = run_ratio_study(&source, &Config::default(), &mut issues).await.unwrap();

        let alpha = study.ratios.iter().find(|r| r.key.source == "alpha").unwrap();
        assert_eq!(alpha.values[0], Some(10.0));
        assert_eq!(alpha.values[9], None);

        let snap = study.snapshot.iter().find(|s| s.id == "alpha").unwrap();
        assert_eq!(snap.dex_volume, Some(0.0));
        assert_eq!(snap.ratio, None);
        assert_eq!(issues.count("zero_division"), 1);

        let eth = study.snapshot.iter().find(|s| s.id == "ethereum").unwrap();
        assert_eq!(eth.ratio, Some(1000.0 / 20.0));
    }

    #[tokio::test]
    async fn test_launch_comparison_rebases_each_series() {
        let mut issues = IssueLog::new();
        let launch = run_launch_comparison(&stub(), &Config::default(), &mut issues).await.unwrap();
        let frame = launch.frame.unwrap();
        assert_eq!(frame.index[0], 0);
        assert_eq!(frame.rows(), 20);
        let aptos = SeriesKey::new("aptos", Metric::Tvl);
        assert_eq!(frame.cell(0, &aptos), Some(10.0));
        assert_eq!(frame.cell(5, &aptos), None);
        let aptos_dex = SeriesKey::new("aptos", Metric::ChainDexVolume);
        assert_eq!(frame.cell(2, &aptos_dex), Some(2.0));
        assert_eq!(frame.cell(3, &aptos_dex), None);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_chain_volume_does_not_collide_with_coin_volume() {
        let mut source = stub();
        source.chains = Some(vec![ChainTvl {
            name: "Ethereum".into(),
            tvl: Some(5.0e10),
            symbol: Some("ETH".into()),
            gecko_id: Some("ethereum".into()),
        }]);
        source.tvl.insert(
            "Ethereum".to_string(),
            TimeSeries::from_points(SeriesKey::new("ethereum", Metric::Tvl), (0..4).map(|i| (i * DAY, 40.0))),
        );
        source.dex.insert(
            "Ethereum".to_string(),
            TimeSeries::from_points(SeriesKey::new("ethereum", Metric::ChainDexVolume), (0..4).map(|i| (i * DAY, 700.0))),
        );
        let cfg = Config {
            compare_chain: "Ethereum".into(),
            ..Config::default()
        };
        let mut issues = IssueLog::new();
        let launch = run_launch_comparison(&source, &cfg, &mut issues).await.unwrap();
        let frame = launch.frame.unwrap();

        let mut labels: Vec<String> = frame.columns.iter().map(|c| c.key.label()).collect();
        let total = labels.len();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), total);

        let coin_volume = SeriesKey::new("ethereum", Metric::DexVolume);
        let chain_volume = SeriesKey::new("ethereum", Metric::ChainDexVolume);
        assert_eq!(frame.cell(0, &coin_volume), Some(1.0));
        assert_eq!(frame.cell(0, &chain_volume), Some(700.0));
        assert_eq!(frame.cell(4, &chain_volume), None);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_chain_is_malformed() {
        let cfg = Config {
            compare_chain: "Nowhere".into(),
            ..Config::default()
        };
        let mut issues = IssueLog::new();
        let launch = run_launch_comparison(&stub(), &cfg, &mut issues).await.unwrap();
        assert_eq!(issues.count("malformed_input"), 1);
        let frame = launch.frame.unwrap();
        assert!(frame.columns.iter().all(|c| c.key.metric != Metric::Tvl));
    }

    #[tokio::test]
    async fn test_all_sources_empty_reports_no_data_once() {
        let mut issues = IssueLog::new();
        assert!(run_all(&StubSource::default(), &Config::default(), &mut issues).await.is_none());
        assert_eq!(issues.count("no_data"), 1);
        assert!(issues.count("source_unavailable") >= 2);
    }

    #[tokio::test]
    async fn test_export_report_writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut issues = IssueLog::new();
        let report = run_all(&stub(), &Config::default(), &mut issues).await.unwrap();
        let written = export_report(&report, dir.path()).unwrap();
        assert!(written.iter().any(|p| p.ends_with("launch_comparison.csv")));
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
            assert!(crate::data::default_manifest_path(path).exists());
        }
    }
}
