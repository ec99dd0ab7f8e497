use serde::Deserialize;

use super::http::{absent_on_error, HttpClient};
use super::ChainTvl;
use crate::logging::log_fetched;
use crate::series::{Metric, SeriesKey, TimeSeries};

const SOURCE: &str = "defillama";

#[derive(Deserialize, Debug)]
struct TvlPoint {
    date: i64,
    tvl: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
struct DexOverview {
    #[serde(default, rename = "totalDataChart")]
    total_data_chart: Vec<(i64, Option<f64>)>,
}

pub struct DefiLlama {
    base: String,
}

impl DefiLlama {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn chains(&self, http: &HttpClient) -> Option<Vec<ChainTvl>> {
        let url = format!("{}/chains", self.base);
        let chains = absent_on_error(
            SOURCE,
            "chains",
            http.get_json::<Vec<ChainTvl>, _>(&url, &[] as &[(&str, &str)]).await,
        )?;
        log_fetched(SOURCE, "chains", chains.len());
        Some(chains)
    }

    pub async fn tvl_history(&self, http: &HttpClient, chain: &str) -> Option<TimeSeries> {
        let url = format!("{}/v2/historicalChainTvl/{}", self.base, chain);
        let raw = absent_on_error(
            SOURCE,
            chain,
            http.get_json::<Vec<TvlPoint>, _>(&url, &[] as &[(&str, &str)]).await,
        )?;
        let series = tvl_series(chain, raw);
        log_fetched(SOURCE, chain, series.len());
        Some(series)
    }

    pub async fn dex_volume(&self, http: &HttpClient, chain: &str) -> Option<TimeSeries> {
        let url = format!("{}/overview/dexs/{}", self.base, chain);
        let query = [
            ("excludeTotalDataChart", "false"),
            ("excludeTotalDataChartBreakdown", "true"),
            ("dataType", "dailyVolume"),
        ];
        let raw = absent_on_error(
            SOURCE,
            chain,
            http.get_json::<DexOverview, _>(&url, &query[..]).await,
        )?;
        let series = dex_series(chain, raw);
        log_fetched(SOURCE, chain, series.len());
        Some(series)
    }
}

fn tvl_series(chain: &str, raw: Vec<TvlPoint>) -> TimeSeries {
    TimeSeries::daily(
        SeriesKey::new(&chain.to_lowercase(), Metric::Tvl),
        raw.into_iter().filter_map(|p| p.tvl.map(|v| (p.date, v))),
    )
}

fn dex_series(chain: &str, raw: DexOverview) -> TimeSeries {
    TimeSeries::daily(
        SeriesKey::new(&chain.to_lowercase(), Metric::ChainDexVolume),
        raw.total_data_chart
            .into_iter()
            .filter_map(|(ts, v)| v.map(|v| (ts, v))),
    )
}
