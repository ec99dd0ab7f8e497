use serde::Deserialize;

use super::http::{absent_on_error, HttpClient};
use super::{MarketChart, MarketCoin};
use crate::logging::log_fetched;
use crate::series::{Metric, SeriesKey, TimeSeries};

const SOURCE: &str = "coingecko";

/// `/coins/{id}/market_chart` payload: `[epoch_ms, value]` pairs.
#[derive(Deserialize, Debug, Default)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
}

pub struct CoinGecko {
    base: String,
    vs_currency: String,
}

impl CoinGecko {
    pub fn new(base: &str, vs_currency: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
        }
    }

    pub async fn top_coins(&self, http: &HttpClient, limit: usize) -> Option<Vec<MarketCoin>> {
        let url = format!("{}/coins/markets", self.base);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", limit.to_string()),
            ("page", "1".to_string()),
        ];
        let coins = absent_on_error(
            SOURCE,
            "coins/markets",
            http.get_json::<Vec<MarketCoin>, _>(&url, &query[..]).await,
        )?;
        log_fetched(SOURCE, "coins/markets", coins.len());
        Some(coins)
    }

    pub async fn market_chart(
        &self,
        http: &HttpClient,
        coin_id: &str,
        days: u32,
    ) -> Option<MarketChart> {
        let url = format!("{}/coins/{}/market_chart", self.base, coin_id);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("days", days.to_string()),
        ];
        let raw = absent_on_error(
            SOURCE,
            coin_id,
            http.get_json::<MarketChartResponse, _>(&url, &query[..]).await,
        )?;
        let chart = parse_market_chart(coin_id, raw);
        log_fetched(SOURCE, coin_id, chart.volume.len());
        Some(chart)
    }
}

fn to_series(coin_id: &str, metric: Metric, raw: Vec<(f64, Option<f64>)>) -> TimeSeries {
    TimeSeries::daily(
        SeriesKey::new(coin_id, metric),
        raw.into_iter()
            .filter_map(|(ms, v)| v.map(|v| ((ms / 1000.0).floor() as i64, v))),
    )
}

fn parse_market_chart(coin_id: &str, raw: MarketChartResponse) -> MarketChart {
    MarketChart {
        price: to_series(coin_id, Metric::Price, raw.prices),
        market_cap: to_series(coin_id, Metric::MarketCap, raw.market_caps),
        volume: to_series(coin_id, Metric::DexVolume, raw.total_volumes),
    }
}
