//! Data source adapters.
//!
//! Adapters return `None` for anything they could not fetch after retries;
//! the failure has already been logged by then. Timestamps in returned
//! series are epoch seconds regardless of what the provider sends.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::series::TimeSeries;

pub mod coingecko;
pub mod defillama;
pub mod http;
pub mod retry;
pub mod solana;

use coingecko::CoinGecko;
use defillama::DefiLlama;
use http::HttpClient;

/// One row of a market-cap-ordered coin listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default, rename(deserialize = "current_price"))]
    pub price: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
}

/// Current TVL of one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTvl {
    pub name: String,
    #[serde(default)]
    pub tvl: Option<f64>,
    #[serde(default, rename(deserialize = "tokenSymbol"))]
    pub symbol: Option<String>,
    #[serde(default)]
    pub gecko_id: Option<String>,
}

/// Daily history for one coin.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketChart {
    pub price: TimeSeries,
    pub market_cap: TimeSeries,
    pub volume: TimeSeries,
}

#[async_trait]
pub trait MarketDataSource {
    async fn top_coins(&self, limit: usize) -> Option<Vec<MarketCoin>>;
    async fn market_chart(&self, coin_id: &str, days: u32) -> Option<MarketChart>;
    async fn chains_tvl(&self) -> Option<Vec<ChainTvl>>;
    async fn chain_tvl_history(&self, chain: &str) -> Option<TimeSeries>;
    async fn chain_dex_volume(&self, chain: &str) -> Option<TimeSeries>;
}

/// CoinGecko for market data, DefiLlama for chain TVL and DEX volume, over
/// one shared paced client.
pub struct PublicApis {
    coingecko: CoinGecko,
    defillama: DefiLlama,
    http: HttpClient,
}

impl PublicApis {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            coingecko: CoinGecko::new(&cfg.coingecko_base, &cfg.vs_currency),
            defillama: DefiLlama::new(&cfg.defillama_base),
            http: HttpClient::from_config(cfg)?,
        })
    }
}

#[async_trait]
impl MarketDataSource for PublicApis {
    async fn top_coins(&self, limit: usize) -> Option<Vec<MarketCoin>> {
        self.coingecko.top_coins(&self.http, limit).await
    }

    async fn market_chart(&self, coin_id: &str, days: u32) -> Option<MarketChart> {
        self.coingecko.market_chart(&self.http, coin_id, days).await
    }

    async fn chains_tvl(&self) -> Option<Vec<ChainTvl>> {
        self.defillama.chains(&self.http).await
    }

    async fn chain_tvl_history(&self, chain: &str) -> Option<TimeSeries> {
        self.defillama.tvl_history(&self.http, chain).await
    }

    async fn chain_dex_volume(&self, chain: &str) -> Option<TimeSeries> {
        self.defillama.dex_volume(&self.http, chain).await
    }
}

/// Maps CoinGecko coin ids to DefiLlama chain names.
#[derive(Debug, Clone, Default)]
pub struct ChainDirectory {
    chains: Vec<ChainTvl>,
}

impl ChainDirectory {
    pub fn new(chains: Vec<ChainTvl>) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &[ChainTvl] {
        &self.chains
    }

    pub fn by_gecko_id(&self, coin_id: &str) -> Option<&ChainTvl> {
        self.chains
            .iter()
            .find(|c| c.gecko_id.as_deref() == Some(coin_id))
    }

    pub fn by_name(&self, name: &str) -> Option<&ChainTvl> {
        self.chains.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_coin_nulls_are_absent() {
        let raw = r#"[{"id":"bitcoin","name":"Bitcoin","symbol":"btc","market_cap":null,
            "total_volume":123.5,"current_price":65000.0}]"#;
        let coins: Vec<MarketCoin> = serde_json::from_str(raw).unwrap();
        assert_eq!(coins[0].market_cap, None);
        assert_eq!(coins[0].total_volume, Some(123.5));
        assert_eq!(coins[0].price, Some(65000.0));
        assert_eq!(coins[0].circulating_supply, None);
    }

    #[test]
    fn test_chain_directory_lookup() {
        let raw = r#"[{"name":"Aptos","tvl":1.0e9,"tokenSymbol":"APT","gecko_id":"aptos"},
                      {"name":"Ethereum","tvl":5.0e10,"tokenSymbol":"ETH","gecko_id":"ethereum"},
                      {"name":"Unknown","tvl":null}]"#;
        let chains: Vec<ChainTvl> = serde_json::from_str(raw).unwrap();
        let dir = ChainDirectory::new(chains);
        assert_eq!(dir.by_gecko_id("aptos").unwrap().name, "Aptos");
        assert_eq!(dir.by_name("ethereum").unwrap().symbol.as_deref(), Some("ETH"));
        assert!(dir.by_gecko_id("dogecoin").is_none());
    }
}
