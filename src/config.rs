use crate::source::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub coingecko_base: String,
    pub defillama_base: String,
    pub solana_rpc_url: String,
    pub vs_currency: String,
    pub history_days: u32,
    pub top_n: usize,
    pub reference_coin: String,
    pub compare_chain: String,
    pub corr_window: usize,
    pub corr_threshold: f64,
    pub lowest_n: usize,
    pub ratio_ma_window: usize,
    pub out_dir: String,
    pub retry: RetryPolicy,
    /// Minimum spacing between two outbound calls.
    pub call_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub block_sample: u64,
    pub stake_account: Option<String>,
    pub stake_apr: f64,
    pub stake_epochs: u32,
    pub stake_fees_sol: f64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            coingecko_base: std::env::var("COINGECKO_BASE").unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            defillama_base: std::env::var("DEFILLAMA_BASE").unwrap_or_else(|_| "https://api.llama.fi".to_string()),
            solana_rpc_url: std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            vs_currency: std::env::var("VS_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            history_days: env_or("HISTORY_DAYS", 730),
            top_n: env_or("TOP_N", 20),
            reference_coin: std::env::var("REFERENCE_COIN").unwrap_or_else(|_| "ethereum".to_string()),
            compare_chain: std::env::var("COMPARE_CHAIN").unwrap_or_else(|_| "Aptos".to_string()),
            corr_window: env_or("CORR_WINDOW", 15),
            corr_threshold: env_or("CORR_THRESHOLD", 0.2),
            lowest_n: env_or("LOWEST_N", 5),
            ratio_ma_window: env_or("RATIO_MA_WINDOW", 7),
            out_dir: std::env::var("OUT_DIR").unwrap_or_else(|_| "out".to_string()),
            retry: RetryPolicy {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", 4),
                base_delay_ms: env_or("RETRY_BASE_MS", 500),
                multiplier: env_or("RETRY_MULTIPLIER", 2.0),
                max_delay_ms: env_or("RETRY_MAX_MS", 10_000),
                jitter_factor: env_or("RETRY_JITTER", 0.2),
            },
            call_delay_ms: env_or("CALL_DELAY_MS", 1_200),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 15),
            block_sample: env_or("BLOCK_SAMPLE", 25),
            stake_account: std::env::var("STAKE_ACCOUNT").ok().filter(|s| !s.is_empty()),
            stake_apr: env_or("STAKE_APR", 0.05),
            stake_epochs: env_or("STAKE_EPOCHS", 10),
            stake_fees_sol: env_or("STAKE_FEES_SOL", 0.1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coingecko_base: "https://api.coingecko.com/api/v3".to_string(),
            defillama_base: "https://api.llama.fi".to_string(),
            solana_rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            vs_currency: "usd".to_string(),
            history_days: 730,
            top_n: 20,
            reference_coin: "ethereum".to_string(),
            compare_chain: "Aptos".to_string(),
            corr_window: 15,
            corr_threshold: 0.2,
            lowest_n: 5,
            ratio_ma_window: 7,
            out_dir: "out".to_string(),
            retry: RetryPolicy::default(),
            call_delay_ms: 1_200,
            request_timeout_secs: 15,
            block_sample: 25,
            stake_account: None,
            stake_apr: 0.05,
            stake_epochs: 10,
            stake_fees_sol: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_study_parameters() {
        let cfg = Config::default();
        assert_eq!(cfg.corr_window, 15);
        assert_eq!(cfg.ratio_ma_window, 7);
        assert_eq!(cfg.history_days, 730);
        assert!((cfg.corr_threshold - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CHAINPULSE_TEST_BAD_NUM", "abc");
        assert_eq!(env_or("CHAINPULSE_TEST_BAD_NUM", 7u32), 7);
    }
}
