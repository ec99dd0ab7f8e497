//! Minimal Solana JSON-RPC client for network statistics.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_pubkey::Pubkey;
use std::str::FromStr;

use super::http::{absent_on_error, FetchError, HttpClient};
use super::retry::retry_async;

const SOURCE: &str = "solana_rpc";

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccount {
    pub vote_pubkey: String,
    pub activated_stake: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct VoteAccounts {
    #[serde(default)]
    pub current: Vec<VoteAccount>,
    #[serde(default)]
    pub delinquent: Vec<VoteAccount>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AccountInfo {
    pub lamports: u64,
}

#[derive(Deserialize, Debug)]
struct AccountInfoResult {
    value: Option<AccountInfo>,
}

/// Parses a base58 address that must decode to exactly 32 bytes.
pub fn parse_pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|err| anyhow::anyhow!("{:?}", err))
}

pub struct SolanaRpc {
    url: String,
    http: HttpClient,
}

impl SolanaRpc {
    pub fn new(url: &str, http: HttpClient) -> Self {
        Self {
            url: url.to_string(),
            http,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let http = &self.http;
        let url = self.url.as_str();
        let body = &body;
        retry_async(http.retry_policy(), method, move || async move {
            let resp: RpcResponse<T> = http.post_json_once(url, body).await?;
            decode(resp)
        })
        .await
    }
}

/// Cluster queries the network statistics need. `None` means the call failed
/// after retries and the failure is already logged.
#[async_trait]
pub trait ClusterRpc {
    async fn vote_accounts(&self) -> Option<VoteAccounts>;
    async fn slot(&self) -> Option<u64>;
    async fn blocks(&self, start: u64, end: u64) -> Option<Vec<u64>>;
    /// Also `None` when the node has no time for the slot.
    async fn block_time(&self, slot: u64) -> Option<i64>;
    /// Outer `None`: call failed. Inner `None`: account does not exist.
    async fn account_info(&self, address: &str) -> Option<Option<AccountInfo>>;
}

#[async_trait]
impl ClusterRpc for SolanaRpc {
    async fn vote_accounts(&self) -> Option<VoteAccounts> {
        let result = self.call::<VoteAccounts>("getVoteAccounts", json!([])).await;
        absent_on_error(SOURCE, "getVoteAccounts", result).flatten()
    }

    async fn slot(&self) -> Option<u64> {
        let result = self.call::<u64>("getSlot", json!([])).await;
        absent_on_error(SOURCE, "getSlot", result).flatten()
    }

    async fn blocks(&self, start: u64, end: u64) -> Option<Vec<u64>> {
        let result = self.call::<Vec<u64>>("getBlocks", json!([start, end])).await;
        absent_on_error(SOURCE, "getBlocks", result).flatten()
    }

    async fn block_time(&self, slot: u64) -> Option<i64> {
        let result = self.call::<i64>("getBlockTime", json!([slot])).await;
        absent_on_error(SOURCE, &format!("getBlockTime/{}", slot), result).flatten()
    }

    async fn account_info(&self, address: &str) -> Option<Option<AccountInfo>> {
        let result = self
            .call::<AccountInfoResult>("getAccountInfo", json!([address, {"encoding": "base64"}]))
            .await;
        absent_on_error(SOURCE, address, result).map(|r| r.and_then(|r| r.value))
    }
}

fn decode<T>(resp: RpcResponse<T>) -> Result<Option<T>> {
    if let Some(err) = resp.error {
        return Err(FetchError::Rpc {
            code: err.code,
            message: err.message,
        }
        .into());
    }
    Ok(resp.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_accounts_decode() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":{"current":[
            {"votePubkey":"A","activatedStake":2000000000,"commission":7},
            {"votePubkey":"B","activatedStake":500000000}],"delinquent":[]}}"#;
        let resp: RpcResponse<VoteAccounts> = serde_json::from_str(raw).unwrap();
        let accounts = decode(resp).unwrap().unwrap();
        assert_eq!(accounts.current.len(), 2);
        assert_eq!(accounts.current[0].activated_stake, 2_000_000_000);
    }

    #[test]
    fn test_null_block_time_is_absent() {
        let resp: RpcResponse<i64> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(decode(resp).unwrap(), None);
    }

    #[test]
    fn test_rpc_error_surfaces() {
        let resp: RpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#,
        )
        .unwrap();
        let err = decode(resp).unwrap_err();
        let fetch = err.downcast_ref::<FetchError>().unwrap();
        assert!(!fetch.is_retryable());
    }

    #[test]
    fn test_missing_account_value() {
        let r: AccountInfoResult =
            serde_json::from_str(r#"{"context":{"slot":1},"value":null}"#).unwrap();
        assert!(r.value.is_none());
    }

    #[test]
    fn test_pubkey_must_decode_to_32_bytes() {
        assert!(parse_pubkey("6MBpP5Fm913JvCnw42JYEJeKEceu4K2kmSPCqY6Y1q8y").is_ok());
        assert!(parse_pubkey("11111111111111111111111111111111").is_ok());
        assert!(parse_pubkey("not-a-key").is_err());
        assert!(parse_pubkey("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl").is_err());
        // right alphabet and length, but 33 bytes once decoded
        assert!(parse_pubkey(&"z".repeat(44)).is_err());
    }
}
