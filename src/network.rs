//! Solana network statistics: validators, stake, block times, staking yield.

use serde::Serialize;

use crate::error::{IssueLog, PipelineIssue};
use crate::logging::{log, obj, v_num, v_opt, v_str, Domain, Level};
use crate::source::solana::{parse_pubkey, ClusterRpc, VoteAccounts};

const SOURCE: &str = "solana_rpc";

pub const LAMPORTS_PER_SOL: f64 = 1e9;
/// Roughly two days per epoch.
pub const EPOCHS_PER_YEAR: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidatorSnapshot {
    pub active_validators: usize,
    pub delinquent_validators: usize,
    pub total_staked_sol: f64,
}

impl ValidatorSnapshot {
    pub fn from_vote_accounts(accounts: &VoteAccounts) -> Self {
        let lamports: u64 = accounts.current.iter().map(|v| v.activated_stake).sum();
        Self {
            active_validators: accounts.current.len(),
            delinquent_validators: accounts.delinquent.len(),
            total_staked_sol: lamports as f64 / LAMPORTS_PER_SOL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockTimeSample {
    pub blocks_requested: u64,
    /// Blocks that reported a time.
    pub samples: usize,
    pub average_secs: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StakeEstimate {
    pub staked_sol: f64,
    pub estimated_rewards_sol: f64,
    pub real_yield_pct: Option<f64>,
}

/// Mean gap between consecutive block times; `None` below two samples.
pub fn average_block_time(times: &[i64]) -> Option<f64> {
    if times.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = times.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    Some(diffs.iter().sum::<f64>() / diffs.len() as f64)
}

pub fn estimate_rewards(apr: f64, epochs: u32, staked_sol: f64) -> f64 {
    (apr / EPOCHS_PER_YEAR) * staked_sol * epochs as f64
}

/// Net reward as a percentage of stake; `None` when nothing is staked.
pub fn real_yield(staked_sol: f64, rewards_sol: f64, fees_sol: f64) -> Option<f64> {
    if staked_sol <= 0.0 {
        return None;
    }
    Some((rewards_sol - fees_sol) / staked_sol * 100.0)
}

fn unavailable(issues: &mut IssueLog, identifier: &str) {
    issues.report(PipelineIssue::SourceUnavailable {
        source_name: SOURCE.into(),
        identifier: identifier.to_string(),
    });
}

pub async fn validator_snapshot<R>(rpc: &R, issues: &mut IssueLog) -> Option<ValidatorSnapshot>
where
    R: ClusterRpc + ?Sized,
{
    let Some(accounts) = rpc.vote_accounts().await else {
        unavailable(issues, "getVoteAccounts");
        return None;
    };
    let snapshot = ValidatorSnapshot::from_vote_accounts(&accounts);
    log(
        Level::Info,
        Domain::Network,
        "validators",
        obj(&[
            ("active", v_num(snapshot.active_validators as f64)),
            ("delinquent", v_num(snapshot.delinquent_validators as f64)),
            ("total_staked_sol", v_num(snapshot.total_staked_sol)),
        ]),
    );
    Some(snapshot)
}

/// Average block time over the `sample` most recent blocks. `None` when the
/// slot range itself could not be fetched.
pub async fn recent_block_time<R>(rpc: &R, sample: u64, issues: &mut IssueLog) -> Option<BlockTimeSample>
where
    R: ClusterRpc + ?Sized,
{
    let Some(current) = rpc.slot().await else {
        unavailable(issues, "getSlot");
        return None;
    };
    let Some(blocks) = rpc.blocks(current.saturating_sub(sample), current).await else {
        unavailable(issues, "getBlocks");
        return None;
    };

    let mut times = Vec::with_capacity(blocks.len());
    for slot in blocks {
        if let Some(t) = rpc.block_time(slot).await {
            times.push(t);
        }
    }

    let average = average_block_time(&times);
    if average.is_none() {
        issues.report(PipelineIssue::InsufficientData {
            what: "block times".into(),
            needed: 2,
            got: times.len(),
        });
    }
    log(
        Level::Info,
        Domain::Network,
        "block_time",
        obj(&[("samples", v_num(times.len() as f64)), ("avg_secs", v_opt(average))]),
    );
    Some(BlockTimeSample {
        blocks_requested: sample,
        samples: times.len(),
        average_secs: average,
    })
}

pub async fn stake_estimate<R>(
    rpc: &R,
    address: &str,
    apr: f64,
    epochs: u32,
    fees_sol: f64,
    issues: &mut IssueLog,
) -> Option<StakeEstimate>
where
    R: ClusterRpc + ?Sized,
{
    if let Err(err) = parse_pubkey(address) {
        issues.report(PipelineIssue::MalformedInput {
            identifier: address.to_string(),
            reason: format!("not a public key: {}", err),
        });
        return None;
    }
    let Some(account) = rpc.account_info(address).await else {
        unavailable(issues, address);
        return None;
    };
    let Some(account) = account else {
        log(
            Level::Warn,
            Domain::Network,
            "stake_account_missing",
            obj(&[("identifier", v_str(address))]),
        );
        return None;
    };

    let staked_sol = account.lamports as f64 / LAMPORTS_PER_SOL;
    let rewards = estimate_rewards(apr, epochs, staked_sol);
    let real_yield_pct = real_yield(staked_sol, rewards, fees_sol);
    if real_yield_pct.is_none() {
        issues.report(PipelineIssue::ZeroDivision {
            what: format!("real yield for {}", address),
        });
    }
    Some(StakeEstimate {
        staked_sol,
        estimated_rewards_sol: rewards,
        real_yield_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::solana::{AccountInfo, VoteAccount};
    use async_trait::async_trait;
    use std::collections::HashMap;

    const STAKER: &str = "6MBpP5Fm913JvCnw42JYEJeKEceu4K2kmSPCqY6Y1q8y";

    #[derive(Default)]
    struct StubCluster {
        slot: Option<u64>,
        blocks: Option<Vec<u64>>,
        times: HashMap<u64, i64>,
        accounts: Option<HashMap<String, u64>>,
    }

    #[async_trait]
    impl ClusterRpc for StubCluster {
        async fn vote_accounts(&self) -> Option<VoteAccounts> {
            None
        }

        async fn slot(&self) -> Option<u64> {
            self.slot
        }

        async fn blocks(&self, start: u64, end: u64) -> Option<Vec<u64>> {
            let blocks = self.blocks.as_ref()?;
            Some(blocks.iter().copied().filter(|s| (start..=end).contains(s)).collect())
        }

        async fn block_time(&self, slot: u64) -> Option<i64> {
            self.times.get(&slot).copied()
        }

        async fn account_info(&self, address: &str) -> Option<Option<AccountInfo>> {
            let accounts = self.accounts.as_ref()?;
            Some(accounts.get(address).map(|&lamports| AccountInfo { lamports }))
        }
    }

    fn cluster_with_blocks() -> StubCluster {
        StubCluster {
            slot: Some(110),
            // slot 104 was skipped and 106 has no recorded time
            blocks: Some(vec![100, 101, 102, 103, 105, 106, 107]),
            times: [(100, 1_000), (101, 1_001), (102, 1_001), (103, 1_002), (105, 1_003), (107, 1_004)]
                .into_iter()
                .collect(),
            accounts: None,
        }
    }

    #[test]
    fn test_average_block_time() {
        assert_eq!(average_block_time(&[100, 101, 103]), Some(1.5));
        assert_eq!(average_block_time(&[100]), None);
        assert_eq!(average_block_time(&[]), None);
    }

    #[test]
    fn test_estimate_rewards() {
        // 5% APR, 180 epochs = one year on 100 SOL
        let r = estimate_rewards(0.05, 180, 100.0);
        assert!((r - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_real_yield() {
        let y = real_yield(100.0, 5.0, 0.2).unwrap();
        assert!((y - 4.8).abs() < 1e-9);
        assert_eq!(real_yield(0.0, 5.0, 0.2), None);
        assert_eq!(real_yield(-1.0, 5.0, 0.2), None);
    }

    #[test]
    fn test_validator_snapshot() {
        let accounts = VoteAccounts {
            current: vec![
                VoteAccount { vote_pubkey: "a".into(), activated_stake: 3_000_000_000 },
                VoteAccount { vote_pubkey: "b".into(), activated_stake: 1_000_000_000 },
            ],
            delinquent: vec![VoteAccount { vote_pubkey: "c".into(), activated_stake: 1 }],
        };
        let snap = ValidatorSnapshot::from_vote_accounts(&accounts);
        assert_eq!(snap.active_validators, 2);
        assert_eq!(snap.delinquent_validators, 1);
        assert!((snap.total_staked_sol - 4.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_recent_block_time_averages_reported_blocks() {
        let rpc = cluster_with_blocks();
        let mut issues = IssueLog::new();
        let sample = recent_block_time(&rpc, 10, &mut issues).await.unwrap();
        assert_eq!(sample.blocks_requested, 10);
        assert_eq!(sample.samples, 6);
        // 1000..=1004 over five gaps
        assert!((sample.average_secs.unwrap() - 0.8).abs() < 1e-12);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_recent_block_time_reports_failed_slot() {
        let rpc = StubCluster { slot: None, ..cluster_with_blocks() };
        let mut issues = IssueLog::new();
        assert!(recent_block_time(&rpc, 10, &mut issues).await.is_none());
        assert_eq!(
            issues.issues(),
            &[PipelineIssue::SourceUnavailable {
                source_name: "solana_rpc".into(),
                identifier: "getSlot".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_recent_block_time_reports_failed_block_list() {
        let rpc = StubCluster { blocks: None, ..cluster_with_blocks() };
        let mut issues = IssueLog::new();
        assert!(recent_block_time(&rpc, 10, &mut issues).await.is_none());
        assert_eq!(
            issues.issues(),
            &[PipelineIssue::SourceUnavailable {
                source_name: "solana_rpc".into(),
                identifier: "getBlocks".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_recent_block_time_without_times_is_insufficient() {
        let rpc = StubCluster { times: HashMap::new(), ..cluster_with_blocks() };
        let mut issues = IssueLog::new();
        let sample = recent_block_time(&rpc, 10, &mut issues).await.unwrap();
        assert_eq!(sample.samples, 0);
        assert_eq!(sample.average_secs, None);
        assert_eq!(issues.count("insufficient_data"), 1);
    }

    #[tokio::test]
    async fn test_validator_snapshot_reports_unavailable_rpc() {
        let mut issues = IssueLog::new();
        assert!(validator_snapshot(&StubCluster::default(), &mut issues).await.is_none());
        assert_eq!(issues.count("source_unavailable"), 1);
    }

    #[tokio::test]
    async fn test_stake_estimate_rejects_bad_address() {
        let rpc = StubCluster {
            accounts: Some(HashMap::new()),
            ..StubCluster::default()
        };
        let mut issues = IssueLog::new();
        let bad = "z".repeat(44);
        assert!(stake_estimate(&rpc, &bad, 0.07, 10, 0.0, &mut issues).await.is_none());
        assert_eq!(issues.count("malformed_input"), 1);
        assert_eq!(issues.count("source_unavailable"), 0);
    }

    #[tokio::test]
    async fn test_stake_estimate_reports_failed_lookup() {
        let mut issues = IssueLog::new();
        let est = stake_estimate(&StubCluster::default(), STAKER, 0.07, 10, 0.0, &mut issues).await;
        assert!(est.is_none());
        assert_eq!(
            issues.issues(),
            &[PipelineIssue::SourceUnavailable {
                source_name: "solana_rpc".into(),
                identifier: STAKER.into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_stake_estimate_for_missing_account_is_quiet() {
        let rpc = StubCluster {
            accounts: Some(HashMap::new()),
            ..StubCluster::default()
        };
        let mut issues = IssueLog::new();
        assert!(stake_estimate(&rpc, STAKER, 0.07, 10, 0.0, &mut issues).await.is_none());
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_stake_estimate_from_balance() {
        let rpc = StubCluster {
            accounts: Some([(STAKER.to_string(), 90_000_000_000)].into_iter().collect()),
            ..StubCluster::default()
        };
        let mut issues = IssueLog::new();
        let est = stake_estimate(&rpc, STAKER, 0.06, 30, 0.1, &mut issues).await.unwrap();
        assert!((est.staked_sol - 90.0).abs() < 1e-12);
        // 0.06 / 180 * 90 * 30
        assert!((est.estimated_rewards_sol - 0.9).abs() < 1e-9);
        assert!((est.real_yield_pct.unwrap() - 0.8 / 90.0 * 100.0).abs() < 1e-9);
        assert!(issues.is_empty());
    }
}
