//! Pipeline issue taxonomy.
//!
//! None of these abort a run. Each stage records what it had to skip in an
//! `IssueLog` and carries on with an absent value in its place.

use std::collections::HashSet;
use thiserror::Error;

use crate::logging::{log_issue, Level};

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineIssue {
    /// Fetch failed after every retry; the series is treated as absent.
    #[error("source {source_name} unavailable for {identifier}")]
    SourceUnavailable {
        source_name: String,
        identifier: String,
    },

    /// Fewer points than a window or threshold requires.
    #[error("insufficient data for {what}: need {needed}, got {got}")]
    InsufficientData {
        what: String,
        needed: usize,
        got: usize,
    },

    /// Identifier has no mapping to a source-specific token.
    #[error("malformed input {identifier}: {reason}")]
    MalformedInput { identifier: String, reason: String },

    #[error("zero denominator in {what}")]
    ZeroDivision { what: String },

    /// Every source came back empty.
    #[error("no data from any source")]
    NoData,
}

impl PipelineIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineIssue::SourceUnavailable { .. } => "source_unavailable",
            PipelineIssue::InsufficientData { .. } => "insufficient_data",
            PipelineIssue::MalformedInput { .. } => "malformed_input",
            PipelineIssue::ZeroDivision { .. } => "zero_division",
            PipelineIssue::NoData => "no_data",
        }
    }

    fn level(&self) -> Level {
        match self {
            PipelineIssue::NoData | PipelineIssue::SourceUnavailable { .. } => Level::Error,
            PipelineIssue::MalformedInput { .. } => Level::Warn,
            _ => Level::Info,
        }
    }
}

/// Issues raised during one run, each reported once.
#[derive(Debug, Default)]
pub struct IssueLog {
    seen: HashSet<PipelineIssue>,
    ordered: Vec<PipelineIssue>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `issue`; returns false if the same issue was already reported.
    pub fn report(&mut self, issue: PipelineIssue) -> bool {
        if !self.seen.insert(issue.clone()) {
            return false;
        }
        log_issue(issue.level(), issue.kind(), &issue.to_string());
        self.ordered.push(issue);
        true
    }

    pub fn issues(&self) -> &[PipelineIssue] {
        &self.ordered
    }

    pub fn count(&self, kind: &str) -> usize {
        self.ordered.iter().filter(|i| i.kind() == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
