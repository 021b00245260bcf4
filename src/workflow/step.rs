//! Step identifiers, step definitions and retry policies.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;
use crate::workflow::artifacts::ArtifactType;

/// Closed set of step identifiers known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    FetchIssue,
    Classify,
    Plan,
    Implement,
    Review,
    AddressReview,
    CodeQuality,
    ValidateAcceptance,
    FetchPatch,
    PatchPlan,
    PatchImplement,
}

impl StepId {
    pub const ALL: [StepId; 11] = [
        StepId::FetchIssue,
        StepId::Classify,
        StepId::Plan,
        StepId::Implement,
        StepId::Review,
        StepId::AddressReview,
        StepId::CodeQuality,
        StepId::ValidateAcceptance,
        StepId::FetchPatch,
        StepId::PatchPlan,
        StepId::PatchImplement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchIssue => "fetch_issue",
            Self::Classify => "classify",
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Review => "review",
            Self::AddressReview => "address_review",
            Self::CodeQuality => "code_quality",
            Self::ValidateAcceptance => "validate_acceptance",
            Self::FetchPatch => "fetch_patch",
            Self::PatchPlan => "patch_plan",
            Self::PatchImplement => "patch_implement",
        }
    }

    /// Steps whose work is writing code; these may use a separate provider.
    pub fn is_implementation(&self) -> bool {
        matches!(self, Self::Implement | Self::AddressReview | Self::PatchImplement)
    }

    /// Steps that read from the backing store instead of an AI agent.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::FetchIssue | Self::FetchPatch)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        StepId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| RegistryError::UnknownStep(s.to_string()))
    }
}

/// Policy for retrying recoverable step failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// No retries - fail immediately.
    #[default]
    None,

    /// Fixed delay between retries.
    Fixed { max_retries: u32, delay: Duration },

    /// Exponential backoff between retries.
    Exponential {
        max_retries: u32,
        /// Initial delay (doubles each attempt).
        initial_delay: Duration,
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Exponential backoff starting at 2 seconds, capped at 2 minutes.
    pub fn exponential(max_retries: u32) -> Self {
        if max_retries == 0 {
            return Self::None;
        }
        Self::Exponential {
            max_retries,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::Fixed { max_retries, delay }
    }

    /// Delay before retry number `retry` (1-indexed), or `None` once the
    /// policy is exhausted.
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { max_retries, delay } => (retry <= *max_retries).then_some(*delay),
            Self::Exponential {
                max_retries,
                initial_delay,
                max_delay,
            } => {
                if retry > *max_retries {
                    return None;
                }
                let multiplier = 2u32.saturating_pow(retry.saturating_sub(1));
                Some(initial_delay.saturating_mul(multiplier).min(*max_delay))
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_retries, .. } | Self::Exponential { max_retries, .. } => *max_retries,
        }
    }
}

/// Static declaration of one pipeline step.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub description: String,
    pub requires: BTreeSet<ArtifactType>,
    pub produces: BTreeSet<ArtifactType>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Critical steps abort the run on failure; best-effort steps are logged and skipped.
    pub critical: bool,
}

impl StepDefinition {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            description: String::new(),
            requires: BTreeSet::new(),
            produces: BTreeSet::new(),
            retry: RetryPolicy::None,
            timeout: Duration::from_secs(1800),
            critical: true,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn requires(mut self, types: impl IntoIterator<Item = ArtifactType>) -> Self {
        self.requires.extend(types);
        self
    }

    pub fn produces(mut self, types: impl IntoIterator<Item = ArtifactType>) -> Self {
        self.produces.extend(types);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Build a definition from type names, as read from configuration or a
    /// plugin registration call.
    pub fn from_names(id: StepId, requires: &[&str], produces: &[&str]) -> Result<Self, RegistryError> {
        let parse = |name: &&str| {
            name.parse::<ArtifactType>()
                .map_err(|_| RegistryError::UnknownArtifactType {
                    step: id.to_string(),
                    artifact: name.to_string(),
                })
        };
        let requires = requires.iter().map(parse).collect::<Result<Vec<_>, _>>()?;
        let produces = produces.iter().map(parse).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(id).requires(requires).produces(produces))
    }
}
