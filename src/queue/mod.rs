//! Work queue: the shared backlog of issues and the atomic claim protocol.
//!
//! Two backends implement [`WorkQueue`]:
//! - [`SqliteQueue`] for local use and tests (single-writer lock via `BEGIN IMMEDIATE`)
//! - [`PgQueue`] for multi-host deployments (`FOR UPDATE SKIP LOCKED`)

pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ClaimError;
use crate::rouge_config::{DatabaseBackend, RougeConfig};

pub use postgres::PgQueue;
pub use sqlite::SqliteQueue;

const WORKER_HOSTS: &[&str] = &["alleycat", "hailmary", "local", "tydirium", "executor", "xwing"];
const WORKER_SLOTS: u32 = 3;

/// A worker identity from the enumerated domain `<host>-<1..3>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(String);

impl WorkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every valid worker id, in domain order.
    pub fn all() -> Vec<WorkerId> {
        WORKER_HOSTS
            .iter()
            .flat_map(|host| (1..=WORKER_SLOTS).map(move |n| WorkerId(format!("{host}-{n}"))))
            .collect()
    }
}

impl FromStr for WorkerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = s.rsplit_once('-').is_some_and(|(host, slot)| {
            WORKER_HOSTS.contains(&host)
                && slot.parse::<u32>().is_ok_and(|n| (1..=WORKER_SLOTS).contains(&n))
                && !slot.starts_with('0')
        });
        if valid {
            Ok(WorkerId(s.to_string()))
        } else if s.is_empty() {
            Err("worker id cannot be empty".to_string())
        } else {
            Err(format!(
                "invalid worker id '{}': expected <host>-<1..{}> with host one of {}",
                s,
                WORKER_SLOTS,
                WORKER_HOSTS.join(", ")
            ))
        }
    }
}

impl TryFrom<String> for WorkerId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "patch pending")]
    PatchPending,
    #[serde(rename = "patched")]
    Patched,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 6] = [
        ItemStatus::Pending,
        ItemStatus::Started,
        ItemStatus::Completed,
        ItemStatus::Failed,
        ItemStatus::PatchPending,
        ItemStatus::Patched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PatchPending => "patch pending",
            Self::Patched => "patched",
        }
    }

    /// Statuses an item may be claimed from.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::PatchPending)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        ItemStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| ClaimError::InvalidRow(format!("unknown item status '{}'", s)))
    }
}

/// One backlog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: i64,
    pub description: String,
    pub status: ItemStatus,
    pub assigned_to: Option<WorkerId>,
    /// Set on patch requests: the issue the patch applies to.
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a successful claim. `prior_status` tells a fresh issue from a patch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedItem {
    pub item_id: i64,
    pub description: String,
    pub prior_status: ItemStatus,
}

impl ClaimedItem {
    pub fn is_patch(&self) -> bool {
        self.prior_status == ItemStatus::PatchPending
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Atomically claim the oldest claimable item assigned to `worker`,
    /// flipping it to `started`. Never blocks on rows held by other claimers.
    async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ClaimedItem>, ClaimError>;

    /// Set an item's status. Fails with `ItemNotFound` for unknown ids.
    async fn update_status(&self, item_id: i64, status: ItemStatus) -> Result<(), ClaimError>;

    async fn get_item(&self, item_id: i64) -> Result<Option<QueueItem>, ClaimError>;

    async fn enqueue(
        &self,
        description: &str,
        assigned_to: Option<&WorkerId>,
        status: ItemStatus,
    ) -> Result<QueueItem, ClaimError>;

    /// Add a `patch pending` request against an existing, non-patch issue.
    /// Fails with `ItemNotFound` when the parent does not exist.
    async fn enqueue_patch(
        &self,
        parent_id: i64,
        description: &str,
        assigned_to: Option<&WorkerId>,
    ) -> Result<QueueItem, ClaimError>;

    /// Most recent items first.
    async fn list_items(&self, limit: usize) -> Result<Vec<QueueItem>, ClaimError>;
}

/// Open the configured backend.
pub async fn open_queue(config: &RougeConfig) -> Result<Arc<dyn WorkQueue>, ClaimError> {
    match config.database_backend() {
        DatabaseBackend::Sqlite(path) => {
            let queue = SqliteQueue::open(&path).await?;
            Ok(Arc::new(queue))
        }
        DatabaseBackend::Postgres(url) => {
            let queue = PgQueue::connect(&url).await?;
            Ok(Arc::new(queue))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_domain() {
        assert!("alleycat-1".parse::<WorkerId>().is_ok());
        assert!("xwing-3".parse::<WorkerId>().is_ok());
        assert!("local-4".parse::<WorkerId>().is_err());
        assert!("local-0".parse::<WorkerId>().is_err());
        assert!("local-01".parse::<WorkerId>().is_err());
        assert!("falcon-1".parse::<WorkerId>().is_err());
        assert!("".parse::<WorkerId>().unwrap_err().contains("empty"));
        assert_eq!(WorkerId::all().len(), 18);
    }

    #[test]
    fn test_worker_id_serde() {
        let id: WorkerId = serde_json::from_str("\"hailmary-2\"").unwrap();
        assert_eq!(id.as_str(), "hailmary-2");
        assert!(serde_json::from_str::<WorkerId>("\"nobody-1\"").is_err());
    }

    #[test]
    fn test_item_status_parsing() {
        assert_eq!("patch pending".parse::<ItemStatus>().unwrap(), ItemStatus::PatchPending);
        assert_eq!("patch_pending".parse::<ItemStatus>().unwrap(), ItemStatus::PatchPending);
        assert_eq!("Completed".parse::<ItemStatus>().unwrap(), ItemStatus::Completed);
        assert!("archived".parse::<ItemStatus>().is_err());
        assert!(ItemStatus::PatchPending.is_claimable());
        assert!(!ItemStatus::Started.is_claimable());
    }

    #[test]
    fn test_item_status_serializes_with_space() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::PatchPending).unwrap(),
            "\"patch pending\""
        );
    }
}
