use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{ClaimedItem, ItemStatus, QueueItem, WorkQueue, WorkerId};
use crate::errors::ClaimError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'started', 'completed', 'failed', 'patch pending', 'patched')),
        assigned_to TEXT,
        parent_id INTEGER REFERENCES issues(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_assigned_to ON issues(assigned_to);
";

/// SQLite-backed work queue.
///
/// Each operation opens its own connection on tokio's blocking pool, so
/// separate `SqliteQueue` values (or separate processes) on one file contend
/// through SQLite's locking exactly like independent workers would.
/// Claims take the write lock up front with `BEGIN IMMEDIATE`, which makes
/// select-then-update a single atomic step.
#[derive(Clone)]
pub struct SqliteQueue {
    path: Arc<PathBuf>,
}

impl SqliteQueue {
    /// Open (or create) the queue database and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self, ClaimError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClaimError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let queue = Self {
            path: Arc::new(path.to_path_buf()),
        };
        queue
            .call(|conn| {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
                conn.execute_batch(SCHEMA)?;
                // Databases created before patch rows were linked to their issue.
                let linked = conn
                    .prepare("SELECT 1 FROM pragma_table_info('issues') WHERE name = 'parent_id'")?
                    .exists([])?;
                if !linked {
                    conn.execute_batch("ALTER TABLE issues ADD COLUMN parent_id INTEGER REFERENCES issues(id)")?;
                }
                Ok(())
            })
            .await?;
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure with a fresh connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R, ClaimError>
    where
        F: FnOnce(&mut Connection) -> Result<R, ClaimError> + Send + 'static,
        R: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(path.as_path())?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ClaimError::Unavailable(format!("queue task panicked: {}", e)))?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, ClaimError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ClaimError::InvalidRow(format!("bad timestamp '{}': {}", raw, e)))
}

struct IssueRow {
    id: i64,
    description: String,
    status: String,
    assigned_to: Option<String>,
    parent_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl IssueRow {
    const COLUMNS: &'static str = "id, description, status, assigned_to, parent_id, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            status: row.get(2)?,
            assigned_to: row.get(3)?,
            parent_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_item(self) -> Result<QueueItem, ClaimError> {
        let assigned_to = self
            .assigned_to
            .map(|w| w.parse::<WorkerId>().map_err(ClaimError::InvalidRow))
            .transpose()?;
        Ok(QueueItem {
            item_id: self.id,
            description: self.description,
            status: self.status.parse()?,
            assigned_to,
            parent_id: self.parent_id,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl WorkQueue for SqliteQueue {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ClaimedItem>, ClaimError> {
        let worker = worker.as_str().to_string();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let candidate = tx
                .query_row(
                    "SELECT id, description, status FROM issues
                     WHERE status IN ('pending', 'patch pending') AND assigned_to = ?1
                     ORDER BY id
                     LIMIT 1",
                    params![worker],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                )
                .optional()?;

            let Some((item_id, description, prior)) = candidate else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE issues SET status = 'started', updated_at = ?1 WHERE id = ?2",
                params![now(), item_id],
            )?;
            tx.commit()?;

            Ok(Some(ClaimedItem {
                item_id,
                description,
                prior_status: prior.parse()?,
            }))
        })
        .await
    }

    async fn update_status(&self, item_id: i64, status: ItemStatus) -> Result<(), ClaimError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE issues SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now(), item_id],
            )?;
            if changed == 0 {
                return Err(ClaimError::ItemNotFound(item_id));
            }
            Ok(())
        })
        .await
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<QueueItem>, ClaimError> {
        self.call(move |conn| {
            let sql = format!("SELECT {} FROM issues WHERE id = ?1", IssueRow::COLUMNS);
            conn.query_row(&sql, params![item_id], IssueRow::from_row)
                .optional()?
                .map(IssueRow::into_item)
                .transpose()
        })
        .await
    }

    async fn enqueue(
        &self,
        description: &str,
        assigned_to: Option<&WorkerId>,
        status: ItemStatus,
    ) -> Result<QueueItem, ClaimError> {
        let description = description.to_string();
        let assigned_to = assigned_to.map(|w| w.as_str().to_string());
        self.call(move |conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO issues (description, status, assigned_to, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![description, status.as_str(), assigned_to, ts],
            )?;
            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {} FROM issues WHERE id = ?1", IssueRow::COLUMNS);
            conn.query_row(&sql, params![id], IssueRow::from_row)?.into_item()
        })
        .await
    }

    async fn enqueue_patch(
        &self,
        parent_id: i64,
        description: &str,
        assigned_to: Option<&WorkerId>,
    ) -> Result<QueueItem, ClaimError> {
        let description = description.to_string();
        let assigned_to = assigned_to.map(|w| w.as_str().to_string());
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let parent_of_parent: Option<Option<i64>> = tx
                .query_row("SELECT parent_id FROM issues WHERE id = ?1", params![parent_id], |row| row.get(0))
                .optional()?;
            match parent_of_parent {
                None => return Err(ClaimError::ItemNotFound(parent_id)),
                Some(Some(_)) => {
                    return Err(ClaimError::InvalidRow(format!(
                        "issue {} is itself a patch request",
                        parent_id
                    )));
                }
                Some(None) => {}
            }

            let ts = now();
            tx.execute(
                "INSERT INTO issues (description, status, assigned_to, parent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![description, ItemStatus::PatchPending.as_str(), assigned_to, parent_id, ts],
            )?;
            let id = tx.last_insert_rowid();
            let sql = format!("SELECT {} FROM issues WHERE id = ?1", IssueRow::COLUMNS);
            let item = tx.query_row(&sql, params![id], IssueRow::from_row)?.into_item()?;
            tx.commit()?;
            Ok(item)
        })
        .await
    }

    async fn list_items(&self, limit: usize) -> Result<Vec<QueueItem>, ClaimError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.call(move |conn| {
            let sql = format!("SELECT {} FROM issues ORDER BY id DESC LIMIT ?1", IssueRow::COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], IssueRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(IssueRow::into_item).collect()
        })
        .await
    }
}
