use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use super::{ClaimedItem, ItemStatus, QueueItem, WorkQueue, WorkerId};
use crate::errors::ClaimError;

const MIGRATION: &str = include_str!("../../migrations/postgres/0001_issues.sql");

const ITEM_COLUMNS: &str =
    "id, description, status, assigned_to::TEXT AS assigned_to, parent_id, created_at, updated_at";

/// PostgreSQL-backed work queue. Claims go through the
/// `claim_next_pending` function, which uses `FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    /// Connect and apply the (idempotent) schema.
    pub async fn connect(url: &str) -> Result<Self, ClaimError> {
        let pool = PgPoolOptions::new().max_connections(4).connect(url).await?;
        let queue = Self { pool };
        queue.migrate().await?;
        Ok(queue)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), ClaimError> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn item_from_row(row: &PgRow) -> Result<QueueItem, ClaimError> {
    let status: String = row.try_get("status")?;
    let assigned_to: Option<String> = row.try_get("assigned_to")?;
    Ok(QueueItem {
        item_id: row.try_get("id")?,
        description: row.try_get("description")?,
        status: status.parse()?,
        assigned_to: assigned_to
            .map(|w| w.parse::<WorkerId>().map_err(ClaimError::InvalidRow))
            .transpose()?,
        parent_id: row.try_get("parent_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl WorkQueue for PgQueue {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ClaimedItem>, ClaimError> {
        let row = sqlx::query(
            "SELECT issue_id, issue_description, prior_status
             FROM claim_next_pending($1::worker_id)",
        )
        .bind(worker.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let prior: String = row.try_get("prior_status")?;
        Ok(Some(ClaimedItem {
            item_id: row.try_get("issue_id")?,
            description: row.try_get("issue_description")?,
            prior_status: prior.parse()?,
        }))
    }

    async fn update_status(&self, item_id: i64, status: ItemStatus) -> Result<(), ClaimError> {
        let result = sqlx::query("UPDATE issues SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ClaimError::ItemNotFound(item_id));
        }
        Ok(())
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<QueueItem>, ClaimError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM issues WHERE id = $1");
        sqlx::query(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(item_from_row)
            .transpose()
    }

    async fn enqueue(
        &self,
        description: &str,
        assigned_to: Option<&WorkerId>,
        status: ItemStatus,
    ) -> Result<QueueItem, ClaimError> {
        let sql = format!(
            "INSERT INTO issues (description, status, assigned_to)
             VALUES ($1, $2, $3::worker_id)
             RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(description)
            .bind(status.as_str())
            .bind(assigned_to.map(WorkerId::as_str))
            .fetch_one(&self.pool)
            .await?;
        item_from_row(&row)
    }

    async fn enqueue_patch(
        &self,
        parent_id: i64,
        description: &str,
        assigned_to: Option<&WorkerId>,
    ) -> Result<QueueItem, ClaimError> {
        let parent: Option<Option<i64>> = sqlx::query_scalar("SELECT parent_id FROM issues WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?;
        match parent {
            None => return Err(ClaimError::ItemNotFound(parent_id)),
            Some(Some(_)) => {
                return Err(ClaimError::InvalidRow(format!(
                    "issue {} is itself a patch request",
                    parent_id
                )));
            }
            Some(None) => {}
        }

        let sql = format!(
            "INSERT INTO issues (description, status, assigned_to, parent_id)
             VALUES ($1, $2, $3::worker_id, $4)
             RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(description)
            .bind(ItemStatus::PatchPending.as_str())
            .bind(assigned_to.map(WorkerId::as_str))
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await?;
        item_from_row(&row)
    }

    async fn list_items(&self, limit: usize) -> Result<Vec<QueueItem>, ClaimError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM issues ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }
}
