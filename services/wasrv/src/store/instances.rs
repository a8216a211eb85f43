//! WhatsApp instance records
//!
//! An instance is a device session as owned by a tenant; `instance_id` is
//! the device id used by the lifecycle manager.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use utoipa::ToSchema;

use crate::error::Result;

pub const STATUS_CONNECTED: &str = "connected";
pub const STATUS_DISCONNECTED: &str = "disconnected";

#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct Instance {
    pub id: i64,
    pub user_id: i64,
    pub instance_id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn is_connected(&self) -> bool {
        self.status == STATUS_CONNECTED
    }
}

/// Connected instances of `user_id`, most recently updated first
pub async fn get_user_instances(pool: &SqlitePool, user_id: i64) -> Result<Vec<Instance>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, instance_id, name, status, created_at, updated_at
        FROM whats_app_instances
        WHERE user_id = ? AND status = ?
        ORDER BY updated_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .bind(STATUS_CONNECTED)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(hydrate_instance).collect()
}

/// Instance `instance_id` if `user_id` owns it, whatever its status
pub async fn find_user_instance(
    pool: &SqlitePool,
    user_id: i64,
    instance_id: &str,
) -> Result<Option<Instance>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, instance_id, name, status, created_at, updated_at
        FROM whats_app_instances
        WHERE instance_id = ? AND user_id = ?
        "#,
    )
    .bind(instance_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(hydrate_instance).transpose()
}

/// Returns whether a row of `user_id` was updated
pub async fn mark_instance_disconnected(
    pool: &SqlitePool,
    user_id: i64,
    instance_id: &str,
) -> Result<bool> {
    set_instance_status(pool, user_id, instance_id, STATUS_DISCONNECTED).await
}

pub async fn set_instance_status(
    pool: &SqlitePool,
    user_id: i64,
    instance_id: &str,
    status: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE whats_app_instances
        SET status = ?, updated_at = ?
        WHERE instance_id = ? AND user_id = ?
        "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(instance_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn create_instance(
    pool: &SqlitePool,
    user_id: i64,
    instance_id: &str,
    name: &str,
    status: &str,
) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO whats_app_instances (user_id, instance_id, name, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(instance_id)
    .bind(name)
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

fn hydrate_instance(row: SqliteRow) -> Result<Instance> {
    Ok(Instance {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        instance_id: row.try_get("instance_id")?,
        name: row.try_get("name")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
