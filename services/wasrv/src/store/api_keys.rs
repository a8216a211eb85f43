//! API key and user lookups

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{Result, WaSrvError};

/// Keys are looked up by this many leading characters
pub const KEY_PREFIX_LEN: usize = 8;

/// Accepted key prefixes
pub const KEY_SCHEMES: &[&str] = &["wapi_", "wa_"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// bcrypt hash of the full key
    pub key_hash: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// A limit of zero or none means unlimited
    pub fn is_over_limit(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if limit > 0 && self.usage_count >= limit)
    }
}

pub fn has_valid_scheme(key: &str) -> bool {
    KEY_SCHEMES.iter().any(|scheme| key.starts_with(scheme))
}

pub fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX_LEN).collect()
}

/// Hashes issued by PHP carry the `$2y$` tag; same algorithm as `$2b$`
pub fn normalize_hash(hash: &str) -> String {
    match hash.strip_prefix("$2y$") {
        Some(rest) => format!("$2b${}", rest),
        None => hash.to_string(),
    }
}

/// Verify `key` against a stored bcrypt hash off the async runtime
pub async fn verify_key(key: &str, hash: &str) -> Result<bool> {
    let key = key.to_string();
    let hash = normalize_hash(hash);
    tokio::task::spawn_blocking(move || bcrypt::verify(key, &hash))
        .await
        .map_err(|e| WaSrvError::internal(format!("bcrypt task: {}", e)))?
        .or(Ok(false))
}

/// Random key in the `wapi_` scheme
pub fn generate_key() -> String {
    format!("wapi_{}", uuid::Uuid::new_v4().simple())
}

pub async fn find_active_key_by_prefix(
    pool: &SqlitePool,
    prefix: &str,
) -> Result<Option<ApiKeyRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, name, key, key_prefix, is_active, expires_at,
               usage_limit, usage_count, last_used_at
        FROM api_keys
        WHERE key_prefix = ? AND is_active = 1
        ORDER BY id ASC
        LIMIT 1
        "#,
    )
    .bind(prefix)
    .fetch_optional(pool)
    .await?;

    row.map(hydrate_api_key).transpose()
}

pub async fn find_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })),
        None => Ok(None),
    }
}

/// Count one authenticated request against the key
pub async fn record_key_usage(pool: &SqlitePool, key_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE api_keys
        SET usage_count = usage_count + 1, last_used_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(key_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_user(pool: &SqlitePool, name: &str, email: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Options for a newly issued key
#[derive(Debug, Clone, Default)]
pub struct NewApiKey {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    /// bcrypt cost; `bcrypt::DEFAULT_COST` when unset
    pub cost: Option<u32>,
}

/// Store the hash of `key` for `user_id`; returns the row id
pub async fn insert_api_key(
    pool: &SqlitePool,
    user_id: i64,
    key: &str,
    options: &NewApiKey,
) -> Result<i64> {
    let plain = key.to_string();
    let cost = options.cost.unwrap_or(bcrypt::DEFAULT_COST);
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await
        .map_err(|e| WaSrvError::internal(format!("bcrypt task: {}", e)))?
        .map_err(|e| WaSrvError::internal(format!("bcrypt hash: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO api_keys (user_id, name, key, key_prefix, is_active, expires_at, usage_limit)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(&options.name)
    .bind(&hash)
    .bind(key_prefix(key))
    .bind(options.expires_at)
    .bind(options.usage_limit)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

fn hydrate_api_key(row: SqliteRow) -> Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        key_hash: row.try_get("key")?,
        key_prefix: row.try_get("key_prefix")?,
        is_active: row.try_get("is_active")?,
        expires_at: row.try_get("expires_at")?,
        usage_limit: row.try_get("usage_limit")?,
        usage_count: row.try_get("usage_count")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}
