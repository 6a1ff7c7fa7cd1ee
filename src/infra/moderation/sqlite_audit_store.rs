// SQLite-backed audit store for terminal moderation decisions.
//
// Tables:
// - audit_log: append-only rows (text, label, user_id)

use crate::core::moderation::{AuditRecord, AuditStore, ModerationError, SpamLabel};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

impl SqliteAuditStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                label TEXT NOT NULL,
                user_id INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Audit(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (text, label, user_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&record.text)
        .bind(record.label.as_str())
        .bind(record.user_id.map(|id| id as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Audit(e.to_string()))?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT text, label, user_id
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::Audit(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let label_str: String = row.get("label");
            let Some(label) = SpamLabel::parse(&label_str) else {
                tracing::warn!(label = %label_str, "skipping audit row with unknown label");
                continue;
            };
            records.push(AuditRecord {
                text: row.get("text"),
                label,
                user_id: row.get::<Option<i64>, _>("user_id").map(|id| id as u64),
            });
        }
        Ok(records)
    }
}
