use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use gpuaudit_application::{AuditScan, AuditStore, Clock, ScanOrder};
use gpuaudit_core::{AppError, AppResult, NonEmptyString};
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord, UserIdHash};

use crate::clock::SystemClock;

/// Advisory lock key serializing appends so timestamps never decrease.
const APPEND_LOCK_KEY: i64 = 0x6770_7561_7564_6974;

const SELECT_COLUMNS: &str = r#"
    log_id,
    timestamp,
    event_type,
    user_id,
    model_name,
    status,
    duration_ms,
    inference_id,
    input_hash,
    output_hash,
    pii_redacted,
    payload
"#;

/// PostgreSQL-backed append-only audit store.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresAuditStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a store stamping records from the provided clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    log_id: Uuid,
    timestamp: DateTime<Utc>,
    event_type: String,
    user_id: Option<String>,
    model_name: String,
    status: String,
    duration_ms: i64,
    inference_id: Option<String>,
    input_hash: Option<String>,
    output_hash: Option<String>,
    pii_redacted: bool,
    payload: serde_json::Value,
}

impl TryFrom<AuditLogRow> for AuditRecord {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let stored = |error: AppError| {
            AppError::Internal(format!(
                "audit record '{}' has an invalid stored value: {error}",
                row.log_id
            ))
        };

        let mut record = NewAuditRecord::new(
            row.event_type.parse().map_err(stored)?,
            NonEmptyString::new("model_name", row.model_name).map_err(stored)?,
            row.status.parse().map_err(stored)?,
        );
        record.user_id = row
            .user_id
            .map(UserIdHash::try_from)
            .transpose()
            .map_err(stored)?;
        record.duration_ms = u64::try_from(row.duration_ms).map_err(|_| {
            stored(AppError::validation(
                "duration_ms",
                "duration must not be negative",
            ))
        })?;
        record.inference_id = row.inference_id;
        record.input_hash = row.input_hash;
        record.output_hash = row.output_hash;
        record.pii_redacted = row.pii_redacted;
        record.payload = row.payload;

        Ok(AuditRecord::seal(
            LogId::from_uuid(row.log_id),
            row.timestamp,
            record,
        ))
    }
}

fn unavailable(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |error| AppError::store_unavailable(operation, error.to_string())
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        record.validate()?;
        let duration_ms = i64::try_from(record.duration_ms)
            .map_err(|_| AppError::validation("duration_ms", "duration is out of range"))?;

        let mut transaction = self.pool.begin().await.map_err(unavailable("append"))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *transaction)
            .await
            .map_err(unavailable("append"))?;

        let now = self.clock.now();
        let inserted = loop {
            let candidate = LogId::new();
            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO audit_logs (
                    log_id,
                    timestamp,
                    event_type,
                    user_id,
                    model_name,
                    status,
                    duration_ms,
                    inference_id,
                    input_hash,
                    output_hash,
                    pii_redacted,
                    payload
                )
                VALUES (
                    $1,
                    GREATEST($2::TIMESTAMPTZ, (SELECT max(timestamp) FROM audit_logs)),
                    $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
                )
                ON CONFLICT (log_id) DO NOTHING
                RETURNING log_id
                "#,
            )
            .bind(candidate.as_uuid())
            .bind(now)
            .bind(record.event_type.as_str())
            .bind(record.user_id.as_ref().map(UserIdHash::as_str))
            .bind(record.model_name.as_str())
            .bind(record.status.as_str())
            .bind(duration_ms)
            .bind(record.inference_id.as_deref())
            .bind(record.input_hash.as_deref())
            .bind(record.output_hash.as_deref())
            .bind(record.pii_redacted)
            .bind(&record.payload)
            .fetch_optional(&mut *transaction)
            .await
            .map_err(unavailable("append"))?;

            if let Some(log_id) = inserted {
                break LogId::from_uuid(log_id);
            }
        };

        transaction.commit().await.map_err(unavailable("append"))?;

        Ok(inserted)
    }

    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord> {
        let row = sqlx::query_as::<_, AuditLogRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM audit_logs WHERE log_id = $1"
        ))
        .bind(log_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable("get_by_id"))?;

        row.map(AuditRecord::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("audit record '{log_id}' not found")))
    }

    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>> {
        let direction = match scan.order {
            ScanOrder::Ascending => "ASC",
            ScanOrder::Descending => "DESC",
        };
        let limit = scan
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = sqlx::query_as::<_, AuditLogRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM audit_logs
            WHERE ($1::TEXT IS NULL OR event_type = $1)
                AND ($2::TEXT IS NULL OR model_name = $2)
                AND ($3::TEXT IS NULL OR status = $3)
                AND ($4::BOOLEAN IS NULL OR pii_redacted = $4)
                AND ($5::TEXT IS NULL OR user_id = $5)
                AND ($6::TIMESTAMPTZ IS NULL OR timestamp >= $6)
                AND ($7::TIMESTAMPTZ IS NULL OR timestamp <= $7)
            ORDER BY timestamp {direction}, log_id {direction}
            LIMIT $8
            "#
        ))
        .bind(scan.filter.event_type.map(|event_type| event_type.as_str()))
        .bind(scan.filter.model_name.as_deref())
        .bind(scan.filter.status.map(|status| status.as_str()))
        .bind(scan.filter.pii_redacted)
        .bind(scan.filter.user_id.as_ref().map(UserIdHash::as_str))
        .bind(scan.time_range.from)
        .bind(scan.time_range.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("scan"))?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unavailable("ping"))?;
        Ok(())
    }
}
