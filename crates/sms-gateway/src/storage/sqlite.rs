//! SQLite-backed record store.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sms_code::{
    MessageRecord, NewRecord, RecordId, RecordQuery, RecordStore, SmsError, SmsResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "SELECT id, sender, contact_name, phone_area, body, sim_slot, \
     sim_sub_id, device_name, receive_time_ms, extracted_code, phone_number FROM sms_records";

/// Row as stored; `receive_time_ms` is UTC epoch milliseconds so range
/// filters and ordering compare numerically.
#[derive(Debug, sqlx::FromRow)]
struct SmsRow {
    id: i64,
    sender: String,
    contact_name: Option<String>,
    phone_area: Option<String>,
    body: String,
    sim_slot: Option<String>,
    sim_sub_id: Option<String>,
    device_name: Option<String>,
    receive_time_ms: i64,
    extracted_code: Option<String>,
    phone_number: Option<String>,
}

impl TryFrom<SmsRow> for MessageRecord {
    type Error = SmsError;

    fn try_from(row: SmsRow) -> Result<Self, Self::Error> {
        let receive_time = from_millis(row.receive_time_ms)?;
        Ok(MessageRecord {
            id: row.id,
            sender: row.sender,
            contact_name: row.contact_name,
            phone_area: row.phone_area,
            body: row.body,
            sim_slot_descriptor: row.sim_slot,
            sim_sub_id: row.sim_sub_id,
            device_name: row.device_name,
            receive_time,
            extracted_code: row.extracted_code,
            extracted_phone_number: row.phone_number,
        })
    }
}

fn from_millis(ms: i64) -> SmsResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| SmsError::Storage(format!("Invalid stored receive time: {}", ms)))
}

fn storage_error(e: sqlx::Error) -> SmsError {
    SmsError::Storage(e.to_string())
}

fn into_records(rows: Vec<SmsRow>) -> SmsResult<Vec<MessageRecord>> {
    rows.into_iter().map(MessageRecord::try_from).collect()
}

/// Record store persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        info!("Initializing SQLite pool: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sms_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                contact_name TEXT,
                phone_area TEXT,
                body TEXT NOT NULL,
                sim_slot TEXT,
                sim_sub_id TEXT,
                device_name TEXT,
                receive_time_ms INTEGER NOT NULL,
                extracted_code TEXT,
                phone_number TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sms_records_receive_time ON sms_records(receive_time_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sms_records_phone_number ON sms_records(phone_number)",
        )
        .execute(&self.pool)
        .await?;

        debug!("sms_records table ready");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: NewRecord) -> SmsResult<MessageRecord> {
        let message = &record.message;
        let result = sqlx::query(
            r#"
            INSERT INTO sms_records (sender, contact_name, phone_area, body, sim_slot,
                sim_sub_id, device_name, receive_time_ms, extracted_code, phone_number)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.sender)
        .bind(&message.contact_name)
        .bind(&message.phone_area)
        .bind(&message.body)
        .bind(&message.sim_slot_descriptor)
        .bind(&message.sim_sub_id)
        .bind(&message.device_name)
        .bind(message.receive_time.timestamp_millis())
        .bind(&record.extracted_code)
        .bind(&record.extracted_phone_number)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        let id = result.last_insert_rowid();
        // Reload so the returned receive time carries stored precision.
        self.get(id)
            .await?
            .ok_or_else(|| SmsError::Storage(format!("Inserted record {} not found", id)))
    }

    async fn query(&self, query: &RecordQuery) -> SmsResult<Vec<MessageRecord>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1=1");

        if let Some(after) = query.received_after {
            builder
                .push(" AND receive_time_ms >= ")
                .push_bind(after.timestamp_millis());
        }
        if let Some(before) = query.received_before {
            builder
                .push(" AND receive_time_ms <= ")
                .push_bind(before.timestamp_millis());
        }
        if let Some(phone) = &query.phone_number_eq {
            builder.push(" AND phone_number = ").push_bind(phone.clone());
        }
        // instr() is case-sensitive and treats the needle literally
        if let Some(needle) = &query.sim_slot_contains {
            builder
                .push(" AND instr(sim_slot, ")
                .push_bind(needle.clone())
                .push(") > 0");
        }
        if let Some(needle) = &query.body_contains {
            builder
                .push(" AND instr(body, ")
                .push_bind(needle.clone())
                .push(") > 0");
        }

        builder.push(" ORDER BY receive_time_ms DESC, id DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<SmsRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        into_records(rows)
    }

    async fn get(&self, id: RecordId) -> SmsResult<Option<MessageRecord>> {
        let row: Option<SmsRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(MessageRecord::try_from).transpose()
    }

    async fn list(&self, limit: usize, offset: usize) -> SmsResult<Vec<MessageRecord>> {
        let rows: Vec<SmsRow> = sqlx::query_as(&format!(
            "{} ORDER BY receive_time_ms DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_records(rows)
    }

    async fn delete(&self, id: RecordId) -> SmsResult<bool> {
        let result = sqlx::query("DELETE FROM sms_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> SmsResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sms_records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(count.max(0) as usize)
    }
}
