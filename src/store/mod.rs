// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The analytic store: schema, migration, and all typed read/write
//! operations over the DuckDB-backed `logs`/`ingest_state` tables.
//!
//! Grounded on `LevyDeSales-treeline`'s `LoggingService`: one fresh
//! [`duckdb::Connection`] per operation, guarded by a per-operation
//! exclusive filesystem lock (`fs2`) so that external tools can query the
//! file concurrently with this process. Every state-changing operation
//! runs inside a single transaction.

mod fingerprint;
mod schema;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{Connection, ToSql};
use fs2::FileExt;
use tracing::{debug, info};

use crate::error::ChimeraError;
use crate::model::{
    DiscoverDimension, DiscoverRow, IngestState, LogEntry, Order, QueryFilters, RawRecord,
    DEFAULT_DISCOVER_LIMIT, DEFAULT_QUERY_LIMIT, MAX_DISCOVER_LIMIT, MAX_QUERY_LIMIT,
};

pub use fingerprint::{canonicalize, derive_id, fingerprint_hash};

/// A handle to the analytic store file. Cheap to clone/share: it holds
/// only the path, not an open connection (see module docs).
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Opens (creating if absent) the store at `db_path` and runs schema
    /// creation/migration. Schema/migration failures are
    /// [`ChimeraError::StartupFatal`]: the caller must abort startup.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, ChimeraError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChimeraError::StartupFatal(format!(
                    "cannot create store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let store = Self { db_path };
        store
            .with_connection_write(|conn| Ok(schema::ensure_schema(conn)?))
            .map_err(|e| ChimeraError::StartupFatal(e.to_string()))?;

        info!(path = %store.db_path.display(), "analytic store ready");
        Ok(store)
    }

    fn acquire_lock(&self) -> Result<File, ChimeraError> {
        let lock_path = self.db_path.with_extension("duckdb.lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                ChimeraError::Storage(format!(
                    "failed to open lock file {}: {e}",
                    lock_path.display()
                ))
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|e| ChimeraError::Storage(format!("failed to acquire store lock: {e}")))?;
        Ok(lock_file)
    }

    fn open_connection(&self) -> Result<Connection, ChimeraError> {
        Connection::open(&self.db_path)
            .map_err(|e| ChimeraError::Storage(format!("cannot open store: {e}")))
    }

    /// Runs a read-only operation with its own connection and lock.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, ChimeraError>,
    ) -> Result<T, ChimeraError> {
        let _lock = self.acquire_lock()?;
        let conn = self.open_connection()?;
        f(&conn)
    }

    /// Runs a write operation inside a single transaction.
    fn with_connection_write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, ChimeraError>,
    ) -> Result<T, ChimeraError> {
        let _lock = self.acquire_lock()?;
        let mut conn = self.open_connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| ChimeraError::Storage(e.to_string()))?;
        let result = f(&tx)?;
        tx.commit().map_err(|e| ChimeraError::Storage(e.to_string()))?;
        Ok(result)
    }

    /// Inserts up to `batch.len()` normalized records, skipping any row
    /// whose `id` or `cursor` already exists. Returns the number of rows
    /// actually added (spec.md §4.A `insert_logs`).
    pub fn insert_logs(&self, batch: &[LogEntry]) -> Result<u64, ChimeraError> {
        self.with_connection_write(|conn| {
            let mut inserted = 0u64;
            for row in batch {
                let n = conn.execute(
                    "INSERT INTO logs \
                     (id, ts, hostname, unit, source, severity, message, cursor, fingerprint) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT DO NOTHING",
                    duckdb::params![
                        row.id,
                        row.ts.naive_utc(),
                        row.hostname,
                        row.unit,
                        row.source,
                        row.severity,
                        row.message,
                        row.cursor,
                        row.fingerprint,
                    ],
                )?;
                inserted += n as u64;
            }
            Ok(inserted)
        })
    }

    /// Inserts a batch and advances the named source's cursor in the same
    /// transaction. `cursor` is only written when `Some` (records without
    /// a cursor do not advance `ingest_state`, per spec.md §4.C).
    pub fn insert_logs_and_advance_cursor(
        &self,
        batch: &[LogEntry],
        source_name: &str,
        cursor: Option<&str>,
    ) -> Result<u64, ChimeraError> {
        self.with_connection_write(|conn| {
            let mut inserted = 0u64;
            for row in batch {
                let n = conn.execute(
                    "INSERT INTO logs \
                     (id, ts, hostname, unit, source, severity, message, cursor, fingerprint) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT DO NOTHING",
                    duckdb::params![
                        row.id,
                        row.ts.naive_utc(),
                        row.hostname,
                        row.unit,
                        row.source,
                        row.severity,
                        row.message,
                        row.cursor,
                        row.fingerprint,
                    ],
                )?;
                inserted += n as u64;
            }

            if let Some(cursor) = cursor {
                upsert_cursor(conn, source_name, cursor)?;
            }

            Ok(inserted)
        })
    }

    /// Reads the persisted cursor for `source_name`, or `None` if the
    /// source has never ingested.
    pub fn get_cursor(&self, source_name: &str) -> Result<Option<String>, ChimeraError> {
        self.with_connection(|conn| {
            match conn.query_row(
                "SELECT cursor FROM ingest_state WHERE source_name = ?",
                [source_name],
                |row| row.get::<_, Option<String>>(0),
            ) {
                Ok(cursor) => Ok(cursor),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Upserts the cursor for `source_name`, setting `updated_at = now()`.
    pub fn set_cursor(&self, source_name: &str, cursor: &str) -> Result<(), ChimeraError> {
        self.with_connection_write(|conn| upsert_cursor(conn, source_name, cursor))
    }

    /// Reads the full `ingest_state` row for `source_name`, or `None` if
    /// the source has never ingested.
    pub fn ingest_state(&self, source_name: &str) -> Result<Option<IngestState>, ChimeraError> {
        self.with_connection(|conn| {
            match conn.query_row(
                "SELECT source_name, cursor, updated_at FROM ingest_state WHERE source_name = ?",
                [source_name],
                |row| {
                    Ok(IngestState {
                        source_name: row.get::<_, String>(0)?,
                        cursor: row.get::<_, Option<String>>(1)?,
                        updated_at: DateTime::<Utc>::from_naive_utc_and_offset(
                            row.get::<_, NaiveDateTime>(2)?,
                            Utc,
                        ),
                    })
                },
            ) {
                Ok(state) => Ok(Some(state)),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Total row count in `logs`.
    pub fn count_logs(&self) -> Result<u64, ChimeraError> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Runs `QUERY_LOGS`: all filters combine with logical AND.
    pub fn query_logs(&self, filters: &QueryFilters) -> Result<Vec<LogEntry>, ChimeraError> {
        self.with_connection(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(since_seconds) = filters.since_seconds {
                let cutoff = Utc::now() - chrono::Duration::seconds(since_seconds);
                clauses.push("ts >= ?".to_string());
                params.push(Box::new(cutoff.naive_utc()));
            }
            if let Some(min_severity) = &filters.min_severity {
                if let Some(rank) = min_severity.rank() {
                    clauses.push(format!("{SEVERITY_RANK_CASE} <= ?"));
                    params.push(Box::new(rank as i64));
                } else {
                    // An unranked `min_severity` argument matches nothing,
                    // per the spec's documented behavior.
                    clauses.push("1 = 0".to_string());
                }
            }
            if let Some(source) = &filters.source {
                clauses.push("source = ?".to_string());
                params.push(Box::new(source.clone()));
            }
            if let Some(unit) = &filters.unit {
                clauses.push("unit = ?".to_string());
                params.push(Box::new(unit.clone()));
            }
            if let Some(hostname) = &filters.hostname {
                clauses.push("hostname = ?".to_string());
                params.push(Box::new(hostname.clone()));
            }
            if let Some(contains) = &filters.contains {
                clauses.push("LOWER(message) LIKE ? ESCAPE '\\'".to_string());
                params.push(Box::new(like_pattern(contains)));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let order_sql = match filters.order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };

            let limit = filters
                .limit
                .unwrap_or(DEFAULT_QUERY_LIMIT)
                .clamp(1, MAX_QUERY_LIMIT);

            let sql = format!(
                "SELECT id, ts, hostname, unit, source, severity, message, cursor, fingerprint \
                 FROM logs {where_sql} ORDER BY ts {order_sql} LIMIT {limit}"
            );

            debug!(sql = %sql, "query_logs");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(duckdb::params_from_iter(params.iter()), map_log_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Runs `DISCOVER`: distinct values of `dimension` paired with their
    /// counts, ordered by count descending.
    pub fn discover(
        &self,
        dimension: DiscoverDimension,
        since_seconds: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<DiscoverRow>, ChimeraError> {
        self.with_connection(|conn| {
            let column = dimension.column();
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(since_seconds) = since_seconds {
                let cutoff = Utc::now() - chrono::Duration::seconds(since_seconds);
                clauses.push("ts >= ?".to_string());
                params.push(Box::new(cutoff.naive_utc()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let limit = limit
                .unwrap_or(DEFAULT_DISCOVER_LIMIT)
                .clamp(1, MAX_DISCOVER_LIMIT);

            let sql = format!(
                "SELECT {column} AS value, COUNT(*) AS count FROM logs {where_sql} \
                 GROUP BY {column} ORDER BY count DESC LIMIT {limit}"
            );

            debug!(sql = %sql, "discover");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(duckdb::params_from_iter(params.iter()), |row| {
                    Ok(DiscoverRow {
                        value: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Builds a fingerprinted, id-assigned [`LogEntry`] from a normalized
    /// journal record. Returns `None` if the record's `ts` could not be
    /// parsed upstream — callers must drop such records rather than
    /// calling this (spec.md §4.C: never assign `now()` to an unparseable
    /// timestamp).
    pub fn entry_from_raw(record: &RawRecord) -> Option<LogEntry> {
        let ts = record.ts?;
        let severity = record.severity.as_str().to_string();
        let canonical = canonicalize(
            ts,
            &record.hostname,
            &record.unit,
            &record.source,
            &severity,
            &record.message,
        );
        let fingerprint = fingerprint_hash(&canonical);
        let id = derive_id(&fingerprint);
        Some(LogEntry {
            id,
            ts,
            hostname: record.hostname.clone(),
            unit: record.unit.clone(),
            source: record.source.clone(),
            severity,
            message: record.message.clone(),
            cursor: record.cursor.clone(),
            fingerprint,
        })
    }
}

/// A `CASE` expression mapping the eight known severity names to their
/// rank; anything else evaluates to `NULL`, which never satisfies `<= ?`.
const SEVERITY_RANK_CASE: &str = "CASE severity \
     WHEN 'emerg' THEN 0 WHEN 'alert' THEN 1 WHEN 'crit' THEN 2 WHEN 'err' THEN 3 \
     WHEN 'warning' THEN 4 WHEN 'notice' THEN 5 WHEN 'info' THEN 6 WHEN 'debug' THEN 7 \
     ELSE NULL END";

fn upsert_cursor(conn: &Connection, source_name: &str, cursor: &str) -> Result<(), ChimeraError> {
    conn.execute(
        "INSERT INTO ingest_state (source_name, cursor, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT (source_name) DO UPDATE SET cursor = excluded.cursor, \
         updated_at = excluded.updated_at",
        duckdb::params![source_name, cursor, Utc::now().naive_utc()],
    )?;
    Ok(())
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_ascii_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn map_log_entry(row: &duckdb::Row<'_>) -> duckdb::Result<LogEntry> {
    let ts: NaiveDateTime = row.get(1)?;
    Ok(LogEntry {
        id: row.get(0)?,
        ts: DateTime::from_naive_utc_and_offset(ts, Utc),
        hostname: row.get(2)?,
        unit: row.get(3)?,
        source: row.get(4)?,
        severity: row.get(5)?,
        message: row.get(6)?,
        cursor: row.get(7)?,
        fingerprint: row.get(8)?,
    })
}
