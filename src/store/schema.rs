// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Idempotent schema creation and the legacy sequence-id -> hash-id
//! migration.
//!
//! Grounded on the `ericyarmo-Chainge-Kernel` versioned `migrate()` shape
//! (a `schema_migrations`-style bookkeeping table, transactional apply) and
//! `LevyDeSales-treeline`'s `run_migrations` (idempotent, safe to call on
//! every start).

use duckdb::Connection;
use tracing::warn;

use crate::error::ChimeraError;

/// Creates `logs`/`ingest_state` if absent and the `ts` index. Safe to run
/// on every server start.
pub fn ensure_schema(conn: &Connection) -> Result<(), ChimeraError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS logs (
            id BIGINT PRIMARY KEY,
            ts TIMESTAMP,
            hostname TEXT,
            unit TEXT,
            source TEXT,
            severity TEXT,
            message TEXT,
            cursor TEXT UNIQUE,
            fingerprint TEXT
        );

        CREATE TABLE IF NOT EXISTS ingest_state (
            source_name TEXT PRIMARY KEY,
            cursor TEXT,
            updated_at TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS logs_ts_idx ON logs (ts);
        "#,
    )?;

    migrate_legacy_sequence_ids(conn)?;

    Ok(())
}

/// Detects a pre-existing `logs` table whose `id` column was populated by
/// an auto-increment sequence rather than a fingerprint-derived hash, and
/// rebuilds it with deterministic ids.
///
/// Detection: introspect `logs.id`'s column default via
/// `duckdb_columns()`. A sequence default (`nextval(...)`) means the
/// legacy scheme is in use; no default (or the table not existing yet)
/// means there is nothing to migrate.
///
/// On fingerprint collisions among legacy rows (two different legacy ids
/// sharing the same derived id), the row with the earliest `ts` is kept;
/// the rest are dropped and logged at `warn` for operator review, per the
/// spec's open-question resolution.
fn migrate_legacy_sequence_ids(conn: &Connection) -> Result<(), ChimeraError> {
    let has_sequence_default: bool = conn
        .query_row(
            r#"
            SELECT COALESCE(column_default, '') LIKE '%nextval%'
            FROM duckdb_columns()
            WHERE table_name = 'logs' AND column_name = 'id'
            "#,
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !has_sequence_default {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE logs_migrated (
            id BIGINT PRIMARY KEY,
            ts TIMESTAMP,
            hostname TEXT,
            unit TEXT,
            source TEXT,
            severity TEXT,
            message TEXT,
            cursor TEXT UNIQUE,
            fingerprint TEXT
        );
        "#,
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, ts, hostname, unit, source, severity, message, cursor, fingerprint \
         FROM logs ORDER BY ts ASC",
    )?;
    let legacy_rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, chrono::NaiveDateTime>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut dropped = 0u64;
    for row in legacy_rows {
        let (legacy_id, ts, hostname, unit, source, severity, message, cursor, fingerprint) =
            row?;
        let new_id = super::fingerprint::derive_id(&fingerprint);

        let inserted = conn.execute(
            "INSERT INTO logs_migrated \
             (id, ts, hostname, unit, source, severity, message, cursor, fingerprint) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO NOTHING",
            duckdb::params![
                new_id, ts, hostname, unit, source, severity, message, cursor,
                fingerprint
            ],
        )?;

        if inserted == 0 {
            dropped += 1;
            warn!(
                legacy_id,
                new_id, fingerprint, "dropped colliding legacy row during id migration \
                 (earlier-ts row already occupies this id; flag for operator review)"
            );
        }
    }

    conn.execute_batch(
        r#"
        DROP TABLE logs;
        ALTER TABLE logs_migrated RENAME TO logs;
        CREATE INDEX IF NOT EXISTS logs_ts_idx ON logs (ts);
        "#,
    )?;

    if dropped > 0 {
        warn!(dropped, "legacy id migration completed with dropped rows");
    }

    Ok(())
}
