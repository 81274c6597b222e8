// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives one end-to-end ingest of the journal: read cursor, stream
//! records, normalize/fingerprint/dedup, insert in batches, advance the
//! cursor transactionally with the batch that produced it.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::ChimeraError;
use crate::journal::{self, ReadBounds, SOURCE_NAME};
use crate::model::LogEntry;
use crate::store::Store;

/// Records are flushed to the store in batches of at most this many rows.
pub const INGEST_BATCH_SIZE: usize = 1_000;

/// Outcome of one `ingest_journal` call.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub inserted: u64,
    pub total_after: u64,
}

/// Runs one incremental ingest of the journal source.
///
/// Per spec.md §4.C: reads the persisted cursor (or falls back to the
/// time window when the source has never ingested), streams records,
/// batches up to [`INGEST_BATCH_SIZE`] at a time, and commits each batch's
/// insert together with the cursor advance in a single transaction. A
/// journal-launch failure or a storage error aborts without advancing the
/// cursor; batches already committed in this call remain.
pub async fn ingest_journal(
    store: &Store,
    journal_cmd: &str,
    window_seconds: u64,
    max_records: Option<u64>,
) -> Result<IngestOutcome, ChimeraError> {
    let start_cursor = store.get_cursor(SOURCE_NAME)?;

    let bounds = ReadBounds {
        window_seconds,
        max_records,
        start_cursor,
    };

    let (tx, mut rx) = mpsc::channel(INGEST_BATCH_SIZE);
    let journal_cmd = journal_cmd.to_string();
    let reader_task = tokio::spawn(async move { journal::stream_records(&journal_cmd, bounds, tx).await });

    let mut total_inserted = 0u64;
    let mut batch: Vec<LogEntry> = Vec::with_capacity(INGEST_BATCH_SIZE);
    let mut batch_cursor: Option<String> = None;
    let mut dropped_unparseable_ts = 0u64;

    while let Some(record) = rx.recv().await {
        let Some(entry) = Store::entry_from_raw(&record) else {
            dropped_unparseable_ts += 1;
            continue;
        };

        if record.cursor.is_some() {
            batch_cursor = record.cursor.clone();
        }
        batch.push(entry);

        if batch.len() >= INGEST_BATCH_SIZE {
            total_inserted += flush_batch(store, &mut batch, &mut batch_cursor)?;
        }
    }
    if !batch.is_empty() {
        total_inserted += flush_batch(store, &mut batch, &mut batch_cursor)?;
    }

    // Propagate the reader task's outcome: a launch failure surfaces even
    // if it happened before any record was produced.
    let summary = reader_task
        .await
        .map_err(|e| ChimeraError::Storage(format!("journal reader task panicked: {e}")))??;

    if dropped_unparseable_ts > 0 {
        warn!(
            dropped_unparseable_ts,
            "dropped records with unparseable timestamps during ingest"
        );
    }
    if summary.skipped_malformed > 0 {
        warn!(
            skipped = summary.skipped_malformed,
            "skipped malformed journal lines during ingest"
        );
    }

    let total_after = store.count_logs()?;
    info!(
        inserted = total_inserted,
        total_after, "journal ingest complete"
    );

    Ok(IngestOutcome {
        inserted: total_inserted,
        total_after,
    })
}

fn flush_batch(
    store: &Store,
    batch: &mut Vec<LogEntry>,
    batch_cursor: &mut Option<String>,
) -> Result<u64, ChimeraError> {
    let inserted =
        store.insert_logs_and_advance_cursor(batch, SOURCE_NAME, batch_cursor.as_deref())?;
    batch.clear();
    *batch_cursor = None;
    Ok(inserted)
}
