// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-wide error taxonomy.
//!
//! Every variant here maps to exactly one of the error kinds described by
//! the protocol: a request-time error becomes an `ERR <reason>` line on the
//! wire, while [`ChimeraError::StartupFatal`] never reaches a client — it
//! aborts the process before the listener is bound.

use thiserror::Error;

/// Errors produced while serving a request or running the ingest pipeline.
#[derive(Debug, Error)]
pub enum ChimeraError {
    /// Verb not recognized by the dispatcher.
    #[error("unknown command")]
    UnknownCommand,

    /// Unparseable line, missing required argument, or out-of-range number.
    #[error("bad arguments: {0}")]
    BadRequest(String),

    /// The external journal tool could not be launched or died unexpectedly.
    #[error("journal-unavailable: {0}")]
    ExternalUnavailable(String),

    /// Database I/O, constraint, or migration error encountered while
    /// serving a request.
    #[error("storage: {0}")]
    Storage(String),

    /// Cannot bind the socket or cannot open/migrate the store. Fatal:
    /// the caller must log this and exit non-zero, never surface it to a
    /// client.
    #[error("startup failed: {0}")]
    StartupFatal(String),

    /// The peer closed the connection before the response was fully
    /// written. Never surfaced; logged at debug at most.
    #[error("client disconnected")]
    ClientDisconnected,
}

impl ChimeraError {
    /// Render the `ERR ...` line this error produces on the wire. Returns
    /// `None` for variants that must never be surfaced to a client.
    pub fn wire_reason(&self) -> Option<String> {
        match self {
            ChimeraError::UnknownCommand => Some("unknown-command".to_string()),
            ChimeraError::BadRequest(_) => Some("bad-arguments".to_string()),
            ChimeraError::ExternalUnavailable(_) => {
                Some("journal-unavailable".to_string())
            },
            ChimeraError::Storage(reason) => Some(format!("storage: {reason}")),
            ChimeraError::StartupFatal(_) | ChimeraError::ClientDisconnected => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChimeraError>;

impl From<duckdb::Error> for ChimeraError {
    fn from(e: duckdb::Error) -> Self {
        ChimeraError::Storage(e.to_string())
    }
}
