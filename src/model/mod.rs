// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed records shared by the store, ingestor, and handlers.

/// Syslog severity names and ranking.
pub mod severity;

pub use severity::Severity;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A normalized record as produced by the journal reader, before a
/// fingerprint/id has been derived for it.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub ts: Option<DateTime<Utc>>,
    pub hostname: String,
    pub unit: String,
    pub source: String,
    pub severity: Severity,
    pub message: String,
    pub cursor: Option<String>,
}

/// One normalized, fingerprinted, id-assigned log row, ready for
/// insertion.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub hostname: String,
    pub unit: String,
    pub source: String,
    pub severity: String,
    pub message: String,
    pub cursor: Option<String>,
    pub fingerprint: String,
}

/// The per-source cursor/progress bookmark.
#[derive(Debug, Clone)]
pub struct IngestState {
    pub source_name: String,
    pub cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Sort order for [`crate::store::Store::query_logs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Order {
    fn default() -> Self {
        Order::Desc
    }
}

/// Combinable filters for `QUERY_LOGS`. All fields are optional and ANDed
/// together.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub since_seconds: Option<i64>,
    pub min_severity: Option<Severity>,
    pub source: Option<String>,
    pub unit: Option<String>,
    pub hostname: Option<String>,
    pub contains: Option<String>,
    pub limit: Option<u32>,
    pub order: Order,
}

/// Default/maximum row counts, per spec.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 10_000;
pub const DEFAULT_DISCOVER_LIMIT: u32 = 50;
pub const MAX_DISCOVER_LIMIT: u32 = 500;

/// The dimension a `DISCOVER` request aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverDimension {
    Units,
    Hostnames,
    Sources,
    Severities,
}

impl DiscoverDimension {
    pub fn column(self) -> &'static str {
        match self {
            DiscoverDimension::Units => "unit",
            DiscoverDimension::Hostnames => "hostname",
            DiscoverDimension::Sources => "source",
            DiscoverDimension::Severities => "severity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UNITS" => Some(DiscoverDimension::Units),
            "HOSTNAMES" => Some(DiscoverDimension::Hostnames),
            "SOURCES" => Some(DiscoverDimension::Sources),
            "SEVERITIES" => Some(DiscoverDimension::Severities),
            _ => None,
        }
    }
}

/// One row of a `DISCOVER` aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverRow {
    pub value: String,
    pub count: i64,
}
