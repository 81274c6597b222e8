// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deterministic fingerprint and id derivation for [`crate::model::LogEntry`].

use chrono::{DateTime, Utc};

/// Separator placed between canonical fields. Chosen to be a byte that
/// cannot appear in any of the canonicalized fields (timestamps, hostnames,
/// unit names, and free-text messages may all contain ordinary printable
/// characters, but never this control byte).
const FIELD_SEP: u8 = 0x1f;

/// Builds the canonical fingerprint input: `ts_iso8601_utc`, `hostname`,
/// `unit`, `source`, `severity`, `message`, joined by [`FIELD_SEP`]. Empty
/// fields are encoded as the empty string, not dropped, so the separators
/// alone disambiguate field boundaries.
pub fn canonicalize(
    ts: DateTime<Utc>,
    hostname: &str,
    unit: &str,
    source: &str,
    severity: &str,
    message: &str,
) -> String {
    let sep = FIELD_SEP as char;
    format!(
        "{}{sep}{hostname}{sep}{unit}{sep}{source}{sep}{severity}{sep}{message}",
        ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    )
}

/// Stable hash of the canonical fingerprint string.
pub fn fingerprint_hash(canonical: &str) -> String {
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Deterministic signed 64-bit id derived from a fingerprint: the first 8
/// bytes of its blake3 hash, interpreted big-endian, with the sign bit
/// cleared so it always fits the `BIGINT` column.
pub fn derive_id(fingerprint: &str) -> i64 {
    let digest = blake3::hash(fingerprint.as_bytes());
    let bytes = digest.as_bytes();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    let raw = u64::from_be_bytes(buf);
    (raw & 0x7fff_ffff_ffff_ffff) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-31T12:00:00.123456Z")
            .expect("valid")
            .with_timezone(&Utc)
    }

    #[test]
    fn same_fingerprint_yields_same_id() {
        let c1 = canonicalize(ts(), "host", "sshd.service", "journal", "err", "boom");
        let c2 = canonicalize(ts(), "host", "sshd.service", "journal", "err", "boom");
        assert_eq!(derive_id(&fingerprint_hash(&c1)), derive_id(&fingerprint_hash(&c2)));
    }

    #[test]
    fn different_messages_yield_different_fingerprints() {
        let c1 = canonicalize(ts(), "host", "sshd.service", "journal", "err", "a");
        let c2 = canonicalize(ts(), "host", "sshd.service", "journal", "err", "b");
        assert_ne!(fingerprint_hash(&c1), fingerprint_hash(&c2));
    }

    #[test]
    fn derived_id_always_fits_signed_64_bit() {
        for msg in ["", "x", "a very long message with lots of entropy in it"] {
            let c = canonicalize(ts(), "h", "u", "s", "info", msg);
            let id = derive_id(&fingerprint_hash(&c));
            assert!(id >= 0);
        }
    }

    #[test]
    fn empty_fields_are_encoded_not_dropped() {
        let with_empty_unit = canonicalize(ts(), "host", "", "journal", "info", "msg");
        let with_space_unit = canonicalize(ts(), "host", " ", "journal", "info", "msg");
        assert_ne!(with_empty_unit, with_space_unit);
    }
}
