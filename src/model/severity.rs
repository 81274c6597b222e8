// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Syslog severity levels and their ranking.

use core::fmt;

/// Syslog numeric severity levels, `Emerg` (most severe) through `Debug`
/// (least severe), plus an `Other` case for inputs outside the known set.
///
/// `Other` never participates in `min_severity` ordering: per spec, a
/// `min_severity` filter simply never matches rows whose severity is not
/// one of the eight known names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
    Other(String),
}

impl Severity {
    /// Parses one of the eight syslog level names (case-insensitive).
    /// Anything else becomes `Other(s)`, preserving the original text.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "emerg" => Severity::Emerg,
            "alert" => Severity::Alert,
            "crit" => Severity::Crit,
            "err" => Severity::Err,
            "warning" => Severity::Warning,
            "notice" => Severity::Notice,
            "info" => Severity::Info,
            "debug" => Severity::Debug,
            _ => Severity::Other(s.to_string()),
        }
    }

    /// Maps a numeric syslog/journal priority (0-7) to its severity name.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0 => Severity::Emerg,
            1 => Severity::Alert,
            2 => Severity::Crit,
            3 => Severity::Err,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Info,
            _ => Severity::Debug,
        }
    }

    /// Severity rank: `emerg=0` (most severe) through `debug=7` (least
    /// severe). Returns `None` for `Other`, which never ranks.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Severity::Emerg => Some(0),
            Severity::Alert => Some(1),
            Severity::Crit => Some(2),
            Severity::Err => Some(3),
            Severity::Warning => Some(4),
            Severity::Notice => Some(5),
            Severity::Info => Some(6),
            Severity::Debug => Some(7),
            Severity::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Emerg => "emerg",
            Severity::Alert => "alert",
            Severity::Crit => "crit",
            Severity::Err => "err",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
            Severity::Other(s) => s,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_known_levels_in_order() {
        let levels = [
            Severity::Emerg,
            Severity::Alert,
            Severity::Crit,
            Severity::Err,
            Severity::Warning,
            Severity::Notice,
            Severity::Info,
            Severity::Debug,
        ];
        let ranks: Vec<u8> = levels.iter().map(|s| s.rank().expect("known")).collect();
        assert_eq!(ranks, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn unknown_severity_never_ranks() {
        let s = Severity::parse("totally-custom");
        assert!(matches!(s, Severity::Other(_)));
        assert_eq!(s.rank(), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Severity::parse("ERR").rank(), Severity::parse("err").rank());
    }

    #[test]
    fn priority_mapping_matches_syslog() {
        assert_eq!(Severity::from_priority(0).as_str(), "emerg");
        assert_eq!(Severity::from_priority(3).as_str(), "err");
        assert_eq!(Severity::from_priority(7).as_str(), "debug");
        // Out-of-range priorities clamp to debug rather than panicking.
        assert_eq!(Severity::from_priority(9).as_str(), "debug");
    }
}
