//! Shared input plumbing: error taxonomy, file checks, date and identifier parsing.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputTable {
    Prints,
    Taps,
    Pays,
}

impl InputTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prints => "prints",
            Self::Taps => "taps",
            Self::Pays => "pays",
        }
    }
}

impl fmt::Display for InputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid input directory: {}", path.display())]
    NotADirectory { path: PathBuf },
    #[error("required input file not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed record in {table} at line {line}: {message}")]
    MalformedRecord {
        table: InputTable,
        line: u64,
        message: String,
    },
    #[error("missing columns in {table}: {columns:?}")]
    MissingColumns {
        table: InputTable,
        columns: Vec<String>,
    },
    #[error("{table} line {line}: 'event_data' must be a mapping")]
    NotAMapping { table: InputTable, line: u64 },
    #[error("{table} line {line}: field '{field}' has unsupported type {found}")]
    InvalidIdentifier {
        table: InputTable,
        line: u64,
        field: &'static str,
        found: &'static str,
    },
    #[error("{table} line {line}: invalid date in '{field}': {value}")]
    InvalidDate {
        table: InputTable,
        line: u64,
        field: &'static str,
        value: String,
    },
    #[error("{table} line {line}: non-numeric amount in 'total': {value}")]
    InvalidAmount {
        table: InputTable,
        line: u64,
        value: String,
    },
    #[error("{table} line {line}: invalid position: {value}")]
    InvalidPosition {
        table: InputTable,
        line: u64,
        value: String,
    },
    #[error("{table} line {line}: missing user_id")]
    MissingUserId { table: InputTable, line: u64 },
    #[error("{table} line {line}: missing value_prop")]
    MissingValueProp { table: InputTable, line: u64 },
}

pub fn ensure_dir(path: &Path) -> Result<(), InputError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(InputError::NotADirectory {
            path: path.to_path_buf(),
        })
    }
}

pub fn ensure_file(path: &Path) -> Result<(), InputError> {
    if path.exists() {
        Ok(())
    } else {
        Err(InputError::MissingFile {
            path: path.to_path_buf(),
        })
    }
}

/// Parses a calendar day, keeping only the date part of timestamp inputs.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.date_naive())
}

/// Canonical form of an opaque user or offer identifier.
///
/// Integral numeric text is rewritten in plain decimal, so `7`, `007` and
/// `7.0` are the same identifier whichever file they came from. Identifiers
/// that read as integers order numerically ahead of every other identifier;
/// the rest order lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    raw: String,
    numeric: Option<i64>,
}

impl EntityId {
    /// Returns `None` for blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        match integral_value(trimmed) {
            Some(value) => Some(Self {
                raw: value.to_string(),
                numeric: Some(value),
            }),
            None => Some(Self {
                raw: trimmed.to_string(),
                numeric: None,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn integral_value(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.fract() == 0.0)
        .filter(|value| *value >= i64::MIN as f64 && *value <= i64::MAX as f64)
        .map(|value| value as i64)
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric, other.numeric) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.raw.cmp(&other.raw)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    #[test]
    fn parse_day_accepts_dates_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 10).unwrap();
        assert_eq!(parse_day("2025-08-10"), Some(expected));
        assert_eq!(parse_day(" 2025-08-10 "), Some(expected));
        assert_eq!(parse_day("2025-08-10T13:45:00"), Some(expected));
        assert_eq!(parse_day("2025-08-10 13:45:00.250"), Some(expected));
        assert_eq!(parse_day("2025-08-10T13:45:00Z"), Some(expected));
    }

    #[test]
    fn parse_day_rejects_garbage() {
        assert_eq!(parse_day("not-a-date"), None);
        assert_eq!(parse_day("2025-02-30"), None);
        assert_eq!(parse_day(""), None);
    }

    #[test]
    fn entity_ids_are_trimmed_and_blank_is_rejected() {
        assert_eq!(id("  u1 ").as_str(), "u1");
        assert!(EntityId::new("   ").is_none());
    }

    #[test]
    fn numeric_ids_sort_numerically_before_text_ids() {
        let mut ids = vec![id("b"), id("10"), id("a"), id("9"), id("-3")];
        ids.sort();
        let rendered: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        assert_eq!(rendered, vec!["-3", "9", "10", "a", "b"]);
    }

    #[test]
    fn integral_spellings_collapse_to_one_identifier() {
        assert_eq!(id("007"), id("7"));
        assert_eq!(id("7.0"), id("7"));
        assert_eq!(id(" 3.000 ").as_str(), "3");
        assert_eq!(id("1e3").as_str(), "1000");
    }

    #[test]
    fn non_integral_numbers_and_text_keep_their_spelling() {
        assert_eq!(id("2.5").as_str(), "2.5");
        assert_eq!(id("NaN").as_str(), "NaN");
        assert_eq!(id("u007").as_str(), "u007");
        assert_eq!(id("99999999999999999999").as_str(), "99999999999999999999");
    }
}
