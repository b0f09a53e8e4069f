//! Content fingerprints.
//!
//! A fingerprint is the SHA-256 of a record's normalized core fields joined
//! by [`FIELD_SEPARATOR`], hex-encoded. Both adapters use this one function,
//! which is what allows matching records across stores without a link.

use crate::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator placed between normalized fields.
///
/// Missing fields still contribute an empty segment, so the separator count
/// is fixed.
pub const FIELD_SEPARATOR: char = '|';

/// A 64-character lowercase hex SHA-256 content hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already computed hex digest.
    ///
    /// Returns `None` unless `hex` is 64 hex characters. Upper-case input is
    /// folded to lower case.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Returns the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid fingerprint {value:?}"))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a record's core fields.
pub fn fingerprint(record: &Record) -> Fingerprint {
    let text = normalize_text(&record.text);
    let category = normalize_text(&record.category);
    let date = normalize_date(record.effective_date);

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([FIELD_SEPARATOR as u8]);
    hasher.update(category.as_bytes());
    hasher.update([FIELD_SEPARATOR as u8]);
    hasher.update(date.as_bytes());

    Fingerprint(hex::encode(hasher.finalize()))
}

/// Trims, collapses internal whitespace runs to one space, and lower-cases.
pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Renders a date as `YYYY-MM-DD`, or the empty string when absent.
pub fn normalize_date(value: Option<NaiveDate>) -> String {
    value
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn known_digest() {
        // sha256("adopt rust|architecture|2024-01-15")
        let record = Record::new("Adopt Rust", "Architecture", date(2024, 1, 15));
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"adopt rust|architecture|2024-01-15");
            hex::encode(hasher.finalize())
        };
        assert_eq!(fingerprint(&record).as_str(), expected);
        assert_eq!(fingerprint(&record).as_str().len(), 64);
    }

    #[test]
    fn missing_fields_keep_separators() {
        let record = Record::new("", "", None);
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"||");
            hex::encode(hasher.finalize())
        };
        assert_eq!(fingerprint(&record).as_str(), expected);
    }

    #[test]
    fn whitespace_and_case_are_ignored() {
        let a = Record::new("Adopt   Rust\tnow", "OPS", date(2024, 1, 15));
        let b = Record::new("  adopt rust now ", "ops", date(2024, 1, 15));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn ids_and_timestamps_do_not_matter() {
        let a = Record::new("x", "y", None).with_primary_id("1");
        let b = Record::new("x", "y", None)
            .with_secondary_id("page")
            .with_linked(true);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn date_change_changes_fingerprint() {
        let a = Record::new("x", "y", date(2024, 1, 15));
        let b = Record::new("x", "y", date(2024, 1, 16));
        let c = Record::new("x", "y", None);
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn field_boundaries_matter() {
        let a = Record::new("a b", "c", None);
        let b = Record::new("a", "b c", None);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn from_hex_validates() {
        let fp = fingerprint(&Record::new("x", "y", None));
        assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp.clone()));
        assert_eq!(
            Fingerprint::from_hex(&fp.as_str().to_uppercase()),
            Some(fp.clone())
        );
        assert_eq!(Fingerprint::from_hex("abc"), None);
        assert_eq!(Fingerprint::from_hex(&"z".repeat(64)), None);
        assert_eq!(fp.short().len(), 8);
    }

    #[test]
    fn deserialization_validates() {
        let fp = fingerprint(&Record::new("x", "y", None));
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.as_str()));
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fp);

        assert!(serde_json::from_str::<Fingerprint>("\"abc\"").is_err());
        assert!(serde_json::from_str::<Fingerprint>("\"\"").is_err());
    }

    proptest! {
        #[test]
        fn fingerprint_is_stable(text in ".{0,40}", category in "[A-Za-z ]{0,12}") {
            let record = Record::new(text, category, date(2023, 6, 1));
            prop_assert_eq!(fingerprint(&record), fingerprint(&record.clone()));
        }

        #[test]
        fn fingerprint_ignores_padding_and_case(
            words in prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..6),
            pad in "[ \t\n]{1,4}",
        ) {
            let plain = Record::new(words.join(" "), "Ops", None);
            let noisy = Record::new(
                format!("{pad}{}{pad}", words.join(pad.as_str()).to_uppercase()),
                " ops ",
                None,
            );
            prop_assert_eq!(fingerprint(&plain), fingerprint(&noisy));
        }
    }
}
