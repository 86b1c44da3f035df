//! Release records and the storage key layout `updates/{runtimeVersion}/{timestamp}.zip`.

use crate::error::{Error, Result};
use crate::hash::UpdateId;
use serde::Serialize;
use std::cmp::Ordering;
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

/// Top-level namespace for release archives.
pub const RELEASES_PREFIX: &str = "updates";

/// File extension of release archives.
pub const RELEASE_EXTENSION: &str = ".zip";

const MAX_RUNTIME_VERSION_LEN: usize = 128;

/// A release as reported to callers: storage existence merged with ledger provenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub path: String,
    pub runtime_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Archive size in bytes.
    pub size: u64,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub update_id: Option<UpdateId>,
    /// Ledger insertion sequence; `None` for objects the ledger never recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<i64>,
}

impl Release {
    /// Whether the ledger has a record for this release.
    pub fn is_recorded(&self) -> bool {
        self.release_id.is_some()
    }
}

/// Check that a runtime version is usable as a single storage path segment.
pub fn validate_runtime_version(runtime_version: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidInput(format!(
            "invalid runtime version {runtime_version:?}: {reason}"
        )))
    };

    if runtime_version.is_empty() {
        return invalid("must not be empty");
    }
    if runtime_version.len() > MAX_RUNTIME_VERSION_LEN {
        return invalid("too long");
    }
    if runtime_version.trim() != runtime_version {
        return invalid("must not start or end with whitespace");
    }
    if runtime_version.contains('/') || runtime_version.contains('\\') {
        return invalid("must not contain path separators");
    }
    if runtime_version == "." || runtime_version.contains("..") {
        return invalid("must not contain '..'");
    }
    if runtime_version.chars().any(char::is_control) {
        return invalid("must not contain control characters");
    }
    Ok(())
}

/// Storage prefix holding every release of `runtime_version`.
pub fn runtime_prefix(runtime_version: &str) -> String {
    format!("{RELEASES_PREFIX}/{runtime_version}/")
}

/// Format an instant as the fixed-width key stem `YYYYMMDDHHMMSSmmm` (UTC).
///
/// Lexicographic order of stems equals chronological order.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    let ts = ts.to_offset(UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{:03}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.millisecond()
    )
}

/// Parse a key stem. Accepts the 17-digit form and the 14-digit second-resolution form.
pub fn parse_timestamp(stem: &str) -> Option<OffsetDateTime> {
    if !(stem.len() == 17 || stem.len() == 14) || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| stem[range].parse::<u16>().ok();

    let year = i32::from(field(0..4)?);
    let month = Month::try_from(u8::try_from(field(4..6)?).ok()?).ok()?;
    let day = u8::try_from(field(6..8)?).ok()?;
    let hour = u8::try_from(field(8..10)?).ok()?;
    let minute = u8::try_from(field(10..12)?).ok()?;
    let second = u8::try_from(field(12..14)?).ok()?;
    let millis = if stem.len() == 17 { field(14..17)? } else { 0 };

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms_milli(hour, minute, second, millis).ok()?;
    Some(date.with_time(time).assume_utc())
}

/// Drop sub-millisecond precision so an instant round-trips through its key stem.
pub fn truncate_to_millis(ts: OffsetDateTime) -> OffsetDateTime {
    let ts = ts.to_offset(UtcOffset::UTC);
    ts.replace_nanosecond(ts.millisecond() as u32 * 1_000_000)
        .unwrap_or(ts)
}

/// A parsed release storage key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseKey {
    runtime_version: String,
    /// Key stem, kept verbatim so listings round-trip exactly.
    stem: String,
    timestamp: Option<OffsetDateTime>,
}

impl ReleaseKey {
    /// Build the key for a new release created at `created_at`.
    pub fn new(runtime_version: &str, created_at: OffsetDateTime) -> Result<Self> {
        validate_runtime_version(runtime_version)?;
        let timestamp = truncate_to_millis(created_at);
        Ok(Self {
            runtime_version: runtime_version.to_string(),
            stem: format_timestamp(timestamp),
            timestamp: Some(timestamp),
        })
    }

    /// Parse `updates/{runtimeVersion}/{stem}.zip`.
    ///
    /// The stem does not have to be a timestamp; objects written by other
    /// tools are still addressable and are ordered by their storage metadata.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || Error::InvalidReleaseKey(path.to_string());

        let rest = path
            .strip_prefix(RELEASES_PREFIX)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (runtime_version, file) = rest.split_once('/').ok_or_else(invalid)?;
        let stem = file.strip_suffix(RELEASE_EXTENSION).ok_or_else(invalid)?;
        if stem.is_empty() || stem.contains('/') || stem.starts_with('.') {
            return Err(invalid());
        }
        validate_runtime_version(runtime_version).map_err(|_| invalid())?;

        Ok(Self {
            runtime_version: runtime_version.to_string(),
            stem: stem.to_string(),
            timestamp: parse_timestamp(stem),
        })
    }

    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    /// Timestamp encoded in the key, if the stem is one.
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        self.timestamp
    }

    /// The full storage key.
    pub fn path(&self) -> String {
        format!(
            "{}{}{RELEASE_EXTENSION}",
            runtime_prefix(&self.runtime_version),
            self.stem
        )
    }
}

/// Order runtime versions segment by segment on `.`; numeric segments compare
/// numerically and sort before non-numeric ones, which compare as strings.
pub fn compare_runtime_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamp_stem_is_fixed_width_and_sortable() {
        let a = datetime!(2024-03-05 07:08:09.012 UTC);
        let b = datetime!(2024-03-05 07:08:09.013 UTC);
        let c = datetime!(2025-01-01 00:00:00 UTC);

        assert_eq!(format_timestamp(a), "20240305070809012");
        assert!(format_timestamp(a) < format_timestamp(b));
        assert!(format_timestamp(b) < format_timestamp(c));
        assert_eq!(parse_timestamp("20240305070809012"), Some(a));
    }

    #[test]
    fn timestamp_stem_normalizes_offset() {
        let local = datetime!(2024-03-05 09:08:09 +02:00);
        assert_eq!(format_timestamp(local), "20240305070809000");
    }

    #[test]
    fn parses_second_resolution_stems() {
        assert_eq!(
            parse_timestamp("20240305070809"),
            Some(datetime!(2024-03-05 07:08:09 UTC))
        );
        assert_eq!(parse_timestamp("20241305070809"), None);
        assert_eq!(parse_timestamp("2024030507080"), None);
        assert_eq!(parse_timestamp("latest"), None);
    }

    #[test]
    fn release_key_round_trip() {
        let created = datetime!(2024-03-05 07:08:09.012345 UTC);
        let key = ReleaseKey::new("52", created).unwrap();
        assert_eq!(key.path(), "updates/52/20240305070809012.zip");
        assert_eq!(key.timestamp(), Some(datetime!(2024-03-05 07:08:09.012 UTC)));

        let parsed = ReleaseKey::parse(&key.path()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn release_key_keeps_unparseable_stems() {
        let key = ReleaseKey::parse("updates/1.0.0/hotfix.zip").unwrap();
        assert_eq!(key.runtime_version(), "1.0.0");
        assert_eq!(key.timestamp(), None);
        assert_eq!(key.path(), "updates/1.0.0/hotfix.zip");
    }

    #[test]
    fn release_key_rejects_bad_paths() {
        for path in [
            "",
            "updates/52",
            "updates/52/a.tar",
            "updates/52/.zip",
            "updates/../a.zip",
            "updates/52/nested/a.zip",
            "other/52/a.zip",
            "updates//a.zip",
        ] {
            assert!(
                matches!(ReleaseKey::parse(path), Err(Error::InvalidReleaseKey(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn runtime_version_validation() {
        for ok in ["52", "1.0.0", "exposdk:50.0.0", "v2-beta"] {
            validate_runtime_version(ok).unwrap();
        }
        for bad in ["", " 52", "a/b", "a\\b", "..", "1..2", ".", "5\n2"] {
            assert!(
                matches!(validate_runtime_version(bad), Err(Error::InvalidInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn runtime_versions_order_numerically() {
        let mut versions = vec!["10", "9", "1.10.0", "1.2.0", "1.2", "beta", "1.2.0-rc"];
        versions.sort_by(|a, b| compare_runtime_versions(a, b));
        assert_eq!(
            versions,
            vec!["1.2", "1.2.0", "1.2.0-rc", "1.10.0", "9", "10", "beta"]
        );
    }
}
