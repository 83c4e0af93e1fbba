//! Bucket anchors, indices, and object key derivation.

use chrono::{DateTime, SecondsFormat, Utc};
use common::CompressionKind;

use crate::config::TimeConfiguration;
use crate::error::{Error, Result};

/// The reference point bucket indices are computed from.
///
/// Established once per run from the first consumed record: the raw first
/// timestamp for `PeriodFromFirst`, or that timestamp truncated down to the
/// unit for `ChronoUnitSlice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketAnchor {
    anchor_ms: i64,
    period_ms: u64,
}

impl BucketAnchor {
    /// Derives the anchor from the first record's timestamp and the time
    /// policy.
    pub(crate) fn from_first(first_timestamp_ms: i64, time: &TimeConfiguration) -> Self {
        match time {
            TimeConfiguration::PeriodFromFirst { period_ms } => Self {
                anchor_ms: first_timestamp_ms,
                period_ms: *period_ms,
            },
            TimeConfiguration::ChronoUnitSlice { unit } => Self {
                anchor_ms: unit.truncate(first_timestamp_ms),
                period_ms: unit.millis(),
            },
        }
    }

    /// Bucket index of a timestamp relative to this anchor.
    ///
    /// Floor division, so a timestamp before the anchor yields a negative
    /// index, which the boundary detector rejects as a decrease. The
    /// subtraction saturates instead of wrapping at the extremes.
    pub(crate) fn index_of(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms
            .saturating_sub(self.anchor_ms)
            .div_euclid(self.period_ms as i64)
    }
}

/// Derives the object key for the bucket whose first record has the given
/// timestamp.
///
/// The key is the bucket anchor timestamp rendered as RFC 3339 UTC (seconds
/// precision unless sub-second digits are needed) plus an extension chosen by
/// the current compression configuration. Pure in its inputs: the same
/// timestamp, policy, and compression always yield the same key.
pub(crate) fn calculate_key(
    first_timestamp_ms: i64,
    time: &TimeConfiguration,
    compression: Option<CompressionKind>,
) -> Result<String> {
    let anchor_ms = match time {
        TimeConfiguration::PeriodFromFirst { .. } => first_timestamp_ms,
        TimeConfiguration::ChronoUnitSlice { unit } => unit.truncate(first_timestamp_ms),
    };
    let anchor = DateTime::<Utc>::from_timestamp_millis(anchor_ms).ok_or_else(|| {
        Error::UnhandledStreamCase(format!("timestamp {} is not representable", anchor_ms))
    })?;
    let stamp = anchor.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    Ok(format!("{}{}", stamp, extension(compression)))
}

fn extension(compression: Option<CompressionKind>) -> &'static str {
    match compression {
        None => ".json",
        Some(CompressionKind::Gzip) => ".json.gz",
    }
}

/// Strips the extension off an object key, leaving the timestamp stem.
///
/// Two keys with the same stem name the same bucket even when produced under
/// different compression configurations.
pub(crate) fn key_stem(key: &str) -> &str {
    key.strip_suffix(".json.gz")
        .or_else(|| key.strip_suffix(".json"))
        .unwrap_or(key)
}
