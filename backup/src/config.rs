//! Configuration options for the backup pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{CompressionKind, StorageConfig};

use crate::error::{Error, Result};

/// Time policy determining how records are partitioned into buckets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TimeConfiguration {
    /// Buckets are fixed-length periods anchored at the first record's
    /// timestamp. Object keys are derived from each bucket's first record,
    /// so a restarted run produces fresh keys.
    PeriodFromFirst { period_ms: u64 },
    /// Buckets are calendar slices of the given unit, anchored at the first
    /// record's timestamp truncated down to the unit. Keys are stable across
    /// restarts within the same slice, which is what makes mid-bucket
    /// resumption possible.
    ChronoUnitSlice { unit: TimeUnit },
}

impl TimeConfiguration {
    /// Validates policy parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            TimeConfiguration::PeriodFromFirst { period_ms: 0 } => Err(Error::Config(
                "time.period_ms must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Calendar units for [`TimeConfiguration::ChronoUnitSlice`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of the unit in milliseconds.
    pub fn millis(self) -> u64 {
        match self {
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }

    /// Truncates an epoch-millisecond timestamp down to this unit.
    pub fn truncate(self, timestamp_ms: i64) -> i64 {
        let unit = self.millis() as i64;
        timestamp_ms - timestamp_ms.rem_euclid(unit)
    }
}

/// Compression applied to backup objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
pub enum CompressionConfig {
    #[default]
    None,
    Gzip {
        /// Compression level 1-9; omitted means the encoder default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<u32>,
    },
}

impl CompressionConfig {
    /// The compression kind this configuration selects, if any.
    pub fn kind(&self) -> Option<CompressionKind> {
        match self {
            CompressionConfig::None => None,
            CompressionConfig::Gzip { .. } => Some(CompressionKind::Gzip),
        }
    }

    /// Validates the compression level.
    pub fn validate(&self) -> Result<()> {
        match self {
            CompressionConfig::Gzip { level: Some(level) } if !(1..=9).contains(level) => Err(
                Error::Config(format!("compression.level must be 1-9, got {}", level)),
            ),
            _ => Ok(()),
        }
    }
}

fn default_part_size() -> usize {
    5 * 1024 * 1024
}

/// Configuration for running a [`BackupPipeline`](crate::BackupPipeline).
///
/// # Example
///
/// ```yaml
/// time:
///   type: ChronoUnitSlice
///   unit: Hour
/// compression:
///   type: Gzip
///   level: 6
/// storage:
///   type: Local
///   path: /var/backup
/// kafka_cluster:
///   bootstrap.servers: localhost:9092
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupConfig {
    /// Time policy for bucket boundaries and object keys.
    pub time: TimeConfiguration,

    /// Compression for newly begun objects. In-progress objects found in
    /// storage keep the encoding they were started with.
    pub compression: CompressionConfig,

    /// Storage backend configuration.
    pub storage: StorageConfig,

    /// Upstream connection parameters, passed through verbatim to the
    /// consumer collaborator. Not interpreted by the pipeline.
    pub kafka_cluster: HashMap<String, String>,

    /// Upload part size in bytes. Chunks are buffered until a full part is
    /// available; the final part of an object may be smaller.
    pub part_size_bytes: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            time: TimeConfiguration::ChronoUnitSlice {
                unit: TimeUnit::Hour,
            },
            compression: CompressionConfig::None,
            storage: StorageConfig::default(),
            kafka_cluster: HashMap::new(),
            part_size_bytes: default_part_size(),
        }
    }
}

impl BackupConfig {
    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("cannot read config file: {}", e)))?;
        let config: BackupConfig =
            serde_yaml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration as a whole.
    pub fn validate(&self) -> Result<()> {
        self.time.validate()?;
        self.compression.validate()?;
        if self.part_size_bytes == 0 {
            return Err(Error::Config(
                "part_size_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_hourly_slices_without_compression() {
        // given/when
        let config = BackupConfig::default();

        // then
        assert_eq!(
            config.time,
            TimeConfiguration::ChronoUnitSlice {
                unit: TimeUnit::Hour
            }
        );
        assert_eq!(config.compression, CompressionConfig::None);
        assert_eq!(config.part_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn should_deserialize_period_from_first_config() {
        // given
        let yaml = r#"
time:
  type: PeriodFromFirst
  period_ms: 60000
"#;

        // when
        let config: BackupConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(
            config.time,
            TimeConfiguration::PeriodFromFirst { period_ms: 60000 }
        );
    }

    #[test]
    fn should_deserialize_gzip_with_level_and_kafka_passthrough() {
        // given
        let yaml = r#"
compression:
  type: Gzip
  level: 6
kafka_cluster:
  bootstrap.servers: localhost:9092
"#;

        // when
        let config: BackupConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(
            config.compression,
            CompressionConfig::Gzip { level: Some(6) }
        );
        assert_eq!(
            config.kafka_cluster.get("bootstrap.servers"),
            Some(&"localhost:9092".to_string())
        );
    }

    #[test]
    fn should_reject_zero_period() {
        // given
        let config = BackupConfig {
            time: TimeConfiguration::PeriodFromFirst { period_ms: 0 },
            ..Default::default()
        };

        // when
        let result = config.validate();

        // then
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn should_reject_out_of_range_gzip_level() {
        // given
        let config = BackupConfig {
            compression: CompressionConfig::Gzip { level: Some(12) },
            ..Default::default()
        };

        // when
        let result = config.validate();

        // then
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn should_truncate_timestamps_to_unit() {
        // given
        let ts = 3 * 3_600_000 + 59 * 60_000 + 59_500;

        // when/then
        assert_eq!(TimeUnit::Second.truncate(ts), 3 * 3_600_000 + 59 * 60_000 + 59_000);
        assert_eq!(TimeUnit::Minute.truncate(ts), 3 * 3_600_000 + 59 * 60_000);
        assert_eq!(TimeUnit::Hour.truncate(ts), 3 * 3_600_000);
        assert_eq!(TimeUnit::Day.truncate(ts), 0);
    }

    #[test]
    fn should_truncate_negative_timestamps_towards_minus_infinity() {
        // given: 500ms before the epoch
        let ts = -500;

        // when/then
        assert_eq!(TimeUnit::Second.truncate(ts), -1_000);
    }
}
