//! Storage configuration types.
//!
//! Configuration for the upload-store backends, deserializable from config
//! files. Cloud backends (S3, GCS) are configured and constructed by their
//! own adapter crates; this module covers the in-repo backends.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
///
/// Defaults to `Local` with a `./data` directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// In-memory storage (useful for testing and development).
    InMemory,
    /// Local filesystem storage.
    Local(LocalStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local(LocalStorageConfig {
            path: "data".to_string(),
        })
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalStorageConfig {
    /// Root directory for completed objects and upload staging.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_local_data_dir() {
        // given/when
        let config = StorageConfig::default();

        // then
        assert_eq!(
            config,
            StorageConfig::Local(LocalStorageConfig {
                path: "data".to_string()
            })
        );
    }

    #[test]
    fn should_deserialize_in_memory_config() {
        // given
        let yaml = r#"type: InMemory"#;

        // when
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(config, StorageConfig::InMemory);
    }

    #[test]
    fn should_deserialize_local_config() {
        // given
        let yaml = r#"
type: Local
path: /var/backup
"#;

        // when
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(
            config,
            StorageConfig::Local(LocalStorageConfig {
                path: "/var/backup".to_string()
            })
        );
    }
}
