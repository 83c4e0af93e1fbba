//! Storage factory for creating upload stores from configuration.

use std::sync::Arc;

use super::config::StorageConfig;
use super::in_memory::InMemoryUploadStore;
use super::local::LocalUploadStore;
use super::{StorageResult, UploadStore};

/// Creates an upload store based on the provided configuration.
///
/// # Examples
///
/// ```rust,ignore
/// use common::{StorageConfig, create_upload_store};
///
/// let store = create_upload_store(&StorageConfig::InMemory).await?;
/// ```
pub async fn create_upload_store(
    config: &StorageConfig,
) -> StorageResult<Arc<dyn UploadStore>> {
    match config {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryUploadStore::new())),
        StorageConfig::Local(local_config) => {
            let store = LocalUploadStore::open(&local_config.path).await?;
            Ok(Arc::new(store))
        }
    }
}
