//! Storage configuration types.

use serde::{Deserialize, Serialize};

/// Storage configuration for the in-memory race store.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StorageConfig {
    /// Optional JSON document of users and race texts loaded at boot
    #[serde(default)]
    pub seed_path: Option<String>,
}
