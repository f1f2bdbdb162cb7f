//! Configuration for the local mirror.
//!
//! The host passes a JSON object to [`MirrorConfig::from_json`] (or the
//! `create_db_with_config` FFI entry point). Every field is optional and falls
//! back to the values in [`MirrorConfig::default`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;

pub const DEFAULT_DB_NAME: &str = "cityshare_cache";
pub const DEFAULT_COLLECTION: &str = "cities";
pub const DEFAULT_ORDER_BY: &str = "name";
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DBS: u32 = 4;

/// Settings for opening the store and naming the mirrored collection.
///
/// ```rust
/// use city_mirror_core::mirror_config::MirrorConfig;
///
/// let config = MirrorConfig::from_json(r#"{"db_name": "trips_cache"}"#)?;
/// assert_eq!(config.db_name, "trips_cache");
/// assert_eq!(config.collection, "cities");
/// # Ok::<(), city_mirror_core::AppResponse>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Base path of the database. The LMDB directory is `<db_name>.lmdb`.
    pub db_name: String,

    /// Remote collection path that is mirrored.
    pub collection: String,

    /// Field the remote layer orders the collection by.
    pub order_by: String,

    /// Maximum size of the LMDB memory map in bytes.
    pub map_size: usize,

    pub max_dbs: u32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            order_by: DEFAULT_ORDER_BY.to_string(),
            map_size: DEFAULT_MAP_SIZE,
            max_dbs: DEFAULT_MAX_DBS,
        }
    }
}

impl MirrorConfig {
    /// Default configuration with a custom database name.
    pub fn named(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration object.
    pub fn from_json(json: &str) -> Result<Self, AppResponse> {
        let config: MirrorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppResponse> {
        if self.db_name.trim().is_empty() {
            return Err(AppResponse::ValidationError("db_name cannot be empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(AppResponse::ValidationError("collection cannot be empty".to_string()));
        }
        if self.map_size == 0 {
            return Err(AppResponse::ValidationError("map_size must be greater than zero".to_string()));
        }
        if self.max_dbs == 0 {
            return Err(AppResponse::ValidationError("max_dbs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn lmdb_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}.lmdb", self.db_name))
    }
}
