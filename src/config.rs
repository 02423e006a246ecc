//! Configuration.
//!
//! # Example
//!
//! ```
//! use redsqrl_om::OmConfig;
//!
//! // Minimal config (uses defaults)
//! let config = OmConfig::default();
//! assert_eq!(config.page_size, 1000);
//!
//! // Full config
//! let config = OmConfig {
//!     redis_url: "redis://localhost:6379".into(),
//!     key_prefix: Some("redsqrl:".into()),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the mapper and both migrators.
///
/// All fields have sensible defaults; production deployments usually set
/// `redis_url` and `key_prefix`.
#[derive(Debug, Clone, Deserialize)]
pub struct OmConfig {
    /// Redis connection string (e.g. "redis://localhost:6379/0").
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Global key prefix applied to every key, for namespacing a shared
    /// instance (e.g. "redsqrl:").
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Directory where migration snapshot files are written and
    /// user-authored migrations are discovered.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Search pagination page size.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Record-transform batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Persist a migration checkpoint every N processed keys.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_migrations_dir() -> String {
    "migrations".to_string()
}
fn default_page_size() -> u64 {
    1000
}
fn default_batch_size() -> usize {
    500
}
fn default_checkpoint_every() -> usize {
    100
}

impl Default for OmConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: None,
            migrations_dir: default_migrations_dir(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

impl OmConfig {
    /// Build from the environment: `REDIS_OM_URL` selects the store,
    /// `REDIS_OM_MIGRATIONS_DIR` the migrations root. Unset variables
    /// fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDIS_OM_URL") {
            if !url.is_empty() {
                config.redis_url = url;
            }
        }
        if let Ok(dir) = std::env::var("REDIS_OM_MIGRATIONS_DIR") {
            if !dir.is_empty() {
                config.migrations_dir = dir;
            }
        }
        config
    }
}
