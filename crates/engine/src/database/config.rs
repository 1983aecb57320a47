//! Database configuration via `docbase.toml`
//!
//! A single TOML file holds the documents collection path, the connection pool
//! bounds and the lock acquisition timeout. Every field has a default, so an
//! empty file (or no file at all) yields a working configuration. To change
//! settings, edit the file and restart.

use docbase_concurrency::PoolConfig;
use docbase_core::{CollectionPath, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error as ThisError;

/// Config file name looked up by [`DatabaseConfig::load_or_default`]
pub const CONFIG_FILE_NAME: &str = "docbase.toml";

/// Collection the document service keeps its documents in
pub const DEFAULT_DOCUMENTS_COLLECTION: &str = "/db/dasp-documents";

/// Errors from loading or validating a configuration
#[derive(Debug, ThisError)]
pub enum ConfigError {
    /// The config file could not be read or written
    #[error("config file '{}': {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config text is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::initialization(e.to_string())
    }
}

/// `[pool]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Connections created at start-up
    pub min_connections: usize,
    /// Upper bound on connections
    pub max_connections: usize,
    /// How long a borrower waits for a free connection
    pub borrow_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 20,
            borrow_timeout_ms: 30_000,
        }
    }
}

/// `[locks]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSection {
    /// How long a lock request waits before failing
    pub timeout_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Database configuration loaded from `docbase.toml`
///
/// # Example
///
/// ```toml
/// documents_collection = "/db/dasp-documents"
///
/// [pool]
/// min_connections = 1
/// max_connections = 20
/// borrow_timeout_ms = 30000
///
/// [locks]
/// timeout_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the collection documents are kept in
    pub documents_collection: String,
    /// Connection pool bounds
    pub pool: PoolSection,
    /// Lock acquisition
    pub locks: LockSection,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            documents_collection: DEFAULT_DOCUMENTS_COLLECTION.to_string(),
            pool: PoolSection::default(),
            locks: LockSection::default(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# docbase configuration

# Collection the document service stores documents in
documents_collection = "/db/dasp-documents"

[pool]
# Connections opened at start-up
min_connections = 1
# Connections never exceed this bound; borrowers wait for a free one
max_connections = 20
# How long a borrower waits before failing (milliseconds)
borrow_timeout_ms = 30000

[locks]
# How long a collection or document lock request waits (milliseconds)
timeout_ms = 10000
"#
    }

    /// Parse and validate config text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DatabaseConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `dir/docbase.toml`, or the defaults if the file does not exist
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        CollectionPath::parse(&self.documents_collection).map_err(|e| {
            ConfigError::Invalid(format!(
                "documents_collection '{}': {}",
                self.documents_collection, e
            ))
        })?;
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Invalid(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        if self.locks.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "locks.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The documents collection as a parsed path
    pub fn documents_collection_path(&self) -> Result<CollectionPath, ConfigError> {
        CollectionPath::parse(&self.documents_collection)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Pool settings in the pool's own terms
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_connections: self.pool.min_connections,
            max_connections: self.pool.max_connections,
            borrow_timeout: Duration::from_millis(self.pool.borrow_timeout_ms),
        }
    }

    /// Lock acquisition timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.locks.timeout_ms)
    }
}
