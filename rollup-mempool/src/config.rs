//! Configuration for the admission core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Mempool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// System gas-fee recipient; every transaction must name this account
    pub gas_account_index: i64,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Resource lock configuration
    pub lock: LockConfig,

    /// Overlay cache configuration
    pub cache: CacheConfig,

    /// Failed-transaction recorder configuration
    pub fail_recorder: FailRecorderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/mempool"),
            service_name: "rollup-mempool".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            gas_account_index: 1,
            rocksdb: RocksDBConfig::default(),
            lock: LockConfig::default(),
            cache: CacheConfig::default(),
            fail_recorder: FailRecorderConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,       // 64 MB
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Resource lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Bounded wait for acquiring all locks of one submission (milliseconds)
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 3_000,
        }
    }
}

impl LockConfig {
    /// Acquire timeout as a duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Overlay cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Account overlay TTL (milliseconds)
    pub account_ttl_ms: u64,

    /// Liquidity overlay TTL (milliseconds)
    pub liquidity_ttl_ms: u64,

    /// NFT overlay TTL (milliseconds)
    pub nft_ttl_ms: u64,

    /// Entries kept before expired ones are swept
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            account_ttl_ms: 10_000,
            liquidity_ttl_ms: 10_000,
            nft_ttl_ms: 10_000,
            max_entries: 100_000,
        }
    }
}

/// Failed-transaction recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailRecorderConfig {
    /// Bounded mailbox capacity; records beyond it are dropped and logged
    pub mailbox_capacity: usize,
}

impl Default for FailRecorderConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("MEMPOOL_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(index) = std::env::var("MEMPOOL_GAS_ACCOUNT_INDEX") {
            config.gas_account_index = index
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid gas account index: {}", e)))?;
        }

        if let Ok(timeout) = std::env::var("MEMPOOL_LOCK_TIMEOUT_MS") {
            config.lock.acquire_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid lock timeout: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "rollup-mempool");
        assert_eq!(config.lock.acquire_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache.account_ttl_ms, 10_000);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mempool.toml");
        let mut config = Config::default();
        config.gas_account_index = 42;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.gas_account_index, 42);
        assert_eq!(loaded.fail_recorder.mailbox_capacity, 1_000);
    }
}
