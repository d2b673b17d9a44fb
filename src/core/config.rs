//! Engine configuration: cache sizing, store budget and network tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`TileEngine`](crate::engine::TileEngine).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub network: NetworkConfig,
}

impl EngineConfig {
    pub fn for_testing() -> Self {
        Self {
            cache: CacheConfig::default(),
            store: StoreConfig::for_testing(),
            network: NetworkConfig {
                timeout: Duration::from_millis(500),
                ..NetworkConfig::default()
            },
        }
    }
}

/// In-memory cache sizing. Each layer's slot array is sized to cover one
/// screen of tiles at that layer's minimum scale plus a preload margin,
/// clamped to the layer's actual grid extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Screen width in pixels.
    pub screen_size_x: u32,
    /// Screen height in pixels.
    pub screen_size_y: u32,
    /// Extra rings of tiles kept around the visible screen.
    pub preload_margin: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            screen_size_x: 1080,
            screen_size_y: 1920,
            preload_margin: 1,
        }
    }
}

/// Persistent store bounds and write-amplification control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of tile rows kept on disk.
    pub max_rows: usize,
    /// Upper bound on rows removed per eviction batch.
    pub evict_chunk: usize,
    /// Minimum staleness before a read rewrites a row's last-used timestamp.
    pub touch_threshold: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_rows: 800,
            evict_chunk: 10,
            touch_threshold: Duration::from_secs(10 * 60),
        }
    }
}

impl StoreConfig {
    pub fn for_testing() -> Self {
        Self {
            max_rows: 8,
            evict_chunk: 2,
            touch_threshold: Duration::ZERO,
        }
    }
}

/// Remote tile server access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Referer header required by the tile server.
    pub referer: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            referer: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}
