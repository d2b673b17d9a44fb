//! # Tilekeep
//!
//! Tile acquisition and caching engine for pannable/zoomable raster maps.
//!
//! The engine resolves square map tiles, addressed by (layer, x, y) within a
//! [`Map`](core::map::Map), through three levels: a fixed-capacity in-memory
//! slot cache, a durable on-disk store with LRU eviction, and a remote tile
//! server. Lookups never block the caller; misses are resolved by a two-stage
//! background pipeline that reports completions asynchronously.

pub mod cache;
pub mod core;
pub mod engine;
pub mod pipeline;
pub mod prelude;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export public API
pub use crate::core::{
    config::{CacheConfig, EngineConfig, NetworkConfig, StoreConfig},
    layer::Layer,
    map::Map,
    tile::{Tile, TileKey},
};

pub use cache::memory::{CacheListener, TileCache};
pub use engine::TileEngine;
pub use pipeline::{
    fetch::{HttpFetcher, TileFetcher},
    loader::{TileEvent, TileLoader},
};
pub use store::disk::{RowKey, TileStore};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid layer index: {0}")]
    InvalidLayer(usize),
}

/// Error type alias for convenience
pub type Error = TileError;
