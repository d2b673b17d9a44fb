//! Prelude module for common tilekeep types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use tilekeep::prelude::*;`

pub use crate::core::{
    config::{CacheConfig, EngineConfig, NetworkConfig, StoreConfig},
    layer::Layer,
    map::Map,
    tile::{Tile, TileKey},
};

pub use crate::cache::memory::{CacheListener, TileCache};
pub use crate::engine::TileEngine;
pub use crate::pipeline::{
    fetch::{HttpFetcher, TileFetcher},
    loader::{TileEvent, TileLoader},
};
pub use crate::store::disk::{RowKey, TileStore};

pub use crate::{Error as TileError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
