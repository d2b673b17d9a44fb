//! Durable on-disk tile store with a bounded row budget and LRU eviction.

pub mod disk;

pub use disk::{RowKey, TileStore};
