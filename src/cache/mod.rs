//! Fixed-capacity in-memory tile cache with modulo slot addressing.

pub mod memory;

pub use memory::{CacheListener, TileCache};
