//! Two-stage tile load pipeline: store lookup, then network fetch.

pub mod fetch;
pub mod loader;

pub use fetch::{HttpFetcher, TileFetcher};
pub use loader::{TileEvent, TileLoader};
