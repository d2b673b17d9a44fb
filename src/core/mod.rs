//! Core data model: maps, zoom layers, tiles and engine configuration.

pub mod config;
pub mod layer;
pub mod map;
pub mod tile;
