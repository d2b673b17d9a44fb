use serde::{Deserialize, Serialize};

use super::layer::Layer;
use crate::Result;

/// A coordinate system / tile set: a stable name plus an ordered sequence of
/// zoom layers (index 0 is the coarsest). Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    name: String,
    layers: Vec<Layer>,
}

impl Map {
    pub fn new(name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            layers,
        }
    }

    /// Parse a map definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
