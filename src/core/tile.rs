use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

/// Stable identity of a tile within one map: zoom layer index plus grid
/// coordinate. Two tiles with equal keys are logically the same tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub layer: usize,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(layer: usize, x: u32, y: u32) -> Self {
        Self { layer, x, y }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer={} x={} y={}", self.layer, self.x, self.y)
    }
}

/// One image cell of the map. The tile is an immutable value: an imageless
/// tile *is* the loading state, and a completed load produces a new tile
/// carrying the decoded image, installed over the placeholder by the cache.
#[derive(Debug, Clone)]
pub struct Tile {
    key: TileKey,
    image: Option<Arc<DynamicImage>>,
}

impl Tile {
    /// A placeholder tile whose image has not arrived yet.
    pub fn pending(key: TileKey) -> Self {
        Self { key, image: None }
    }

    /// A fully formed tile carrying its decoded image.
    pub fn with_image(key: TileKey, image: DynamicImage) -> Self {
        Self {
            key,
            image: Some(Arc::new(image)),
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn image(&self) -> Option<&Arc<DynamicImage>> {
        self.image.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.image.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_absence_is_loading_state() {
        let key = TileKey::new(1, 4, 9);
        let tile = Tile::pending(key);
        assert!(tile.is_loading());
        assert!(tile.image().is_none());

        let loaded = Tile::with_image(key, DynamicImage::new_rgba8(4, 4));
        assert!(!loaded.is_loading());
        assert_eq!(loaded.key(), key);
    }
}
