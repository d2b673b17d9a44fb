use std::sync::{Arc, Mutex};

use crate::core::config::CacheConfig;
use crate::core::map::Map;
use crate::core::tile::{Tile, TileKey};

/// Receiver of the cache's load and cancel orders, registered at
/// construction. [`TileLoader`](crate::pipeline::loader::TileLoader)
/// implements this; tests register a recording fake.
pub trait CacheListener: Send + Sync {
    fn order_load(&self, tile: &Tile);
    fn cancel_load(&self, key: TileKey);
}

/// One layer's slot array. A tile for grid coordinate (x, y) lives in slot
/// `(x % size_x, y % size_y)`; the array doubles as the occupancy map, with
/// collisions evicting the previous occupant.
#[derive(Debug)]
struct LayerSlots {
    size_x: usize,
    size_y: usize,
    slots: Vec<Option<Tile>>,
}

impl LayerSlots {
    fn new(size_x: usize, size_y: usize) -> Self {
        Self {
            size_x,
            size_y,
            slots: (0..size_x * size_y).map(|_| None).collect(),
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize % self.size_y) * self.size_x + (x as usize % self.size_x)
    }
}

/// The single authority the viewport consults for a displayable tile, and
/// the dispatcher of load/cancel orders to the pipeline.
///
/// Capacity is per layer: enough slots to keep one screen of tiles resident
/// at the layer's minimum scale plus a preload margin, clamped to the layer's
/// grid extent. All slot access is serialized under one lock; the
/// recheck-key-before-install rule resolves delivery races there.
pub struct TileCache {
    map: Arc<Map>,
    listener: Arc<dyn CacheListener>,
    layers: Mutex<Vec<LayerSlots>>,
}

impl TileCache {
    pub fn new(map: Arc<Map>, config: &CacheConfig, listener: Arc<dyn CacheListener>) -> Self {
        let layers = map
            .layers()
            .iter()
            .map(|layer| {
                let size_x = slot_count(
                    config.screen_size_x,
                    layer.tile_size_x,
                    layer.min_scale,
                    config.preload_margin,
                )
                .min(layer.size_x() as usize);
                let size_y = slot_count(
                    config.screen_size_y,
                    layer.tile_size_y,
                    layer.min_scale,
                    config.preload_margin,
                )
                .min(layer.size_y() as usize);

                log::debug!(
                    "cache for map={} layer={}: {}x{} slots",
                    map.name(),
                    layer.name,
                    size_x,
                    size_y
                );
                LayerSlots::new(size_x.max(1), size_y.max(1))
            })
            .collect();

        Self {
            map,
            listener,
            layers: Mutex::new(layers),
        }
    }

    /// Look up the tile at (layer, x, y), ordering a load on a miss.
    ///
    /// Out-of-bounds coordinates return `None` with no order. A returned tile
    /// may still be imageless; that is the loading state, and the caller will
    /// be notified through the pipeline's events when it resolves. A slot
    /// collision evicts the previous occupant, cancelling its load if it was
    /// still in flight.
    pub fn get(&self, layer: usize, x: u32, y: u32) -> Option<Tile> {
        if !self.map.layer(layer)?.contains(x, y) {
            return None;
        }

        let mut layers = self.layers.lock().ok()?;
        let slots = &mut layers[layer];
        let index = slots.index(x, y);

        if let Some(occupant) = &slots.slots[index] {
            let key = occupant.key();
            if key.x == x && key.y == y {
                return Some(occupant.clone());
            }
            if occupant.is_loading() {
                self.listener.cancel_load(key);
            }
        }

        let tile = Tile::pending(TileKey::new(layer, x, y));
        slots.slots[index] = Some(tile.clone());
        self.listener.order_load(&tile);
        Some(tile)
    }

    /// Install a resolved tile into its slot, but only if the slot's current
    /// occupant still has the same key. A result for a tile that was evicted
    /// by panning in the meantime is silently discarded.
    pub fn install(&self, tile: Tile) {
        let key = tile.key();
        let Ok(mut layers) = self.layers.lock() else {
            return;
        };
        let Some(slots) = layers.get_mut(key.layer) else {
            return;
        };
        let index = slots.index(key.x, key.y);

        match &slots.slots[index] {
            Some(occupant) if occupant.key() == key => {
                slots.slots[index] = Some(tile);
            }
            _ => log::debug!("discarding stale delivery for {}", key),
        }
    }

    /// Slot array dimensions for a layer, mainly for diagnostics.
    pub fn slot_dims(&self, layer: usize) -> Option<(usize, usize)> {
        let layers = self.layers.lock().ok()?;
        layers.get(layer).map(|s| (s.size_x, s.size_y))
    }
}

/// Tiles needed to span `screen` pixels at the layer's most zoomed-out scale,
/// plus a preload ring on both sides and one tile of slack for partial
/// overlap at the edges.
fn slot_count(screen: u32, tile_size: u32, min_scale: f32, margin: u32) -> usize {
    ((1.0 / min_scale) * screen as f32 / tile_size as f32) as usize + 2 * margin as usize + 1
}
