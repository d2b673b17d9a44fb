use serde::{Deserialize, Serialize};

/// One zoom level of a [`Map`](super::map::Map): the tile grid geometry, the
/// scale range at which the layer should be displayed, and the remote
/// addressing scheme for fetching its tiles.
///
/// The address-space bounds (`left`/`top`/`right`/`bottom`) describe how the
/// zero-based grid maps onto the remote tile numbering, which may run in
/// increasing or decreasing order per axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Stable layer identifier, also the key used by the persistent store.
    pub name: String,
    /// Layer name as it appears in the remote URL.
    pub url_name: String,
    /// URL template with `{layer}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    pub tile_size_x: u32,
    pub tile_size_y: u32,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Smallest display scale at which this layer is still shown; also drives
    /// the in-memory cache sizing (one screen at max zoom-out stays resident).
    pub min_scale: f32,
    pub max_scale: f32,
    /// Ground resolution, used for scale-ratio computation across layers.
    pub meters_per_pixel: f32,
}

impl Layer {
    /// Grid width in tiles: `|right - left| + 1`.
    pub fn size_x(&self) -> u32 {
        (self.right - self.left).unsigned_abs() + 1
    }

    /// Grid height in tiles: `|top - bottom| + 1`.
    pub fn size_y(&self) -> u32 {
        (self.top - self.bottom).unsigned_abs() + 1
    }

    /// Whether (x, y) is a valid grid coordinate for this layer.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.size_x() && y < self.size_y()
    }

    /// Grid x transformed into the remote addressing direction.
    pub fn url_x(&self, x: u32) -> i32 {
        if self.left < self.right {
            self.left + x as i32
        } else {
            self.left - x as i32
        }
    }

    /// Grid y transformed into the remote addressing direction.
    pub fn url_y(&self, y: u32) -> i32 {
        if self.top < self.bottom {
            self.top + y as i32
        } else {
            self.top - y as i32
        }
    }

    /// Remote fetch address for the tile at (x, y).
    pub fn url_for(&self, x: u32, y: u32) -> String {
        self.url_template
            .replace("{layer}", &self.url_name)
            .replace("{x}", &self.url_x(x).to_string())
            .replace("{y}", &self.url_y(y).to_string())
    }
}
