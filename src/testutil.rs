//! Shared helpers for unit tests: a deterministic fetcher and map fixtures.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::layer::Layer;
use crate::core::map::Map;
use crate::pipeline::fetch::TileFetcher;
use crate::{Result, TileError};

/// A single-layer 16x16 map with increasing addressing on both axes.
pub(crate) fn test_map() -> Map {
    test_map_with_layers(1)
}

pub(crate) fn test_map_with_layers(count: usize) -> Map {
    let layers = (0..count)
        .map(|i| Layer {
            name: format!("l{}", i),
            url_name: format!("base{}", i),
            url_template: "http://tiles.test/{layer}/{x}/{y}.png".into(),
            tile_size_x: 256,
            tile_size_y: 256,
            left: 0,
            top: 0,
            right: 15,
            bottom: 15,
            min_scale: 1.0,
            max_scale: 4.0,
            meters_per_pixel: 2.5 / (i as f32 + 1.0),
        })
        .collect();
    Map::new("test-map", layers)
}

/// Encoded PNG of the requested dimensions.
pub(crate) fn png_tile(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
    bytes
}

/// Synchronous fake fetcher. Unknown URLs answer 404; known URLs return the
/// registered bytes. A URL can additionally be gated so its fetch blocks
/// until the test releases it, which pins down worker interleavings.
pub(crate) struct MockFetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Receiver<()>>>,
    releases: Mutex<HashMap<String, Sender<()>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            releases: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(&self, url: &str, bytes: Vec<u8>) {
        self.responses.lock().unwrap().insert(url.into(), bytes);
    }

    /// Make the next fetch of `url` block until [`release`](Self::release).
    pub fn gate(&self, url: &str) {
        let (tx, rx) = unbounded();
        self.gates.lock().unwrap().insert(url.into(), rx);
        self.releases.lock().unwrap().insert(url.into(), tx);
    }

    pub fn release(&self, url: &str) {
        if let Some(tx) = self.releases.lock().unwrap().get(url) {
            let _ = tx.send(());
        }
    }

    /// Spin until the fetcher has been asked for `url`.
    pub fn wait_for_call(&self, url: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.calls.lock().unwrap().iter().any(|c| c == url) {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("no fetch of {} within timeout", url);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TileFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        match self.responses.lock().unwrap().get(url) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(TileError::Status(reqwest::StatusCode::NOT_FOUND)),
        }
    }
}
