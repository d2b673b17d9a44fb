use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::memory::TileCache;
use crate::core::config::EngineConfig;
use crate::core::map::Map;
use crate::core::tile::Tile;
use crate::pipeline::fetch::{HttpFetcher, TileFetcher};
use crate::pipeline::loader::{TileEvent, TileLoader};
use crate::store::disk::TileStore;
use crate::Result;

/// Facade over the tile acquisition subsystem: wires the persistent store,
/// the load pipeline and the in-memory cache for one map and one screen
/// geometry. If display geometry changes, tear the engine down and build a
/// new one.
///
/// The display layer calls [`get_tile`](Self::get_tile) during drawing and
/// [`poll_events`](Self::poll_events) on its own execution context; a
/// returned event means a tile became displayable (or definitively failed)
/// and a redraw may be due. The engine never touches display state.
pub struct TileEngine {
    map: Arc<Map>,
    store: Arc<TileStore>,
    loader: Arc<TileLoader>,
    cache: TileCache,
}

impl TileEngine {
    /// Build an engine fetching over HTTP, with its persistent store rooted
    /// at `store_root`.
    pub fn new(map: Map, store_root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.network));
        Self::with_fetcher(map, store_root, config, fetcher)
    }

    /// Build an engine with a custom fetcher (tests use a synchronous fake).
    pub fn with_fetcher(
        map: Map,
        store_root: impl Into<PathBuf>,
        config: EngineConfig,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Result<Self> {
        let map = Arc::new(map);
        let store = Arc::new(TileStore::open(store_root, config.store.clone())?);
        let loader = Arc::new(TileLoader::new(map.clone(), store.clone(), fetcher));
        let cache = TileCache::new(map.clone(), &config.cache, loader.clone());

        Ok(Self {
            map,
            store,
            loader,
            cache,
        })
    }

    /// Displayable tile at (layer, x, y), or `None` if the coordinate is
    /// outside the layer. May order a background load; an imageless return
    /// means "still loading". Never blocks.
    pub fn get_tile(&self, layer: usize, x: u32, y: u32) -> Option<Tile> {
        self.cache.get(layer, x, y)
    }

    /// Bulk prefetch hint. Coordinates already cached or out of bounds are
    /// silently skipped.
    pub fn preload_region(&self, layer: usize, xs: Range<u32>, ys: Range<u32>) {
        for y in ys {
            for x in xs.clone() {
                let _ = self.cache.get(layer, x, y);
            }
        }
    }

    /// Drain completion events, installing loaded tiles into the cache (the
    /// recheck-key guard drops results superseded by panning). The caller
    /// schedules redraws from the returned events.
    pub fn poll_events(&self) -> Vec<TileEvent> {
        let events = self.loader.poll_events();
        for event in &events {
            if let TileEvent::Loaded(tile) = event {
                self.cache.install(tile.clone());
            }
        }
        events
    }

    /// The pipeline's completion channel, for callers that integrate it into
    /// their own event loop. Tiles received here still need
    /// [`install`](Self::install).
    pub fn events(&self) -> &crossbeam_channel::Receiver<TileEvent> {
        self.loader.events()
    }

    /// Install a resolved tile into its cache slot (recheck-key guarded).
    pub fn install(&self, tile: Tile) {
        self.cache.install(tile);
    }

    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    /// Shut down the pipeline. Idempotent; no events are delivered after
    /// this returns.
    pub fn stop(&self) {
        self.loader.stop();
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tile::TileKey;
    use crate::store::disk::RowKey;
    use crate::testutil::{png_tile, test_map_with_layers, MockFetcher};
    use image::GenericImageView;
    use std::time::{Duration, Instant};

    fn engine_with(fetcher: Arc<MockFetcher>, dir: &mktemp::Temp) -> TileEngine {
        TileEngine::with_fetcher(
            test_map_with_layers(3),
            dir.to_path_buf(),
            EngineConfig::for_testing(),
            fetcher,
        )
        .unwrap()
    }

    /// Poll until at least one event arrives or the deadline passes.
    fn wait_events(engine: &TileEngine) -> Vec<TileEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let events = engine.poll_events();
            if !events.is_empty() {
                return events;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no event within timeout");
    }

    #[test]
    fn empty_store_resolves_over_network_once() {
        let dir = mktemp::Temp::new_dir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let engine = engine_with(fetcher.clone(), &dir);
        let url = engine.map().layer(2).unwrap().url_for(5, 5);
        fetcher.respond(&url, png_tile(256, 256));

        let tile = engine.get_tile(2, 5, 5).unwrap();
        assert!(tile.is_loading());

        let events = wait_events(&engine);
        assert_eq!(events.len(), 1);
        match &events[0] {
            TileEvent::Loaded(loaded) => {
                assert_eq!(loaded.key(), TileKey::new(2, 5, 5));
                let image = loaded.image().unwrap();
                assert_eq!(image.width(), 256);
                assert_eq!(image.height(), 256);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(fetcher.calls(), vec![url]);

        // The write-back lands just after the event on the worker thread
        let row = RowKey::new("test-map", "l2", 5, 5);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !engine.store().exists(&row) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.store().exists(&row));

        // The event loop installed the tile; the next get is a resolved hit
        assert!(!engine.get_tile(2, 5, 5).unwrap().is_loading());
        engine.stop();
    }

    #[test]
    fn rapid_duplicate_get_fetches_once() {
        let dir = mktemp::Temp::new_dir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let engine = engine_with(fetcher.clone(), &dir);
        let url = engine.map().layer(1).unwrap().url_for(3, 4);
        fetcher.respond(&url, png_tile(256, 256));

        let first = engine.get_tile(1, 3, 4).unwrap();
        let second = engine.get_tile(1, 3, 4).unwrap();
        assert!(first.is_loading());
        assert_eq!(first.key(), second.key());

        let events = wait_events(&engine);
        assert_eq!(events.len(), 1);
        assert_eq!(fetcher.calls().len(), 1);
        engine.stop();
    }

    #[test]
    fn prepopulated_store_never_touches_the_network() {
        let dir = mktemp::Temp::new_dir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let engine = engine_with(fetcher.clone(), &dir);
        engine
            .store()
            .write(&RowKey::new("test-map", "l0", 2, 2), &png_tile(256, 256));

        engine.get_tile(0, 2, 2).unwrap();

        let events = wait_events(&engine);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TileEvent::Loaded(_)));
        assert!(fetcher.calls().is_empty());
        engine.stop();
    }

    #[test]
    fn failed_fetch_degrades_to_tile_not_available() {
        let dir = mktemp::Temp::new_dir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let engine = engine_with(fetcher.clone(), &dir);

        // No response registered: the mock answers 404
        engine.get_tile(0, 1, 1).unwrap();

        let events = wait_events(&engine);
        assert!(matches!(events[0], TileEvent::Failed { .. }));

        // The slot still holds the imageless tile; the subsystem stays usable
        assert!(engine.get_tile(0, 1, 1).unwrap().is_loading());
        engine.stop();
    }

    #[test]
    fn preload_region_skips_out_of_bounds_silently() {
        let dir = mktemp::Temp::new_dir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let engine = engine_with(fetcher.clone(), &dir);
        let layer = engine.map().layer(0).unwrap().clone();
        for x in 14..16 {
            for y in 0..2 {
                fetcher.respond(&layer.url_for(x, y), png_tile(256, 256));
            }
        }

        // Ranges straddle the 16-tile grid edge
        engine.preload_region(0, 14..20, 0..2);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = 0;
        while loaded < 4 && Instant::now() < deadline {
            loaded += engine.poll_events().len();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loaded, 4);
        assert_eq!(fetcher.calls().len(), 4);
        engine.stop();
    }
}
