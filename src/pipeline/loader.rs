use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::cache::memory::CacheListener;
use crate::core::map::Map;
use crate::core::tile::{Tile, TileKey};
use crate::pipeline::fetch::TileFetcher;
use crate::prelude::HashSet;
use crate::store::disk::{RowKey, TileStore};

/// Terminal outcome of one load order. At most one event is ever delivered
/// per order; cancelled orders deliver none.
#[derive(Debug, Clone)]
pub enum TileEvent {
    /// The tile resolved, from the store or the network, and now carries its
    /// decoded image.
    Loaded(Tile),
    /// The network stage gave up on the tile. No retry is scheduled; the tile
    /// is fetched again on its next cache miss.
    Failed { key: TileKey, reason: String },
}

/// State shared between the caller-facing handle and both stage workers.
#[derive(Clone)]
struct StageShared {
    map: Arc<Map>,
    store: Arc<TileStore>,
    event_tx: Sender<TileEvent>,
    /// Keys with an outstanding order, in either queue or mid-service.
    /// Guarantees at most one outstanding fetch per tile.
    pending: Arc<Mutex<HashSet<TileKey>>>,
    /// Keys whose queued order should be discarded at dequeue.
    cancelled: Arc<Mutex<HashSet<TileKey>>>,
    stopping: Arc<AtomicBool>,
}

impl StageShared {
    /// True if the key was cancelled while queued; consumes the cancellation
    /// and retires the order without an event.
    fn consume_cancel(&self, key: TileKey) -> bool {
        let was_cancelled = self
            .cancelled
            .lock()
            .map(|mut c| c.remove(&key))
            .unwrap_or(false);
        if was_cancelled {
            self.retire(key);
            log::debug!("dropped cancelled order for {}", key);
        }
        was_cancelled
    }

    fn retire(&self, key: TileKey) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&key);
        }
    }

    fn row_key(&self, key: TileKey) -> Option<RowKey> {
        let layer = self.map.layer(key.layer)?;
        Some(RowKey::new(self.map.name(), layer.name.as_str(), key.x, key.y))
    }

    fn emit_loaded(&self, key: TileKey, image: image::DynamicImage) {
        self.retire(key);
        let _ = self.event_tx.send(TileEvent::Loaded(Tile::with_image(key, image)));
    }

    fn emit_failed(&self, key: TileKey, reason: String) {
        self.retire(key);
        let _ = self.event_tx.send(TileEvent::Failed { key, reason });
    }
}

/// Two-stage concurrent load pipeline.
///
/// One worker thread per stage, each blocking on a FIFO channel: the store
/// stage resolves orders against the persistent store and forwards misses to
/// the network stage, which fetches, decodes, and writes back. Completions
/// are reported over an event channel the caller polls on its own execution
/// context. All blocking I/O happens inside the workers; the caller-facing
/// operations only touch small structures under short-held locks.
pub struct TileLoader {
    store_tx: Mutex<Option<Sender<TileKey>>>,
    event_rx: Receiver<TileEvent>,
    shared: StageShared,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TileLoader {
    pub fn new(map: Arc<Map>, store: Arc<TileStore>, fetcher: Arc<dyn TileFetcher>) -> Self {
        let (store_tx, store_rx) = unbounded::<TileKey>();
        let (net_tx, net_rx) = unbounded::<TileKey>();
        let (event_tx, event_rx) = unbounded();

        let shared = StageShared {
            map,
            store,
            event_tx,
            pending: Arc::new(Mutex::new(HashSet::default())),
            cancelled: Arc::new(Mutex::new(HashSet::default())),
            stopping: Arc::new(AtomicBool::new(false)),
        };

        let store_shared = shared.clone();
        let store_worker = thread::spawn(move || run_store_stage(store_shared, store_rx, net_tx));

        let net_shared = shared.clone();
        let net_worker = thread::spawn(move || run_network_stage(net_shared, net_rx, fetcher));

        Self {
            store_tx: Mutex::new(Some(store_tx)),
            event_rx,
            shared,
            workers: Mutex::new(vec![store_worker, net_worker]),
        }
    }

    /// Request resolution of a tile's image. Deduplicated: a key that already
    /// has an outstanding order is not enqueued again, though a pending
    /// cancellation for it is revoked so the queued order runs after all.
    pub fn order_load(&self, key: TileKey) {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return;
        }

        let newly_pending = self
            .shared
            .pending
            .lock()
            .map(|mut pending| pending.insert(key))
            .unwrap_or(false);

        if let Ok(mut cancelled) = self.shared.cancelled.lock() {
            cancelled.remove(&key);
        }

        if !newly_pending {
            return;
        }

        if let Ok(tx) = self.store_tx.lock() {
            if let Some(tx) = tx.as_ref() {
                let _ = tx.send(key);
            }
        }
    }

    /// Withdraw a queued order. Idempotent; a no-op for keys with no
    /// outstanding order or already dispatched to a worker. An HTTP request
    /// already in flight is not aborted, so its result may still arrive.
    pub fn cancel(&self, key: TileKey) {
        let is_pending = self
            .shared
            .pending
            .lock()
            .map(|pending| pending.contains(&key))
            .unwrap_or(false);
        if !is_pending {
            return;
        }
        if let Ok(mut cancelled) = self.shared.cancelled.lock() {
            cancelled.insert(key);
        }
    }

    /// Completion event channel, for callers that block or select on it.
    pub fn events(&self) -> &Receiver<TileEvent> {
        &self.event_rx
    }

    /// Drain all completion events delivered so far (non-blocking).
    pub fn poll_events(&self) -> Vec<TileEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Number of orders currently outstanding.
    pub fn pending_count(&self) -> usize {
        self.shared
            .pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    /// Shut the pipeline down: workers finish the order they are servicing,
    /// skip the rest, and exit. Queues and undelivered events are cleared.
    /// No events are delivered after this returns.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);

        // Disconnect the store stage; worker exit cascades to the network
        // stage when the forwarding sender drops.
        if let Ok(mut tx) = self.store_tx.lock() {
            tx.take();
        }

        if let Ok(mut workers) = self.workers.lock() {
            for worker in workers.drain(..) {
                let _ = worker.join();
            }
        }

        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.clear();
        }
        if let Ok(mut cancelled) = self.shared.cancelled.lock() {
            cancelled.clear();
        }
        while self.event_rx.try_recv().is_ok() {}

        log::debug!("tile loader stopped");
    }
}

impl CacheListener for TileLoader {
    fn order_load(&self, tile: &Tile) {
        TileLoader::order_load(self, tile.key());
    }

    fn cancel_load(&self, key: TileKey) {
        TileLoader::cancel(self, key);
    }
}

/// Store stage: resolve orders against the persistent store, forward misses.
fn run_store_stage(shared: StageShared, rx: Receiver<TileKey>, net_tx: Sender<TileKey>) {
    log::debug!("store stage worker started");

    while let Ok(key) = rx.recv() {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        if shared.consume_cancel(key) {
            continue;
        }

        let Some(row) = shared.row_key(key) else {
            shared.emit_failed(key, format!("no such layer {}", key.layer));
            continue;
        };

        match shared.store.read(&row) {
            Some((bytes, _last_used)) => match image::load_from_memory(&bytes) {
                Ok(image) => {
                    shared.store.touch(&row);
                    log::debug!("tile {} loaded from store", key);
                    shared.emit_loaded(key, image);
                }
                Err(e) => {
                    // Corrupt row: fall through to the network
                    log::warn!("stored tile {} undecodable: {}", key, e);
                    let _ = net_tx.send(key);
                }
            },
            None => {
                let _ = net_tx.send(key);
            }
        }
    }

    log::debug!("store stage worker exiting");
}

/// Network stage: fetch, decode, report, and write back to the store.
fn run_network_stage(shared: StageShared, rx: Receiver<TileKey>, fetcher: Arc<dyn TileFetcher>) {
    log::debug!("network stage worker started");

    while let Ok(key) = rx.recv() {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        if shared.consume_cancel(key) {
            continue;
        }

        let Some(layer) = shared.map.layer(key.layer) else {
            shared.emit_failed(key, format!("no such layer {}", key.layer));
            continue;
        };
        let url = layer.url_for(key.x, key.y);

        let fetched = fetcher
            .fetch(&url)
            .and_then(|bytes| Ok((image::load_from_memory(&bytes)?, bytes)));

        match fetched {
            Ok((image, bytes)) => {
                log::debug!("tile {} loaded from {}", key, url);
                shared.emit_loaded(key, image);
                if let Some(row) = shared.row_key(key) {
                    shared.store.write(&row, &bytes);
                }
            }
            Err(e) => {
                log::warn!("tile {} fetch failed: {}", key, e);
                shared.emit_failed(key, e.to_string());
            }
        }
    }

    log::debug!("network stage worker exiting");
}
