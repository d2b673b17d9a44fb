use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::config::StoreConfig;
use crate::prelude::HashMap;

const INDEX_FILE: &str = "index.bin";

/// Primary key of one persisted tile row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub map: String,
    pub layer: String,
    pub x: u32,
    pub y: u32,
}

impl RowKey {
    pub fn new(map: impl Into<String>, layer: impl Into<String>, x: u32, y: u32) -> Self {
        Self {
            map: map.into(),
            layer: layer.into(),
            x,
            y,
        }
    }
}

/// Per-row bookkeeping kept in the index file. `seq` breaks last-used ties in
/// insertion order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RowMeta {
    last_used: u64,
    seq: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    rows: HashMap<RowKey, RowMeta>,
    next_seq: u64,
}

/// Durable, bounded cache of encoded tile images keyed by (map, layer, x, y).
///
/// Each row is a blob file under `<root>/<map>/<layer>/<x>_<y>.img`; last-used
/// timestamps and the row count live in a compact index file beside them.
/// When an insert would exceed the row budget, the least-recently-used rows
/// are deleted in batches before the new row goes in.
///
/// The store is an optimization, never a source of truth: every read error
/// degrades to a miss and every write error to a no-op.
#[derive(Debug)]
pub struct TileStore {
    root: PathBuf,
    config: StoreConfig,
    index: Mutex<StoreIndex>,
}

impl TileStore {
    /// Open (or create) a store rooted at `root`. A missing or corrupt index
    /// is treated as an empty store.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> crate::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let index = match fs::read(root.join(INDEX_FILE)) {
            Ok(bytes) => match bincode::deserialize::<StoreIndex>(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    log::warn!("tile store index corrupt, starting empty: {}", e);
                    StoreIndex::default()
                }
            },
            Err(_) => StoreIndex::default(),
        };

        log::info!(
            "opened tile store at {:?} with {} rows (budget {})",
            root,
            index.rows.len(),
            config.max_rows
        );

        Ok(Self {
            root,
            config,
            index: Mutex::new(index),
        })
    }

    /// Fetch a row's image bytes and last-used timestamp. Any I/O failure or
    /// missing blob is a miss.
    pub fn read(&self, key: &RowKey) -> Option<(Vec<u8>, u64)> {
        let mut index = self.index.lock().ok()?;
        let meta = *index.rows.get(key)?;

        match fs::read(self.blob_path(key)) {
            Ok(bytes) => Some((bytes, meta.last_used)),
            Err(e) => {
                log::warn!("tile row {:?} unreadable, dropping: {}", key, e);
                index.rows.remove(key);
                self.persist(&index);
                None
            }
        }
    }

    pub fn exists(&self, key: &RowKey) -> bool {
        self.index
            .lock()
            .map(|index| index.rows.contains_key(key))
            .unwrap_or(false)
    }

    /// Insert or update a row. Inserts enforce the row budget first, so the
    /// row count never exceeds it.
    pub fn write(&self, key: &RowKey, image: &[u8]) {
        let Ok(mut index) = self.index.lock() else {
            return;
        };

        if !index.rows.contains_key(key) {
            self.evict_for_insert(&mut index);
        }

        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("tile store write skipped, mkdir failed: {}", e);
                return;
            }
        }
        if let Err(e) = fs::write(&path, image) {
            log::warn!("tile store write skipped for {:?}: {}", key, e);
            return;
        }

        let seq = index.next_seq;
        index.next_seq += 1;
        index.rows.insert(
            key.clone(),
            RowMeta {
                last_used: now_millis(),
                seq,
            },
        );
        self.persist(&index);
    }

    /// Refresh a row's last-used timestamp. Throttled: a no-op unless the
    /// stored timestamp is staler than the configured threshold, which bounds
    /// write amplification to one index rewrite per threshold per row.
    pub fn touch(&self, key: &RowKey) {
        let Ok(mut index) = self.index.lock() else {
            return;
        };
        let threshold = self.config.touch_threshold.as_millis() as u64;
        let now = now_millis();

        let Some(meta) = index.rows.get_mut(key) else {
            return;
        };
        if now.saturating_sub(meta.last_used) <= threshold {
            return;
        }
        meta.last_used = now;
        self.persist(&index);
    }

    pub fn row_count(&self) -> usize {
        self.index
            .lock()
            .map(|index| index.rows.len())
            .unwrap_or(0)
    }

    /// Make room for one insert: delete least-recently-used rows (insertion
    /// order on timestamp ties) in batches of at most `evict_chunk` until the
    /// new row fits within the budget.
    fn evict_for_insert(&self, index: &mut StoreIndex) {
        let budget = self.config.max_rows.max(1);
        let mut excess = (index.rows.len() + 1).saturating_sub(budget);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(RowKey, RowMeta)> = index
            .rows
            .iter()
            .map(|(k, m)| (k.clone(), *m))
            .collect();
        by_age.sort_by_key(|(_, meta)| (meta.last_used, meta.seq));

        let mut victims = by_age.into_iter();
        while excess > 0 {
            let batch = excess.min(self.config.evict_chunk.max(1));
            for (key, _) in victims.by_ref().take(batch) {
                if let Err(e) = fs::remove_file(self.blob_path(&key)) {
                    log::warn!("evicted blob {:?} not removed: {}", key, e);
                }
                index.rows.remove(&key);
                log::debug!("evicted tile row {:?}", key);
            }
            excess -= batch;
        }
    }

    fn blob_path(&self, key: &RowKey) -> PathBuf {
        self.root
            .join(&key.map)
            .join(&key.layer)
            .join(format!("{}_{}.img", key.x, key.y))
    }

    fn persist(&self, index: &StoreIndex) {
        match bincode::serialize(index) {
            Ok(bytes) => {
                if let Err(e) = fs::write(self.root.join(INDEX_FILE), bytes) {
                    log::warn!("tile store index not persisted: {}", e);
                }
            }
            Err(e) => log::warn!("tile store index not serialized: {}", e),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
