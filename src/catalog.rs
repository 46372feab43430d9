//! Name → object registry: the pieces of state that exist once per open
//! database rather than once per subsystem. Grounded on `src/common/catalog.rs`'s
//! name-to-table map, narrowed to the two object kinds this engine's
//! storage core actually has.

use crate::index::btree::BTree;
use crate::page::PoolId;
use crate::record::file::RecordFile;
use crate::util::HandyRwLock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<RecordFile>>>,
    indexes: RwLock<HashMap<String, Arc<BTree>>>,
    next_pool_id: std::sync::atomic::AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            next_pool_id: std::sync::atomic::AtomicU32::new(1),
        }
    }

    /// Reserves a fresh `PoolId` for a new table/index data file. Pool
    /// id `0` is never issued, so it stays available as an "invalid"
    /// sentinel the way `InvalidPageNum` is for page numbers.
    pub fn allocate_pool_id(&self) -> PoolId {
        self.next_pool_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn register_table(&self, name: &str, table: Arc<RecordFile>) {
        self.tables.wl().insert(name.to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<Arc<RecordFile>> {
        self.tables.rl().get(name).cloned()
    }

    pub fn tables(&self) -> Vec<Arc<RecordFile>> {
        self.tables.rl().values().cloned().collect()
    }

    pub fn register_index(&self, name: &str, index: Arc<BTree>) {
        self.indexes.wl().insert(name.to_string(), index);
    }

    pub fn index(&self, name: &str) -> Option<Arc<BTree>> {
        self.indexes.rl().get(name).cloned()
    }

    pub fn indexes(&self) -> Vec<Arc<BTree>> {
        self.indexes.rl().values().cloned().collect()
    }
}
