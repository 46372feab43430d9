//! Top-level engine handle: owns every subsystem singleton and
//! is the one place internal code is allowed to reach for global state —
//! a `once_cell` handle at this boundary only, never threaded through
//! every call site below it.
//!
//! Grounded on `src/database.rs`'s `Database::{new,global}` shape,
//! widened to wire the buffer pool, double-write buffer, WAL, catalog and
//! transaction kit together and to run recovery before the handle is
//! returned, so the normal request path only opens once recovery has
//! completed.

use crate::buffer_pool::{BufferPool, DurabilityHook, FileTable, VacuousDurability};
use crate::catalog::Catalog;
use crate::config::{LogHandlerKind, StorageConfig};
use crate::double_write::DoubleWriteBuffer;
use crate::error::StorageResult;
use crate::index::btree::BTree;
use crate::page::PoolId;
use crate::record::file::RecordFile;
use crate::recovery::Recovery;
use crate::txn::transaction::TrxKit;
use crate::wal::manager::LogManager;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static DB: OnceCell<Arc<Database>> = OnceCell::new();

/// A table or index this engine should open (or create, if its data
/// file doesn't exist yet) as part of `Database::open`.
pub enum ObjectSpec {
    Table { name: String, record_size: usize },
    Index { name: String, key_len: usize },
}

pub struct Database {
    pub config: StorageConfig,
    pub buffer_pool: Arc<BufferPool>,
    pub log: Arc<LogManager>,
    pub catalog: Arc<Catalog>,
    pub trx_kit: Arc<TrxKit>,
    dir: PathBuf,
}

impl Database {
    pub fn global() -> Arc<Database> {
        DB.get().expect("Database::open was never called").clone()
    }

    pub fn open(dir: &Path, config: StorageConfig, objects: Vec<ObjectSpec>) -> StorageResult<Arc<Database>> {
        std::fs::create_dir_all(dir).map_err(|e| crate::error::StorageError::IoCreate(e.to_string()))?;

        let files = Arc::new(FileTable::new(config.page_size));
        let double_write = Arc::new(DoubleWriteBuffer::open(&dir.join("dwb.bin"), config.page_size, config.double_write_threshold)?);
        double_write.bind_files(Arc::downgrade(&files));

        let log = LogManager::open(dir, &config)?;
        let durability: Arc<dyn DurabilityHook> = match config.log_handler {
            LogHandlerKind::Disk => log.clone() as Arc<dyn DurabilityHook>,
            LogHandlerKind::Vacuous => Arc::new(VacuousDurability),
        };

        let buffer_pool = Arc::new(BufferPool::new(config.page_size, config.buffer_pool_frames, Arc::clone(&files), double_write, durability));
        let catalog = Arc::new(Catalog::new());
        let trx_kit = TrxKit::new(Arc::clone(&log));

        let mut record_files: HashMap<PoolId, Arc<RecordFile>> = HashMap::new();
        let mut btrees: HashMap<PoolId, Arc<BTree>> = HashMap::new();

        for spec in objects.into_iter() {
            let pool_id = catalog.allocate_pool_id();
            match spec {
                ObjectSpec::Table { name, record_size } => {
                    let path = dir.join(format!("{}.tbl", name));
                    let is_new = !path.exists();
                    buffer_pool.register_file(pool_id, &path)?;
                    if is_new {
                        // Burn page 0 as the buffer-pool file header;
                        // record-manager pages start at page 1.
                        let hdr = buffer_pool.allocate_page(pool_id)?;
                        buffer_pool.unpin(&hdr);
                    }
                    let table = Arc::new(RecordFile::new(pool_id, record_size, Arc::clone(&buffer_pool), Arc::clone(&log)));
                    catalog.register_table(&name, Arc::clone(&table));
                    record_files.insert(pool_id, table);
                }
                ObjectSpec::Index { name, key_len } => {
                    let path = dir.join(format!("{}.idx", name));
                    let is_new = !path.exists();
                    buffer_pool.register_file(pool_id, &path)?;
                    if is_new {
                        let hdr = buffer_pool.allocate_page(pool_id)?;
                        buffer_pool.unpin(&hdr);
                    }
                    let tree = BTree::open(pool_id, key_len, Arc::clone(&buffer_pool), Arc::clone(&log))?;
                    catalog.register_index(&name, Arc::clone(&tree));
                    btrees.insert(pool_id, tree);
                }
            }
        }

        let recovery = Recovery {
            buffer_pool: Arc::clone(&buffer_pool),
            log: Arc::clone(&log),
            record_files,
            btrees,
            trx_kit: Arc::clone(&trx_kit),
        };
        recovery.run()?;

        let db = Arc::new(Database {
            config,
            buffer_pool,
            log,
            catalog,
            trx_kit,
            dir: dir.to_path_buf(),
        });
        let _ = DB.set(Arc::clone(&db));
        Ok(db)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shutdown(&self) -> StorageResult<()> {
        self.buffer_pool.flush_all_pages()?;
        self.log.shutdown();
        Ok(())
    }
}
