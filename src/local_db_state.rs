use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::app_response::AppResponse;
use crate::local_db_model::CityRow;
use crate::mirror_config::MirrorConfig;

const CITIES_DB: &str = "cities";

/// Largest key LMDB accepts with its default build settings.
pub const MAX_KEY_BYTES: usize = 511;

/// LMDB-backed local mirror of the city collection.
///
/// One instance is created by the host at startup and shared as
/// `Arc<AppDbState>`. Besides plain reads it publishes the full row set after
/// every write, so readers can hold a [`watch::Receiver`] and re-render when
/// the table changes.
pub struct AppDbState {
    env: Option<Environment>,
    db: Database,
    path: PathBuf,
    rows_tx: watch::Sender<Vec<CityRow>>,
    // Held from commit through publish so the watch value follows commit order.
    write_lock: Mutex<()>,
}

impl AppDbState {
    /// Opens (or creates) `<name>.lmdb` with the default configuration.
    pub fn init(name: String) -> Result<Self, AppResponse> {
        Self::with_config(&MirrorConfig::named(name))
    }

    pub fn with_config(config: &MirrorConfig) -> Result<Self, AppResponse> {
        config.validate()?;

        let path = config.lmdb_dir();
        fs::create_dir_all(&path)?;

        let env = Environment::new()
            .set_max_dbs(config.max_dbs)
            .set_map_size(config.map_size)
            .open(&path)?;
        let db = env.create_db(Some(CITIES_DB), DatabaseFlags::empty())?;

        let initial = read_all(&env, db)?;
        info!("Opened city mirror at {} with {} rows", path.display(), initial.len());
        let (rows_tx, _) = watch::channel(initial);

        Ok(Self {
            env: Some(env),
            db,
            path,
            rows_tx,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.env.is_some()
    }

    fn env(&self) -> Result<&Environment, AppResponse> {
        self.env
            .as_ref()
            .ok_or_else(|| AppResponse::DatabaseError("Database is closed".to_string()))
    }

    /// Inserts or replaces every row in one write transaction.
    ///
    /// Rows already in the table whose id is not part of `rows` are left
    /// untouched. Returns the number of rows written.
    pub fn upsert_all(&self, rows: &[CityRow]) -> Result<usize, AppResponse> {
        if let Some(position) = rows.iter().position(|row| row.id.is_empty()) {
            return Err(AppResponse::ValidationError(format!(
                "Row at position {position} has an empty id"
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.id.len() > MAX_KEY_BYTES) {
            return Err(AppResponse::ValidationError(format!(
                "Row id of {} bytes exceeds the {MAX_KEY_BYTES} byte key limit",
                row.id.len()
            )));
        }

        let env = self.env()?;
        let _guard = self.lock_writes();
        let mut txn = env.begin_rw_txn()?;
        for row in rows {
            let json = serde_json::to_vec(row)?;
            txn.put(self.db, &row.id, &json, WriteFlags::empty())?;
        }
        txn.commit()?;
        debug!("Upserted {} rows", rows.len());

        self.publish();
        Ok(rows.len())
    }

    /// All rows in key order.
    pub fn get(&self) -> Result<Vec<CityRow>, AppResponse> {
        read_all(self.env()?, self.db)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<CityRow>, AppResponse> {
        if id.is_empty() {
            return Ok(None);
        }

        let env = self.env()?;
        let txn = env.begin_ro_txn()?;
        let row = match txn.get(self.db, &id) {
            Ok(bytes) => Some(serde_json::from_slice(bytes)?),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(AppResponse::from(e)),
        };
        txn.commit()?;
        Ok(row)
    }

    pub fn len(&self) -> Result<usize, AppResponse> {
        let env = self.env()?;
        let txn = env.begin_ro_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            cursor.iter().count()
        };
        txn.commit()?;
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, AppResponse> {
        Ok(self.len()? == 0)
    }

    /// Removes every row while keeping the database open.
    pub fn clear_all_records(&self) -> Result<(), AppResponse> {
        let env = self.env()?;
        let _guard = self.lock_writes();
        let mut txn = env.begin_rw_txn()?;
        txn.clear_db(self.db)?;
        txn.commit()?;
        info!("Cleared all rows in {}", self.path.display());

        self.publish();
        Ok(())
    }

    /// Reactive read of all rows. The receiver starts at the current table
    /// contents and is updated after every committed write.
    pub fn subscribe(&self) -> watch::Receiver<Vec<CityRow>> {
        self.rows_tx.subscribe()
    }

    /// Flushes and releases the LMDB environment. Every later call returns
    /// a database error.
    pub fn close_database(&mut self) -> Result<(), AppResponse> {
        match self.env.take() {
            Some(env) => {
                env.sync(true)?;
                info!("Closed city mirror at {}", self.path.display());
                Ok(())
            }
            None => {
                debug!("close_database called on an already closed mirror");
                Ok(())
            }
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Must be called with the write lock held.
    fn publish(&self) {
        match self.get() {
            Ok(rows) => {
                self.rows_tx.send_replace(rows);
            }
            Err(e) => warn!("Write committed but the row set could not be re-read: {e}"),
        }
    }
}

fn read_all(env: &Environment, db: Database) -> Result<Vec<CityRow>, AppResponse> {
    let txn = env.begin_ro_txn()?;
    let mut rows = Vec::new();
    {
        let mut cursor = txn.open_ro_cursor(db)?;
        for (key, value) in cursor.iter() {
            match serde_json::from_slice::<CityRow>(value) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Undecodable row under key {:?}: {e}", String::from_utf8_lossy(key));
                    return Err(AppResponse::from(e));
                }
            }
        }
    }
    txn.commit()?;
    Ok(rows)
}
