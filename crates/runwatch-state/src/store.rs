//! RunStore: redb-backed persistence for launched runs.
//!
//! Launchers record their runs here; the health monitor reads the
//! in-progress subset on every poll. Values are JSON-serialized into
//! redb's `&[u8]` value columns. Both on-disk and in-memory backends are
//! supported (the latter for testing and for daemons run without a path).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::RUNS;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe run store backed by redb.
#[derive(Clone)]
pub struct RunStore {
    db: Arc<Database>,
}

impl RunStore {
    /// Open (or create) a persistent run store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "run store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory run store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory run store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a run record.
    pub fn put_run(&self, run: &RunRecord) -> StateResult<()> {
        validate_name("deployment", &run.deployment)?;
        validate_name("run_id", &run.run_id)?;

        let key = run.table_key();
        let value = serde_json::to_vec(run).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = ?run.status, "run stored");
        Ok(())
    }

    /// Record a run (or a status change) stamped with the current time.
    pub fn upsert_run(
        &self,
        deployment: &str,
        run_id: &str,
        status: RunStatus,
        worker_address: Option<String>,
    ) -> StateResult<RunRecord> {
        let now = epoch_secs();
        let created_at = self
            .get_run(deployment, run_id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = RunRecord {
            deployment: deployment.to_string(),
            run_id: run_id.to_string(),
            status,
            worker_address,
            created_at,
            updated_at: now,
        };
        self.put_run(&record)?;
        Ok(record)
    }

    /// Get a run by deployment and run ID.
    pub fn get_run(&self, deployment: &str, run_id: &str) -> StateResult<Option<RunRecord>> {
        let key = run_key(deployment, run_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let run: RunRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// List every run recorded for a deployment, ordered by run ID.
    pub fn list_runs_for_deployment(&self, deployment: &str) -> StateResult<Vec<RunRecord>> {
        let prefix = run_key(deployment, "");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let run: RunRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            results.push(run);
        }
        Ok(results)
    }

    /// List runs that have not reached a terminal state.
    pub fn list_in_progress_runs(&self, deployment: &str) -> StateResult<Vec<RunRecord>> {
        let mut runs = self.list_runs_for_deployment(deployment)?;
        runs.retain(|r| r.status.is_in_progress());
        Ok(runs)
    }

    /// Delete a run. Returns true if it existed.
    pub fn delete_run(&self, deployment: &str, run_id: &str) -> StateResult<bool> {
        let key = run_key(deployment, run_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "run deleted");
        Ok(existed)
    }

    /// Delete all runs for a deployment. Returns number deleted.
    ///
    /// The prefix scan and the removals share one write transaction, so a
    /// run recorded concurrently is either counted and removed or left
    /// untouched for a later call.
    pub fn delete_runs_for_deployment(&self, deployment: &str) -> StateResult<u32> {
        let prefix = run_key(deployment, "");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let key = key.value();
                if !key.starts_with(&prefix) {
                    break;
                }
                keys.push(key.to_string());
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            count = keys.len() as u32;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%deployment, count, "runs deleted");
        Ok(count)
    }
}

/// Names become key segments, so they may not be empty or contain `:`.
fn validate_name(field: &str, value: &str) -> StateResult<()> {
    if value.is_empty() {
        return Err(StateError::InvalidKey(format!("{field} is empty")));
    }
    if value.contains(':') {
        return Err(StateError::InvalidKey(format!(
            "{field} {value:?} contains ':'"
        )));
    }
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
