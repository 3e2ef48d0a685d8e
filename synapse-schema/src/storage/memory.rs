//! In-memory transactional store
//!
//! Committed state is an immutable `Arc<Tables>`; readers clone the `Arc`
//! and never block writers. A transaction works on a private copy and
//! publishes it on commit. A single writer lock serializes transactions.

use super::{ReadView, Store, Transaction};
use crate::error::StorageError;
use crate::value::{Identity, Record};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<String, BTreeMap<Identity, Record>>,
    sequences: BTreeMap<String, i64>,
}

impl Tables {
    fn get(&self, model: &str, id: Identity) -> Option<Record> {
        self.rows.get(model).and_then(|t| t.get(&id)).cloned()
    }

    fn scan(&self, model: &str) -> Vec<Record> {
        self.rows
            .get(model)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: RwLock<Arc<Tables>>,
    writer: Mutex<()>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `model` fail, for exercising rollback paths
    pub fn fail_writes_to(&self, model: impl Into<String>) {
        self.failing.lock().insert(model.into());
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Number of committed records of `model`
    pub fn count(&self, model: &str) -> usize {
        self.committed
            .read()
            .rows
            .get(model)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn snapshot(&self) -> Arc<Tables> {
        self.committed.read().clone()
    }
}

struct Snapshot {
    tables: Arc<Tables>,
}

impl ReadView for Snapshot {
    fn get(&self, model: &str, id: Identity) -> Result<Option<Record>, StorageError> {
        Ok(self.tables.get(model, id))
    }

    fn scan(&self, model: &str) -> Result<Vec<Record>, StorageError> {
        Ok(self.tables.scan(model))
    }
}

impl Store for MemoryStore {
    fn read(&self) -> Box<dyn ReadView + '_> {
        Box::new(Snapshot {
            tables: self.snapshot(),
        })
    }

    fn begin(&self, timeout: Option<Duration>) -> Result<Box<dyn Transaction + '_>, StorageError> {
        Ok(Box::new(self.open(timeout)?))
    }
}

impl MemoryStore {
    fn open(&self, timeout: Option<Duration>) -> Result<MemoryTransaction<'_>, StorageError> {
        let started = Instant::now();
        let guard = match timeout {
            Some(timeout) => self.writer.try_lock_for(timeout).ok_or(StorageError::Timeout)?,
            None => self.writer.lock(),
        };
        trace!("memory transaction opened");
        Ok(MemoryTransaction {
            store: self,
            _writer: guard,
            working: (*self.snapshot()).clone(),
            deadline: timeout.map(|t| started + t),
            done: false,
        })
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    working: Tables,
    deadline: Option<Instant>,
    done: bool,
}

impl MemoryTransaction<'_> {
    fn check(&self) -> Result<(), StorageError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StorageError::Timeout),
            _ => Ok(()),
        }
    }

    /// Publish the working tables; a failed commit is finished too
    fn publish(&mut self) -> Result<(), StorageError> {
        self.done = true;
        self.check()?;
        let working = std::mem::take(&mut self.working);
        *self.store.committed.write() = Arc::new(working);
        trace!("memory transaction committed");
        Ok(())
    }

    fn check_write(&self, model: &str) -> Result<(), StorageError> {
        self.check()?;
        if self.store.failing.lock().contains(model) {
            return Err(StorageError::Backend(format!("writes to {} are failing", model)));
        }
        Ok(())
    }
}

impl ReadView for MemoryTransaction<'_> {
    fn get(&self, model: &str, id: Identity) -> Result<Option<Record>, StorageError> {
        self.check()?;
        Ok(self.working.get(model, id))
    }

    fn scan(&self, model: &str) -> Result<Vec<Record>, StorageError> {
        self.check()?;
        Ok(self.working.scan(model))
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn insert(&mut self, model: &str, id: Identity, record: Record) -> Result<(), StorageError> {
        self.check_write(model)?;
        let table = self.working.rows.entry(model.to_string()).or_default();
        if table.contains_key(&id) {
            return Err(StorageError::Duplicate {
                model: model.to_string(),
                id: id.to_string(),
            });
        }
        table.insert(id, record);
        Ok(())
    }

    fn replace(&mut self, model: &str, id: Identity, record: Record) -> Result<(), StorageError> {
        self.check_write(model)?;
        match self.working.rows.get_mut(model).and_then(|t| t.get_mut(&id)) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(StorageError::Missing {
                model: model.to_string(),
                id: id.to_string(),
            }),
        }
    }

    fn remove(&mut self, model: &str, id: Identity) -> Result<Option<Record>, StorageError> {
        self.check_write(model)?;
        Ok(self.working.rows.get_mut(model).and_then(|t| t.remove(&id)))
    }

    fn next_sequence(&mut self, model: &str) -> Result<i64, StorageError> {
        self.check()?;
        let next = self.working.sequences.entry(model.to_string()).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.publish()
    }

    fn rollback(mut self: Box<Self>) {
        self.done = true;
        trace!("memory transaction rolled back");
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            warn!("a transaction was dropped without being committed or rolled back");
        }
    }
}
