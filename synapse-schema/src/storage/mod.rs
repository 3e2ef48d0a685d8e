//! Storage seam
//!
//! The engine talks to storage only through these traits: consistent read
//! snapshots for queries, and one transaction per mutation call. Dropping a
//! transaction without committing it rolls it back.

mod memory;

pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::value::{Identity, Record};
use std::time::Duration;

/// Read access to committed (or, inside a transaction, pending) records
pub trait ReadView {
    /// Record of `model` with identity `id`
    fn get(&self, model: &str, id: Identity) -> Result<Option<Record>, StorageError>;

    /// Every record of `model`, in identity order
    fn scan(&self, model: &str) -> Result<Vec<Record>, StorageError>;
}

/// A write transaction
pub trait Transaction: ReadView {
    /// Store a new record; fails if the identity is taken
    fn insert(&mut self, model: &str, id: Identity, record: Record) -> Result<(), StorageError>;

    /// Overwrite an existing record
    fn replace(&mut self, model: &str, id: Identity, record: Record) -> Result<(), StorageError>;

    /// Delete a record, returning it
    fn remove(&mut self, model: &str, id: Identity) -> Result<Option<Record>, StorageError>;

    /// Next value of the per-model sequence
    fn next_sequence(&mut self, model: &str) -> Result<i64, StorageError>;

    /// Make every write visible atomically
    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard every write
    fn rollback(self: Box<Self>);
}

/// A transactional record store
pub trait Store: Send + Sync {
    /// Consistent snapshot of committed state
    fn read(&self) -> Box<dyn ReadView + '_>;

    /// Open a write transaction
    ///
    /// `timeout` bounds both waiting for the transaction and holding it; an
    /// operation past the deadline fails with [`StorageError::Timeout`].
    fn begin(&self, timeout: Option<Duration>) -> Result<Box<dyn Transaction + '_>, StorageError>;
}
