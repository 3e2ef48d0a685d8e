//! Generation and execution options
//!
//! [`SchemaOptions`] shape a generation pass and travel with the registry
//! document. [`ExecutionOptions`] and [`BulkPolicy`] are supplied per call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Options for a generation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaOptions {
    /// How many relationship hops a filter may traverse; 0 disables relation filters
    pub relation_filter_depth: usize,

    /// Page size when a paginated query does not ask for one
    pub default_page_size: usize,

    /// Upper bound for requested page sizes
    pub max_page_size: usize,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            relation_filter_depth: 1,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// How a bulk mutation treats a failing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkPolicy {
    /// One transaction for the batch; any failure discards every item
    AllOrNothing,
    /// One transaction per item; failures are reported at their index
    BestEffort,
}

/// Cooperative cancellation flag for an in-flight mutation
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// A fresh, uncancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Bound on waiting for, and holding, the storage transaction
    pub timeout: Option<Duration>,

    /// Checked before every write and before commit
    pub cancellation: Option<Cancellation>,
}

impl ExecutionOptions {
    /// Options with a timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancellation: None,
        }
    }

    /// Attach a cancellation flag
    pub fn cancellable(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Whether the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(Cancellation::is_cancelled)
    }
}
