//! Live schema handle
//!
//! The servable schema is an immutable snapshot behind an [`ArcSwap`]. A
//! request loads one snapshot and keeps it for its whole duration; a model
//! set change builds a complete new snapshot and swaps the reference.

use crate::error::SchemaError;
use crate::graphql::{Schema, generate};
use crate::registry::Registry;
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::info;

/// Atomically replaceable schema snapshot
#[derive(Debug)]
pub struct LiveSchema {
    current: ArcSwap<Schema>,
}

impl LiveSchema {
    /// Start serving `schema`
    pub fn new(schema: Schema) -> Self {
        Self {
            current: ArcSwap::from_pointee(schema),
        }
    }

    /// Generate and serve the schema of a registry
    pub fn from_registry(registry: &Registry) -> Result<Self, SchemaError> {
        generate(registry).map(Self::new)
    }

    /// The snapshot to use for one request
    pub fn load(&self) -> Arc<Schema> {
        self.current.load_full()
    }

    /// Replace the snapshot
    pub fn publish(&self, schema: Schema) {
        info!(
            models = schema.models.len(),
            operations = schema.operations.len(),
            "publishing schema snapshot"
        );
        self.current.store(Arc::new(schema));
    }

    /// Regenerate from a changed registry
    ///
    /// On a fatal error the current snapshot keeps serving.
    pub fn regenerate(&self, registry: &Registry) -> Result<Arc<Schema>, SchemaError> {
        let schema = generate(registry)?;
        self.publish(schema);
        Ok(self.load())
    }
}

impl Default for LiveSchema {
    fn default() -> Self {
        Self::new(Schema::empty())
    }
}

static GLOBAL: Lazy<Arc<LiveSchema>> = Lazy::new(|| Arc::new(LiveSchema::default()));

/// Process-wide live schema; starts out empty
pub fn global() -> Arc<LiveSchema> {
    Arc::clone(&GLOBAL)
}
