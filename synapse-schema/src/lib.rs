//! synapse-schema
//!
//! Generates a typed query and mutation surface from relational model
//! definitions and executes it against a transactional store.
//!
//! Flow:
//!   Registry -> introspect -> ModelDescriptor -> graphql::generate -> Schema
//!   Schema -> LiveSchema (atomic swap) -> Engine::{query, mutate}
//!   Schema -> backends::{sdl, rust} -> files

pub mod backends;
pub mod engine;
pub mod error;
pub mod graphql;
pub mod introspect;
pub mod ir;
pub mod live;
pub mod options;
pub mod registry;
pub mod storage;
pub mod value;

pub use engine::{Engine, MethodContext, MethodError, MethodHandler};
pub use error::{ErrorKind, IntrospectionError, MutationError, QueryError, SchemaError, StorageError};
pub use graphql::{MutationResult, Schema, generate};
pub use live::LiveSchema;
pub use options::{BulkPolicy, Cancellation, ExecutionOptions, SchemaOptions};
pub use registry::Registry;
pub use storage::{MemoryStore, Store};
pub use value::{Identity, Record, ScalarKind, Value};
