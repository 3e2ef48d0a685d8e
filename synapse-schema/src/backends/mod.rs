//! Output backends
//!
//! Each backend renders a schema snapshot into files for one target.

mod rust;
mod sdl;

pub use rust::RustBackend;
pub use sdl::{SdlBackend, render as render_sdl};

use crate::graphql::Schema;

/// A rendered output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory
    pub name: String,
    /// File content
    pub content: String,
}

/// A schema rendering backend
pub trait Backend: Send + Sync {
    /// Backend name (e.g., "sdl", "rust")
    fn name(&self) -> &str;

    /// File extension for generated files
    fn file_extension(&self) -> &str;

    /// Render every file for a snapshot
    fn generate(&self, schema: &Schema) -> Result<Vec<GeneratedFile>, BackendError>;
}

/// Backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("code generation error: {0}")]
    CodeGenError(String),
}

/// Get a backend by name
pub fn get_backend(name: &str) -> Result<Box<dyn Backend>, BackendError> {
    match name.to_lowercase().as_str() {
        "sdl" | "graphql" => Ok(Box::new(SdlBackend)),
        "rust" | "rs" => Ok(Box::new(RustBackend)),
        other => Err(BackendError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_backend() {
        assert_eq!(get_backend("SDL").unwrap().name(), "sdl");
        assert_eq!(get_backend("rs").unwrap().file_extension(), "rs");
        assert!(matches!(get_backend("ecto"), Err(BackendError::UnknownBackend(name)) if name == "ecto"));
    }
}
