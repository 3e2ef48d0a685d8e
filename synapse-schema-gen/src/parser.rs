//! Registry document loading
//!
//! Each input is a registry document; models are concatenated in input
//! order. Generation options may appear in any document but must agree.

use std::path::{Path, PathBuf};
use synapse_schema::{Registry, SchemaOptions};
use tracing::debug;

/// Failure to load a registry document
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid registry document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{} declares options that differ from an earlier document", path.display())]
    ConflictingOptions { path: PathBuf },
}

/// Load and merge registry documents
pub fn load_registries(inputs: &[impl AsRef<Path>]) -> Result<Registry, LoadError> {
    let mut documents = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = input.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        documents.push((path.to_path_buf(), content));
    }
    merge_documents(&documents)
}

/// Merge already-read documents, `(origin, content)` in order
pub fn merge_documents(documents: &[(PathBuf, String)]) -> Result<Registry, LoadError> {
    let mut merged = Registry::default();
    let mut options: Option<SchemaOptions> = None;

    for (path, content) in documents {
        let registry = Registry::from_json_str(content).map_err(|source| LoadError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), models = registry.models.len(), "loaded registry");

        if declares_options(content) {
            match options {
                Some(seen) if seen != registry.options => {
                    return Err(LoadError::ConflictingOptions { path: path.clone() });
                }
                _ => options = Some(registry.options),
            }
        }
        merged.models.extend(registry.models);
    }

    merged.options = options.unwrap_or_default();
    Ok(merged)
}

fn declares_options(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content)
        .map(|doc| doc.get("options").is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, content: &str) -> (PathBuf, String) {
        (PathBuf::from(name), content.to_string())
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let registry = merge_documents(&[
            doc("a.json", r#"{ "models": [{ "name": "Author" }] }"#),
            doc(
                "b.json",
                r#"{ "options": { "default_page_size": 5 }, "models": [{ "name": "Post" }, { "name": "Tag" }] }"#,
            ),
        ])
        .unwrap();

        let names: Vec<_> = registry.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Author", "Post", "Tag"]);
        assert_eq!(registry.options.default_page_size, 5);
    }

    #[test]
    fn test_conflicting_options() {
        let err = merge_documents(&[
            doc("a.json", r#"{ "options": { "max_page_size": 10 } }"#),
            doc("b.json", r#"{ "options": { "max_page_size": 50 } }"#),
        ])
        .unwrap_err();
        assert!(matches!(err, LoadError::ConflictingOptions { ref path } if path == Path::new("b.json")));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = merge_documents(&[doc("broken.json", "{ \"models\": 3 }")]).unwrap_err();
        assert!(err.to_string().starts_with("invalid registry document broken.json"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_registries(&["/definitely/not/here.json"]).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
