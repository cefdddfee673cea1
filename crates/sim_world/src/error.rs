use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while loading or validating a description.
///
/// Loading reports every problem it can find, in document order, as a
/// `Vec<DescriptionError>`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptionError {
    #[error("failed to read '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("world #{index} has no name")]
    MissingWorldName { index: usize },

    #[error("duplicate world name '{0}'")]
    DuplicateWorld(String),

    #[error("unnamed entity in world '{world}'")]
    MissingEntityName { world: String },

    #[error("duplicate entity '{name}' under '{parent}'")]
    DuplicateEntity { parent: String, name: String },

    #[error("plugin without a name on '{owner}'")]
    MissingPluginName { owner: String },

    #[error("invalid physics in world '{world}': {message}")]
    InvalidPhysics { world: String, message: String },

    #[error("unable to find include '{uri}'")]
    UnresolvedInclude { uri: String },

    #[error("invalid include '{uri}': {message}")]
    InvalidInclude { uri: String, message: String },

    #[error("failed to find world '{0}'")]
    WorldNotFound(String),
}

impl DescriptionError {
    pub(crate) fn syntax(err: &serde_json::Error) -> Self {
        Self::Syntax {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}
