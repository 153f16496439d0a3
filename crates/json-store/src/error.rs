use json_store_path::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("store root must be an object")]
    RootNotObject,
    #[error("{0} is not an array")]
    NotAnArray(String),
    #[error("no handler registered at {0}")]
    NotAHandler(String),
    #[error("relative path {0:?} used outside a list item")]
    RelativePath(String),
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Failure reported by a listener test, callback or handler.
///
/// Listener failures never propagate out of a flush; they are logged and
/// the remaining listeners still run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<StoreError> for ListenerError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

impl From<PathError> for ListenerError {
    fn from(err: PathError) -> Self {
        Self(err.to_string())
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}
