//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Carries the three structural failures of the decoding engine (schema, path,
//! shape), and converts I/O, XML and config errors from the collaborators unchanged.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema mismatch at {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },

    #[error("Missing path: {path}")]
    MissingPath { path: String },

    #[error("Shape mismatch on dimension `{dim}`: {reason}")]
    ShapeMismatch { dim: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Builder `{name}` failed: {reason}")]
    Builder { name: String, reason: String },
}

impl Error {
    pub fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Error::MissingPath { path: path.into() }
    }

    pub fn shape(dim: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            dim: dim.into(),
            reason: reason.into(),
        }
    }

    pub fn builder(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Builder {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Attach the document location to a schema mismatch raised deeper down
    pub fn at(self, location: &str) -> Self {
        match self {
            Error::SchemaMismatch { path, reason } if path == "<node>" => Error::SchemaMismatch {
                path: location.to_string(),
                reason,
            },
            Error::SchemaMismatch { path, reason } if !location.is_empty() && location != "/" => {
                Error::SchemaMismatch {
                    path: format!("{}/{}", location.trim_end_matches('/'), path.trim_start_matches('/')),
                    reason,
                }
            }
            other => other,
        }
    }
}
