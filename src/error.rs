//! Error kinds surfaced by PropertyStore and its helpers.
//!
//! Low-level pieces (MappedFile) report failure through sentinel state;
//! FileAttr returns these errors so callers may discard them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PropError {
    #[error("open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mmap {path}: {reason}")]
    Map { path: PathBuf, reason: String },

    #[error("security label {path}: {reason}")]
    Label { path: PathBuf, reason: String },

    #[error("write {name}: live store rejected ({live}), override failed ({bypass})")]
    WriteThrough {
        name: String,
        live: String,
        bypass: String,
    },

    #[error("persist {name}: {source}")]
    Persistence {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid property name {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PropError>;

impl PropError {
    pub(crate) fn persistence(name: &str, source: std::io::Error) -> Self {
        PropError::Persistence {
            name: name.to_string(),
            source,
        }
    }
}
