// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the library layers can report. The application
// and CLI layers wrap these in anyhow::Error with extra context.
//
//   InvalidConfig   unknown network/optimizer/criterion names,
//                   inconsistent settings (raised before any
//                   parameter is allocated)
//   Io              missing dataset or checkpoint files, passed
//                   through unchanged from std::io
//   ShapeMismatch   checkpoint incompatible with the model
//   EmptyLoader     a split produced no mini-batches
//
// Validation-loader exhaustion is NOT an error: see data/cyclic.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot decode '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("cannot write '{path}': {message}")]
    Encode { path: PathBuf, message: String },

    #[error("array '{name}' not found in '{path}'")]
    MissingArray { name: String, path: PathBuf },

    #[error("array '{name}' in '{path}' has {found} rows, expected {expected}")]
    RowCount {
        name:     String,
        path:     PathBuf,
        expected: usize,
        found:    usize,
    },

    #[error("checkpoint record error: {0}")]
    Recorder(String),

    #[error("checkpoint shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("the {0} loader yielded no batches")]
    EmptyLoader(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }
}

impl From<burn::record::RecorderError> for Error {
    fn from(err: burn::record::RecorderError) -> Self {
        match err {
            // The recorder reports missing files as a string; surface them
            // as the I/O error the rest of the taxonomy uses.
            burn::record::RecorderError::FileNotFound(path) => Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("checkpoint file not found: {path}"),
            )),
            other => Error::Recorder(format!("{other:?}")),
        }
    }
}
