//! Run-level error taxonomy.
//!
//! Only conditions that prevent any output are modelled here. Role,
//! apply, evaluation and write failures are recovered where they occur
//! and surface as findings or statuses instead.

use std::path::PathBuf;

/// Fatal errors that abort a run before (or instead of) batching.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("No model files found under {}", root.display())]
    NoInput { root: PathBuf },

    #[error("Cannot read models directory {}: {source}", root.display())]
    UnreadableRoot {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration ({}): {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type RunResult<T> = Result<T, RunError>;
