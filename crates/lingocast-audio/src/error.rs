// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid bank file: {0}")]
    Bank(#[from] BankError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AudioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AudioError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Malformed bank metadata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BankError {
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("missing {0} chunk")]
    MissingChunk(&'static str),
}

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {program} is not available: {reason}")]
    Unavailable { program: String, reason: String },

    #[error("tool {program} timed out after {seconds}s")]
    TimedOut { program: String, seconds: u64 },

    #[error("tool {program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("tool {program} produced no usable output at {path}")]
    MissingOutput { program: String, path: PathBuf },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
