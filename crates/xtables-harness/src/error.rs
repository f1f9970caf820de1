//! Errors that abort a harness run.
//!
//! A test that fails is not an error; it is a [`crate::executor::TestResult`]
//! with a diagnostic. Everything here stops the run without a summary.

use std::path::PathBuf;

use thiserror::Error;
use xtables_backend::BackendError;

use crate::directive::ParseError;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed test line.
    #[error("{file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },
    /// A test line appeared before any `:chain` line.
    #[error("{file}: line {line}: broken test, missing chain, leaving")]
    MissingChain { file: String, line: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing console output, the structured log or a report failed.
    #[error("output: {0}")]
    Output(#[source] std::io::Error),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
