use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure categories of an aggregation or validation run. None of them is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete gene model.
    #[error("annotation error for {subject}: {reason}")]
    Annotation { subject: String, reason: String },

    /// The alignment source can't serve a referenced sequence.
    #[error("input error for sequence {sequence}: {reason}")]
    Input { sequence: String, reason: String },

    /// A derived position falls outside the declared reference window.
    #[error("consistency error for gene {gene} on {sequence}{}: {reason}", at(.position))]
    Consistency {
        gene: String,
        sequence: String,
        position: Option<i64>,
        reason: String,
    },

    /// Write or serialization fault. Partial output is rolled back.
    #[error("storage error for {}: {reason}", .path.display())]
    Storage { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("the run was cancelled")]
    Cancelled,
}

fn at(position: &Option<i64>) -> String {
    match position {
        Some(position) => format!(" at position {position}"),
        None => String::new(),
    }
}

impl Error {
    pub fn annotation(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Annotation {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn input(sequence: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Input {
            sequence: sequence.into(),
            reason: reason.into(),
        }
    }

    pub fn consistency(
        gene: impl Into<String>,
        sequence: impl Into<String>,
        position: Option<i64>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Consistency {
            gene: gene.into(),
            sequence: sequence.into(),
            position,
            reason: reason.into(),
        }
    }

    /// Wrap a lower-level failure, keeping its whole chain of causes in the reason.
    pub fn storage(path: impl AsRef<Path>, err: eyre::Report) -> Self {
        Error::Storage {
            path: path.as_ref().to_path_buf(),
            reason: format!("{err:#}"),
        }
    }
}
