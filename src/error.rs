//! Error types for posesweep
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Errors fall into two classes. Recoverable errors abort only the current grid
//! point (the sweep logs them and moves on); fatal errors abort the whole sweep.
//! See [`ErrorKind::is_recoverable`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Posesweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bases missing, not pre-built, or structurally different
    #[error("Configuration error: {0}\nBoth training bases must be fully built before the sweep starts.")]
    Configuration(String),

    /// Corrupt or unreadable feature archive
    #[error("Archive error in {}: {reason}", path.display())]
    Archive {
        /// Archive that failed
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Malformed pose or noise parameters
    #[error("Noise application failed: {0}")]
    NoiseApplication(String),

    /// Recognizer crash, timeout, or unparseable output
    #[error("External process error: {0}")]
    ExternalProcess(String),

    /// IO error on the result dataset or manifest
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::Archive`] for `path`.
    pub fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::NoiseApplication(_) => ErrorKind::NoiseApplication,
            Self::ExternalProcess(_) => ErrorKind::ExternalProcess,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Shorthand for `self.kind().is_recoverable()`.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

/// Error classification, recorded for skipped points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal, raised before any run.
    Configuration,
    /// Per-point, skip and continue.
    Archive,
    /// Per-point, skip and continue.
    NoiseApplication,
    /// Retried once, then skipped.
    ExternalProcess,
    /// Fatal.
    Io,
    /// Fatal.
    Serialization,
    /// Fatal.
    Other,
}

impl ErrorKind {
    /// Whether a sweep may skip the current point and continue.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::Archive | Self::NoiseApplication | Self::ExternalProcess
        )
    }

    /// Stable snake-case name, used in logs and manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Archive => "archive",
            Self::NoiseApplication => "noise_application",
            Self::ExternalProcess => "external_process",
            Self::Io => "io",
            Self::Serialization => "serialization",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
