//! Error types for the analytics engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analytics engine error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Window is inverted, zero-length or has a non-positive lookback
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Population too small for an explicitly requested statistic
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Baseline identifier not recognised
    #[error("Unknown baseline: {0}")]
    UnknownBaseline(String),

    /// Ownership traversal found a loop and the caller asked for a hard failure
    #[error("Cycle detected: {}", .path.join(" -> "))]
    CycleDetected {
        /// Entities forming the loop, first entity repeated at the end
        path: Vec<String>,
    },

    /// Data-access or risk-reference collaborator failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Risk factor weights do not sum to 1.0
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    /// Requested entity does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed input data, such as a dataset that does not parse
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Stable error classification for the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// See [`Error::InvalidWindow`]
    InvalidWindow,
    /// See [`Error::InsufficientData`]
    InsufficientData,
    /// See [`Error::UnknownBaseline`]
    UnknownBaseline,
    /// See [`Error::CycleDetected`]
    CycleDetected,
    /// See [`Error::UpstreamUnavailable`]
    UpstreamUnavailable,
    /// See [`Error::InvalidWeights`]
    InvalidWeights,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InvalidConfig`]
    InvalidConfig,
    /// See [`Error::InvalidInput`]
    InvalidInput,
}

impl ErrorKind {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidWindow => "invalid_window",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::UnknownBaseline => "unknown_baseline",
            ErrorKind::CycleDetected => "cycle_detected",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::InvalidWeights => "invalid_weights",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InvalidInput => "invalid_input",
        }
    }
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidWindow(_) => ErrorKind::InvalidWindow,
            Error::InsufficientData(_) => ErrorKind::InsufficientData,
            Error::UnknownBaseline(_) => ErrorKind::UnknownBaseline,
            Error::CycleDetected { .. } => ErrorKind::CycleDetected,
            Error::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::InvalidWeights(_) => ErrorKind::InvalidWeights,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
