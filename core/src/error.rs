//! Error types for connbench-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::traits::TransportError;

/// Core error type
///
/// Only configuration and coordinator failures are fatal for a load run.
/// Per-worker failures are reported through [`crate::WorkerResult`] instead
/// and never surface here.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Configuration error detected before any worker was spawned
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A builder was missing a required field
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// The start coordinator could not hand out a token
    #[error("start coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    /// Transport setup error (e.g. TLS material rejected by the client library)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Orchestration error
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a missing-configuration error for a builder field
    pub fn missing_config(field: &'static str) -> Self {
        Self::MissingConfig(field)
    }

    /// Create an orchestration error
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration(message.into())
    }

    /// Create a coordinator-unavailable error
    pub fn coordinator(message: impl Into<String>) -> Self {
        Self::CoordinatorUnavailable(message.into())
    }

    /// Whether the error came from configuration rather than runtime state
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingConfig(_))
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
