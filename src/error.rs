//! Error types for the Ratewarden service.

use thiserror::Error;

/// Main error type for Ratewarden operations.
#[derive(Error, Debug)]
pub enum RatewardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store (Redis) errors
    #[error("Counter store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Metrics exporter errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// gRPC reflection registration errors
    #[error("gRPC reflection error: {0}")]
    Reflection(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, RatewardenError>;
