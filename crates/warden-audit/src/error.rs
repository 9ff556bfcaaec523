// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Audit error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while recording or reading the audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to write an audit entry.
    #[error("Failed to write audit entry: {message}")]
    WriteFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to query audit entries.
    #[error("Failed to query audit entries: {message}")]
    QueryFailed {
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// File rotation error.
    #[error("File rotation error: {message}")]
    RotationFailed {
        /// Error message.
        message: String,
        /// File path.
        path: Option<PathBuf>,
    },

    /// Retention cleanup error.
    #[error("Retention cleanup failed: {message}")]
    CleanupFailed {
        /// Error message.
        message: String,
    },

    /// The hash chain does not verify.
    #[error("Audit chain broken: {message}")]
    ChainBroken {
        /// Description of the first break.
        message: String,
    },

    /// The background writer is gone.
    #[error("Audit channel closed")]
    ChannelClosed,
}

impl AuditError {
    /// Creates a write failed error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a write failed error with source.
    pub fn write_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WriteFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a query failed error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a rotation failed error with path.
    pub fn rotation_failed_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::RotationFailed {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Creates a cleanup failed error.
    pub fn cleanup_failed(message: impl Into<String>) -> Self {
        Self::CleanupFailed {
            message: message.into(),
        }
    }

    /// Creates a broken chain error.
    pub fn chain_broken(message: impl Into<String>) -> Self {
        Self::ChainBroken {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WriteFailed { .. } | Self::Io(_) | Self::RotationFailed { .. }
        )
    }

    /// Returns a short, stable classification of the error.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::WriteFailed { .. } => "write_failed",
            Self::QueryFailed { .. } => "query_failed",
            Self::Io(_) => "io",
            Self::Serialization { .. } => "serialization",
            Self::Configuration { .. } => "configuration",
            Self::RotationFailed { .. } => "rotation_failed",
            Self::CleanupFailed { .. } => "cleanup_failed",
            Self::ChainBroken { .. } => "chain_broken",
            Self::ChannelClosed => "channel_closed",
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
