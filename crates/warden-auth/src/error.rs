// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the security subsystem.
//!
//! Each service has its own error enum. Authentication errors are deliberately
//! coarse at the caller boundary: the precise reason for a failed login lives
//! only in the audit trail.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// AuthError
// =============================================================================

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, wrong password, or empty input.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Too many failed attempts for this username.
    #[error("Too many failed attempts, retry in {} seconds", retry_after.as_secs())]
    RateLimited {
        /// Time until the lockout ends.
        retry_after: Duration,
    },

    /// MFA is enabled and no code was supplied.
    #[error("Multi-factor authentication code required")]
    MfaRequired,

    /// The supplied MFA code is wrong or MFA is not set up.
    #[error("Invalid multi-factor authentication code")]
    InvalidMfa,

    /// The password does not meet the strength rules.
    #[error("Password does not meet requirements: {reason}")]
    WeakPassword {
        /// Which rule failed.
        reason: String,
    },

    /// The username is taken.
    #[error("User already exists: {username}")]
    UserExists {
        /// The conflicting username.
        username: String,
    },

    /// No user with the given ID.
    #[error("User not found")]
    UserNotFound,

    /// The access token is unusable.
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// The refresh token is unusable.
    #[error("Invalid refresh token: {reason}")]
    InvalidRefreshToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// Backing storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl AuthError {
    /// Creates a weak password error.
    pub fn weak_password(reason: impl Into<String>) -> Self {
        Self::WeakPassword {
            reason: reason.into(),
        }
    }

    /// Creates an invalid token error.
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Creates an invalid refresh token error.
    pub fn invalid_refresh_token(reason: impl Into<String>) -> Self {
        Self::InvalidRefreshToken {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns a short, stable classification of the error.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited { .. } => "rate_limited",
            Self::MfaRequired => "mfa_required",
            Self::InvalidMfa => "invalid_mfa",
            Self::WeakPassword { .. } => "weak_password",
            Self::UserExists { .. } => "user_exists",
            Self::UserNotFound => "user_not_found",
            Self::InvalidToken { .. } => "invalid_token",
            Self::InvalidRefreshToken { .. } => "invalid_refresh_token",
            Self::Storage(_) => "storage",
            Self::Internal { .. } => "internal",
        }
    }

    /// Returns `true` for storage and internal failures, as opposed to a
    /// decision about the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal { .. })
    }

    /// Returns text that is safe to show to the caller.
    ///
    /// Token and internal failures collapse into generic messages.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidToken { .. } => "Invalid or expired token".to_string(),
            Self::InvalidRefreshToken { .. } => "Invalid or expired refresh token".to_string(),
            Self::Storage(_) | Self::Internal { .. } => "Authentication unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

// =============================================================================
// AuthzError
// =============================================================================

/// Authorization errors.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The user may not perform the action on the resource.
    #[error("Access denied: {action} on {resource}")]
    AccessDenied {
        /// Normalized resource path.
        resource: String,
        /// Requested action.
        action: String,
    },

    /// The user lacks a named permission.
    #[error("Permission denied: {permission}")]
    PermissionDenied {
        /// The missing permission ID.
        permission: String,
    },

    /// The request itself is malformed.
    #[error("Invalid authorization request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },
}

impl AuthzError {
    /// Creates an access denied error.
    pub fn access_denied(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::AccessDenied {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Creates a permission denied error.
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

// =============================================================================
// TokenError
// =============================================================================

/// Token service errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No signing key is available.
    #[error("Signing key unavailable")]
    KeyUnavailable,

    /// Required claims are missing.
    #[error("Invalid token payload: {message}")]
    InvalidPayload {
        /// What is missing.
        message: String,
    },

    /// Signing failed.
    #[error("Failed to sign token: {message}")]
    SignFailed {
        /// Error message.
        message: String,
    },

    /// The token is not a well-formed signed token.
    #[error("Invalid token format: {message}")]
    InvalidFormat {
        /// Error message.
        message: String,
    },

    /// The token's jti is in the revocation set.
    #[error("Token has been revoked")]
    TokenRevoked,

    /// No retained key verifies the token, or a claim check failed.
    #[error("Token verification failed: {message}")]
    VerificationFailed {
        /// Error message.
        message: String,
    },

    /// The token type does not fit the operation.
    #[error("Invalid token type: expected {expected}, got {actual}")]
    InvalidTokenType {
        /// Required type.
        expected: String,
        /// Presented type.
        actual: String,
    },

    /// The token carries no jti and cannot be revoked.
    #[error("Token has no jti")]
    MissingJti,

    /// Revocation storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl TokenError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates a sign failed error.
    pub fn sign_failed(message: impl Into<String>) -> Self {
        Self::SignFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a verification failed error.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            message: message.into(),
        }
    }
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

// =============================================================================
// StoreError
// =============================================================================

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("Failed to parse configuration: {message}")]
    Parse {
        /// Error message.
        message: String,
    },

    /// Unknown file extension.
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The extension found.
        extension: String,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {field}: {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What is wrong.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// SecurityError
// =============================================================================

/// Errors raised while assembling or maintaining the security context.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Token service error.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Authentication error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Audit trail error.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}

/// Result type for context operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
