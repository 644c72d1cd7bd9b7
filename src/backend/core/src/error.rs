//! Error handling for Packguard Core.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable error code
//! - A coarse [`ErrorKind`] taxonomy so callers can tell "could not evaluate
//!   policy" apart from "denied by policy"
//! - User-facing vs internal messages
//! - Error logging with tracing integration, counted in `packguard_errors_total`
//!
//! The resolver never turns an error into a decision. A store failure or a
//! dangling reference is surfaced as an `Err`, and the caller picks the
//! fail-open/fail-closed policy explicitly.
//!
//! # Usage
//!
//! ```rust
//! use packguard_core::error::{ErrorKind, RbacError, Result};
//!
//! let checked: Result<bool> = Err(RbacError::store_unavailable("connection refused"));
//! let allowed = match checked {
//!     Ok(allowed) => allowed,
//!     Err(e) if e.kind() == ErrorKind::StoreUnavailable => false,
//!     Err(e) => return Err(e),
//! };
//! assert!(!allowed);
//! # Ok::<(), RbacError>(())
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Packguard operations.
pub type Result<T> = std::result::Result<T, RbacError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Argument Errors (1000-1099)
    InvalidArgument,
    UnknownResourceType,
    UnknownPermissionType,
    ResourceTypeMismatch,
    OrphanResource,

    // Lookup Errors (2000-2099)
    RoleNotFound,
    GrantNotFound,
    ResourceNotFound,

    // Store Errors (3000-3099)
    StoreUnavailable,

    // Configuration Errors (5000-5099)
    ConfigurationError,
}

/// Coarse classification of an error, as seen by callers deciding what to
/// do with a failed permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller passed something that can never be evaluated.
    InvalidArgument,
    /// A referenced role, grant or resource does not exist.
    NotFound,
    /// The backing store could not answer.
    StoreUnavailable,
    /// Configuration could not be loaded or is inconsistent.
    Configuration,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::InvalidArgument => 1000,
            Self::UnknownResourceType => 1001,
            Self::UnknownPermissionType => 1002,
            Self::ResourceTypeMismatch => 1003,
            Self::OrphanResource => 1004,

            Self::RoleNotFound => 2000,
            Self::GrantNotFound => 2001,
            Self::ResourceNotFound => 2002,

            Self::StoreUnavailable => 3000,

            Self::ConfigurationError => 5000,
        }
    }

    /// Get the taxonomy bucket for this code.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument
            | Self::UnknownResourceType
            | Self::UnknownPermissionType
            | Self::ResourceTypeMismatch
            | Self::OrphanResource => ErrorKind::InvalidArgument,

            Self::RoleNotFound | Self::GrantNotFound | Self::ResourceNotFound => {
                ErrorKind::NotFound
            }

            Self::StoreUnavailable => ErrorKind::StoreUnavailable,

            Self::ConfigurationError => ErrorKind::Configuration,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "argument",
            2000..=2099 => "lookup",
            3000..=3099 => "store",
            5000..=5099 => "configuration",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Programming errors on the caller side
    Low,
    /// Stale references
    Medium,
    /// Store failures, bad configuration
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidArgument
            | ErrorCode::UnknownResourceType
            | ErrorCode::UnknownPermissionType
            | ErrorCode::ResourceTypeMismatch
            | ErrorCode::OrphanResource => Self::Low,

            ErrorCode::RoleNotFound | ErrorCode::GrantNotFound | ErrorCode::ResourceNotFound => {
                Self::Medium
            }

            ErrorCode::StoreUnavailable | ErrorCode::ConfigurationError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (role name, grant id, resource uid)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Packguard Core.
#[derive(Error, Debug)]
pub struct RbacError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Message safe to show to an operator
    message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,
}

impl fmt::Display for RbacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl RbacError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
        }
    }

    /// Create an error with both public and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create a generic invalid-argument error.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Create a not found error for a role.
    pub fn role_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::RoleNotFound, "role", name)
    }

    /// Create a not found error for a permission grant.
    pub fn grant_not_found(id: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::GrantNotFound, "permission_grant", id)
    }

    /// Create a not found error for a governed resource.
    pub fn resource_not_found(uid: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::ResourceNotFound, "resource", uid)
    }

    fn not_found(code: ErrorCode, entity_type: &str, entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        Self::new(code, format!("{} not found: {}", entity_type, entity_id))
            .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::StoreUnavailable,
            "The RBAC store could not answer",
            message,
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid RBAC configuration",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the taxonomy bucket.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the operator-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity and count it in
    /// `packguard_errors_total`. Call once, where the error is surfaced.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    details = ?self.details,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                debug!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    details = ?self.details,
                    "Low severity error"
                );
            }
        }

        self.record_metrics();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "packguard_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
