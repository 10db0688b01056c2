//! Crate-wide error handling for Canopy Core.
//!
//! Each module raises its own `thiserror` enum naming the entity and the rule
//! it broke ([`RoleError`], [`HierarchyError`], [`PolicyError`],
//! [`SubjectError`]). Hosts that want one type convert into [`CanopyError`],
//! which adds:
//! - A stable machine-readable [`ErrorCode`]
//! - An HTTP status mapping (500 for startup misconfiguration, 400 for
//!   malformed subjects, 403 for denials)
//! - A severity used to pick the log level
//! - An error counter through the `metrics` facade
//!
//! # Usage
//!
//! ```rust,ignore
//! use canopy_core::error::{CanopyError, Result};
//!
//! fn load(path: &Path) -> Result<AccessPolicyTable> {
//!     let config = Config::from_file(path)?;
//!     let hierarchy = config.build_hierarchy()?;
//!     Ok(config.build_policies(Arc::new(hierarchy))?)
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::hierarchy::HierarchyError;
use crate::rbac::engine::SubjectError;
use crate::rbac::policy::PolicyError;
use crate::rbac::roles::RoleError;
use crate::telemetry::metrics as error_metrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Canopy operations.
pub type Result<T> = std::result::Result<T, CanopyError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. Stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Role registry (1000-1099)
    InvalidRoleRegistry,

    // Hierarchy (1100-1199)
    InvalidHierarchy,
    PublicTypesMismatch,

    // Policy table (1200-1299)
    InvalidPolicy,

    // Subjects (1300-1399)
    UnknownEntityType,
    NotPermissionable,
    MissingContextId,
    DuplicateSubjectKey,

    // Authorization (1400-1499)
    Forbidden,

    // Configuration (2000-2099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Serialization (2100-2199)
    InvalidJson,
    SerializationError,

    // I/O (2200-2299)
    IoError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::InvalidRoleRegistry => 1000,

            Self::InvalidHierarchy => 1100,
            Self::PublicTypesMismatch => 1101,

            Self::InvalidPolicy => 1200,

            Self::UnknownEntityType => 1300,
            Self::NotPermissionable => 1301,
            Self::MissingContextId => 1302,
            Self::DuplicateSubjectKey => 1303,

            Self::Forbidden => 1400,

            Self::ConfigurationError => 2000,
            Self::MissingConfiguration => 2001,
            Self::InvalidConfiguration => 2002,

            Self::InvalidJson => 2100,
            Self::SerializationError => 2101,

            Self::IoError => 2200,
        }
    }

    /// The serialized form, e.g. `MISSING_CONTEXT_ID`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRoleRegistry => "INVALID_ROLE_REGISTRY",
            Self::InvalidHierarchy => "INVALID_HIERARCHY",
            Self::PublicTypesMismatch => "PUBLIC_TYPES_MISMATCH",
            Self::InvalidPolicy => "INVALID_POLICY",
            Self::UnknownEntityType => "UNKNOWN_ENTITY_TYPE",
            Self::NotPermissionable => "NOT_PERMISSIONABLE",
            Self::MissingContextId => "MISSING_CONTEXT_ID",
            Self::DuplicateSubjectKey => "DUPLICATE_SUBJECT_KEY",
            Self::Forbidden => "FORBIDDEN",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::MissingConfiguration => "MISSING_CONFIGURATION",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::InvalidJson => "INVALID_JSON",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::IoError => "IO_ERROR",
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidRoleRegistry => "roles",
            Self::InvalidHierarchy | Self::PublicTypesMismatch => "hierarchy",
            Self::InvalidPolicy => "policy",
            Self::UnknownEntityType
            | Self::NotPermissionable
            | Self::MissingContextId
            | Self::DuplicateSubjectKey => "subject",
            Self::Forbidden => "authorization",
            Self::ConfigurationError | Self::MissingConfiguration | Self::InvalidConfiguration => {
                "configuration"
            }
            Self::InvalidJson | Self::SerializationError => "serialization",
            Self::IoError => "io",
        }
    }

    /// HTTP status an outer layer should answer with.
    pub const fn http_status(&self) -> u16 {
        match self {
            // Malformed subject or request body (400)
            Self::UnknownEntityType
            | Self::NotPermissionable
            | Self::MissingContextId
            | Self::DuplicateSubjectKey
            | Self::InvalidJson => 400,

            // Denied (403)
            Self::Forbidden => 403,

            // Startup misconfiguration and I/O (500)
            Self::InvalidRoleRegistry
            | Self::InvalidHierarchy
            | Self::PublicTypesMismatch
            | Self::InvalidPolicy
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::SerializationError
            | Self::IoError => 500,
        }
    }

    /// Errors raised while building the hierarchy or policy table.
    pub const fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::InvalidRoleRegistry
                | Self::InvalidHierarchy
                | Self::PublicTypesMismatch
                | Self::InvalidPolicy
                | Self::ConfigurationError
                | Self::MissingConfiguration
                | Self::InvalidConfiguration
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors and denials
    Low,
    /// I/O problems
    Medium,
    /// Startup misconfiguration
    High,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::UnknownEntityType
            | ErrorCode::NotPermissionable
            | ErrorCode::MissingContextId
            | ErrorCode::DuplicateSubjectKey
            | ErrorCode::Forbidden
            | ErrorCode::InvalidJson => Self::Low,

            ErrorCode::IoError | ErrorCode::SerializationError => Self::Medium,

            ErrorCode::InvalidRoleRegistry
            | ErrorCode::InvalidHierarchy
            | ErrorCode::PublicTypesMismatch
            | ErrorCode::InvalidPolicy
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    /// The entity type the error is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Canopy Core.
#[derive(Error, Debug)]
pub struct CanopyError {
    code: ErrorCode,

    /// Message safe to show to the caller
    message: Cow<'static, str>,

    details: ErrorDetails,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CanopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl CanopyError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            message: message.into(),
            details: ErrorDetails::default(),
            source: None,
        };
        error_metrics::record_error(code.category(), code.as_str());
        error
    }

    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at a level chosen from its severity.
    pub fn log(&self) {
        let code = self.code.as_str();
        let category = self.code.category();
        let status = self.http_status();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = code,
                    category = category,
                    http_status = status,
                    message = %self.message,
                    details = ?self.details,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = code,
                    category = category,
                    http_status = status,
                    message = %self.message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = code,
                    category = category,
                    http_status = status,
                    message = %self.message,
                    "Low severity error"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable error body for outer layers (HTTP handlers, CLI JSON output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub category: String,
    pub status: u16,
    pub message: String,
    #[serde(default)]
    pub details: ErrorDetails,
}

impl From<&CanopyError> for ErrorResponse {
    fn from(error: &CanopyError) -> Self {
        Self {
            code: error.code,
            numeric_code: error.code.numeric_code(),
            category: error.code.category().to_string(),
            status: error.http_status(),
            message: error.message.to_string(),
            details: error.details.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<RoleError> for CanopyError {
    fn from(error: RoleError) -> Self {
        Self::new(ErrorCode::InvalidRoleRegistry, error.to_string()).with_source(error)
    }
}

impl From<HierarchyError> for CanopyError {
    fn from(error: HierarchyError) -> Self {
        let code = match &error {
            HierarchyError::PublicTypesMismatch { .. } => ErrorCode::PublicTypesMismatch,
            _ => ErrorCode::InvalidHierarchy,
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<PolicyError> for CanopyError {
    fn from(error: PolicyError) -> Self {
        let subject = match &error {
            PolicyError::UnknownContext { subject, .. }
            | PolicyError::NotAContext { subject, .. }
            | PolicyError::UnknownRole { subject, .. }
            | PolicyError::DuplicateEntry { subject, .. } => subject.to_string(),
        };
        Self::new(ErrorCode::InvalidPolicy, error.to_string())
            .with_details(ErrorDetails::new().with_entity(subject))
            .with_source(error)
    }
}

impl From<SubjectError> for CanopyError {
    fn from(error: SubjectError) -> Self {
        let details = match &error {
            SubjectError::UnknownEntityType(name) | SubjectError::NotPermissionable(name) => {
                ErrorDetails::new().with_entity(name.to_string())
            }
            SubjectError::MissingContextId {
                entity_type,
                context,
            } => ErrorDetails::new()
                .with_entity(entity_type.to_string())
                .with_context("context", context)
                .with_suggestion(format!("Set the `{context}` field on the subject, even if empty")),
            SubjectError::DuplicateKey { key, count } => ErrorDetails::new()
                .with_context("key", key)
                .with_context("count", count)
                .with_suggestion("Give every subject in a batch a distinct id"),
        };
        let code = match &error {
            SubjectError::UnknownEntityType(_) => ErrorCode::UnknownEntityType,
            SubjectError::NotPermissionable(_) => ErrorCode::NotPermissionable,
            SubjectError::MissingContextId { .. } => ErrorCode::MissingContextId,
            SubjectError::DuplicateKey { .. } => ErrorCode::DuplicateSubjectKey,
        };
        Self::new(code, error.to_string())
            .with_details(details)
            .with_source(error)
    }
}

impl From<serde_json::Error> for CanopyError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::InvalidJson
        } else {
            ErrorCode::SerializationError
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for CanopyError {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorCode::IoError, error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for CanopyError {
    fn from(error: config::ConfigError) -> Self {
        let code = match &error {
            config::ConfigError::NotFound(_) => ErrorCode::MissingConfiguration,
            config::ConfigError::PathParse(_)
            | config::ConfigError::FileParse { .. }
            | config::ConfigError::Type { .. } => ErrorCode::InvalidConfiguration,
            _ => ErrorCode::ConfigurationError,
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
