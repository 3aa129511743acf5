//! Error handling for Cortex Core.
//!
//! This module provides:
//! - Machine-readable error codes covering every pipeline component
//! - A disposition classification (Conflict / Transient / Permanent /
//!   Exhausted) that drives retry and dead-letter decisions
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use cortex_core::error::{CortexError, Result, ErrorContext};
//!
//! fn my_function() -> Result<()> {
//!     some_operation()
//!         .context("Failed to perform operation")?;
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Cortex operations.
pub type Result<T> = std::result::Result<T, CortexError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by operators and calling transports
/// for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Entity store errors
    ConflictingUpdate,
    RecordNotFound,
    StoreUnavailable,
    StoreQueryFailed,

    // Durable journal errors
    JournalAppendFailed,
    JournalRecordMissing,
    JournalRecordImmutable,

    // Work queue errors
    QueueUnavailable,
    QueueOperationFailed,
    ReceiveBudgetExhausted,

    // Agent capability errors
    AgentTimeout,
    AgentUnavailable,
    AgentRateLimited,
    AgentResponseInvalid,
    AgentRejected,

    // Outbound delivery errors
    DeliveryFailed,
    DeliveryRejected,

    // Validation errors
    InvalidInput,
    MissingRequiredField,
    InvalidStatusTransition,

    // Serialization errors
    SerializationError,
    DeserializationError,

    // Configuration errors
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal errors
    NetworkError,
    TimeLimitExceeded,
    InternalError,
}

/// How a failure should be handled by the component that observes it.
///
/// This is the load-bearing classification of the pipeline: `Conflict` and
/// bounded `Transient` failures are recovered locally, `Permanent` failures
/// mark the message `failed` and are surfaced to the user, `Exhausted` items
/// are parked in the dead-letter queue for operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// An optimistic write lost a race; the caller abandons its transition.
    Conflict,
    /// Worth retrying locally up to a bound, then escalated.
    Transient,
    /// Will not succeed on retry; recorded as `failed` and reported.
    Permanent,
    /// The work item exceeded its receive budget; parked for an operator.
    Exhausted,
}

impl ErrorCode {
    /// Classify this error into the pipeline's failure taxonomy.
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::ConflictingUpdate => Disposition::Conflict,

            Self::StoreUnavailable
            | Self::StoreQueryFailed
            | Self::JournalAppendFailed
            | Self::QueueUnavailable
            | Self::QueueOperationFailed
            | Self::AgentTimeout
            | Self::AgentUnavailable
            | Self::AgentRateLimited
            | Self::DeliveryFailed
            | Self::NetworkError
            | Self::TimeLimitExceeded => Disposition::Transient,

            Self::ReceiveBudgetExhausted => Disposition::Exhausted,

            Self::RecordNotFound
            | Self::JournalRecordMissing
            | Self::JournalRecordImmutable
            | Self::AgentResponseInvalid
            | Self::AgentRejected
            | Self::DeliveryRejected
            | Self::InvalidInput
            | Self::MissingRequiredField
            | Self::InvalidStatusTransition
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError => Disposition::Permanent,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.disposition(), Disposition::Transient)
    }

    /// Get the error category for grouping in logs and metrics.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ConflictingUpdate
            | Self::RecordNotFound
            | Self::StoreUnavailable
            | Self::StoreQueryFailed => "store",

            Self::JournalAppendFailed
            | Self::JournalRecordMissing
            | Self::JournalRecordImmutable => "journal",

            Self::QueueUnavailable
            | Self::QueueOperationFailed
            | Self::ReceiveBudgetExhausted => "queue",

            Self::AgentTimeout
            | Self::AgentUnavailable
            | Self::AgentRateLimited
            | Self::AgentResponseInvalid
            | Self::AgentRejected => "agent",

            Self::DeliveryFailed | Self::DeliveryRejected => "dispatch",

            Self::InvalidInput
            | Self::MissingRequiredField
            | Self::InvalidStatusTransition => "validation",

            Self::SerializationError | Self::DeserializationError => "serialization",

            Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration => "configuration",

            Self::NetworkError | Self::TimeLimitExceeded | Self::InternalError => "internal",
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
    /// Expected operational outcomes (conflicts, validation failures)
    Low,
    /// Operational issues (rate limits, timeouts, delivery retries)
    Medium,
    /// System errors (malformed agent output, serialization failures)
    High,
    /// Errors requiring immediate attention (backing stores down)
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ConflictingUpdate
            | ErrorCode::RecordNotFound
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidStatusTransition => Self::Low,

            ErrorCode::AgentTimeout
            | ErrorCode::AgentUnavailable
            | ErrorCode::AgentRateLimited
            | ErrorCode::AgentRejected
            | ErrorCode::DeliveryFailed
            | ErrorCode::NetworkError
            | ErrorCode::TimeLimitExceeded => Self::Medium,

            ErrorCode::StoreQueryFailed
            | ErrorCode::JournalRecordMissing
            | ErrorCode::JournalRecordImmutable
            | ErrorCode::QueueOperationFailed
            | ErrorCode::ReceiveBudgetExhausted
            | ErrorCode::AgentResponseInvalid
            | ErrorCode::DeliveryRejected
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::StoreUnavailable
            | ErrorCode::JournalAppendFailed
            | ErrorCode::QueueUnavailable
            | ErrorCode::InternalError => Self::Critical,
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

    /// Related entity ID (message, task, work item)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
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

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Cortex Core.
///
/// Supports structured error codes, error chaining with context, user-facing
/// vs internal messages, and disposition-driven retry decisions.
#[derive(Error, Debug)]
pub struct CortexError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to render into a reply)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CortexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CortexError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a conflict error for an optimistic write that lost its race.
    ///
    /// Not surfaced to users: the caller is expected to abandon its
    /// transition because another worker already advanced the record.
    pub fn conflict(entity_id: impl Into<String>, expected: &str, actual: &str) -> Self {
        Self::with_internal(
            ErrorCode::ConflictingUpdate,
            "Record was updated concurrently",
            format!("expected status '{}', found '{}'", expected, actual),
        )
        .with_details(ErrorDetails::new().with_entity("record", entity_id))
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the failure disposition.
    pub fn disposition(&self) -> Disposition {
        self.code.disposition()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Check if this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self.code.disposition(), Disposition::Conflict)
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "cortex_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "disposition" => format!("{:?}", self.code.disposition()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CortexError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CortexError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CortexError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CortexError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for CortexError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::RecordNotFound,
                "The requested record was not found",
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::StoreUnavailable,
                "Unable to connect to the entity store",
            ),
            _ => (ErrorCode::StoreQueryFailed, "An entity store error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<redis::RedisError> for CortexError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (
                ErrorCode::QueueUnavailable,
                "Unable to connect to the work queue",
            )
        } else {
            (
                ErrorCode::QueueOperationFailed,
                "A work queue operation failed",
            )
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for CortexError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<reqwest::Error> for CortexError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() {
            (ErrorCode::AgentTimeout, "External service request timed out")
        } else if error.is_connect() {
            (
                ErrorCode::NetworkError,
                "Failed to connect to external service",
            )
        } else if error.is_status() {
            if let Some(status) = error.status() {
                match status.as_u16() {
                    429 => (
                        ErrorCode::AgentRateLimited,
                        "Rate limited by external service",
                    ),
                    500..=599 => (
                        ErrorCode::AgentUnavailable,
                        "External service is temporarily unavailable",
                    ),
                    _ => (
                        ErrorCode::AgentRejected,
                        "External service rejected the request",
                    ),
                }
            } else {
                (
                    ErrorCode::AgentRejected,
                    "External service returned an error",
                )
            }
        } else {
            (ErrorCode::NetworkError, "Network error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for CortexError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(
            ErrorCode::TimeLimitExceeded,
            "Operation timed out",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for CortexError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::JournalRecordMissing, "File or record not found"),
            ErrorKind::TimedOut => (ErrorCode::TimeLimitExceeded, "Operation timed out"),
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                (ErrorCode::NetworkError, "Connection failed")
            }
            _ => (ErrorCode::JournalAppendFailed, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for CortexError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CortexError>() {
            Ok(cortex_error) => cortex_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for CortexError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl CortexError {
    /// Create an invalid status transition error.
    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::new(
            ErrorCode::InvalidStatusTransition,
            format!("Invalid message status transition: {} -> {}", from, to),
        )
        .with_context("from_status", from)
        .with_context("to_status", to)
    }

    /// Create an error for a work item that exceeded its receive budget.
    pub fn receive_exhausted(item_id: impl Into<String>, receive_count: u32, max: u32) -> Self {
        Self::new(
            ErrorCode::ReceiveBudgetExhausted,
            format!(
                "Work item exceeded receive budget: delivered {} times, max {}",
                receive_count, max
            ),
        )
        .with_details(ErrorDetails::new().with_entity("work_item", item_id))
        .with_context("receive_count", receive_count)
        .with_context("max_receive_count", max)
    }

    /// Create an error for agent output that failed validation.
    pub fn agent_response_invalid(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AgentResponseInvalid,
            format!("Agent returned an invalid response: {}", reason.into()),
        )
    }

    /// Create a journal immutability violation error.
    pub fn journal_immutable(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::JournalRecordImmutable,
            format!(
                "Journal record already exists with different content: {}",
                key
            ),
        )
        .with_details(ErrorDetails::new().with_entity("journal_record", key))
    }

    /// Create a delivery failure error.
    pub fn delivery_failed(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::DeliveryFailed,
            "Failed to deliver response",
            reason.into(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
