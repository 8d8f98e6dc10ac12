//! The classified error record and its category-specific details.
//!
//! Records are only built by the classifier; severity, auto-recovery and
//! escalation level are read from the category tables at construction time and
//! cannot be set afterwards.

use crate::category::{ErrorCategory, PlatformArea, RecoveryStrategy, Severity, UserContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Extra fields carried by specialized failures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetails {
    #[default]
    None,
    Payment {
        amount: Option<f64>,
        currency: Option<String>,
        payment_method: Option<String>,
    },
    FileUpload {
        file_name: Option<String>,
        file_size: Option<u64>,
        allowed_types: Vec<String>,
    },
    Network {
        connection_type: Option<String>,
        is_offline: bool,
    },
    Authentication {
        auth_type: Option<String>,
        session_expired: bool,
    },
}

impl ErrorDetails {
    /// Category these details belong to, if any.
    pub fn implied_category(&self) -> Option<ErrorCategory> {
        match self {
            ErrorDetails::None => None,
            ErrorDetails::Payment { .. } => Some(ErrorCategory::Payment),
            ErrorDetails::FileUpload { .. } => Some(ErrorCategory::FileUpload),
            ErrorDetails::Network { .. } => Some(ErrorCategory::Network),
            ErrorDetails::Authentication { .. } => Some(ErrorCategory::Authentication),
        }
    }

    /// True when no category-specific details are attached.
    pub fn is_none(&self) -> bool {
        matches!(self, ErrorDetails::None)
    }
}

/// How a record should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Compact, inline, top recovery action only.
    Inline,
    /// Global error slot with every recovery option.
    Global,
}

/// Structured representation of a classified failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    id: Uuid,
    category: ErrorCategory,
    severity: Severity,
    user_context: UserContext,
    platform_area: PlatformArea,
    timestamp: DateTime<Utc>,
    message: String,
    user_message: String,
    recovery_strategy: Vec<RecoveryStrategy>,
    can_auto_recover: bool,
    escalation_level: u8,
    retry_count: u32,
    max_retries: u32,
    details: ErrorDetails,
    user_id: Option<String>,
    operation_key: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
}

/// Inputs the classifier has already resolved for a new record.
pub(crate) struct RecordParts {
    pub category: ErrorCategory,
    pub user_context: UserContext,
    pub platform_area: PlatformArea,
    pub message: String,
    pub user_message: String,
    pub details: ErrorDetails,
    pub user_id: Option<String>,
    pub operation_key: Option<String>,
    pub max_retries: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub(crate) fn from_parts(parts: RecordParts) -> Self {
        let category = parts.category;
        Self {
            id: Uuid::new_v4(),
            category,
            severity: category.severity(),
            user_context: parts.user_context,
            platform_area: parts.platform_area,
            timestamp: parts.timestamp,
            message: parts.message,
            user_message: parts.user_message,
            recovery_strategy: category.candidate_strategies().to_vec(),
            can_auto_recover: category.can_auto_recover(),
            escalation_level: category.escalation_level(),
            retry_count: 0,
            max_retries: parts.max_retries,
            details: parts.details,
            user_id: parts.user_id,
            operation_key: parts.operation_key,
            metadata: HashMap::new(),
        }
    }

    /// Unique id, assigned at classification.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Category inferred by the classifier.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Severity read from the category table.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Role the user was acting in.
    pub fn user_context(&self) -> UserContext {
        self.user_context
    }

    /// Area of the marketplace the failure came from.
    pub fn platform_area(&self) -> PlatformArea {
        self.platform_area
    }

    /// When the record was classified.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Raw failure message as reported.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Localized, human-facing message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Ordered recovery options after connectivity filtering. Empty means
    /// manual handling only.
    pub fn recovery_strategy(&self) -> &[RecoveryStrategy] {
        &self.recovery_strategy
    }

    /// Whether the engine may retry without asking the user.
    pub fn can_auto_recover(&self) -> bool {
        self.can_auto_recover
    }

    /// Escalation level from 0 (self-heals) to 3 (contact support now).
    pub fn escalation_level(&self) -> u8 {
        self.escalation_level
    }

    /// Recovery attempts that have failed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Automatic retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Category-specific details, or [`ErrorDetails::None`].
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// User the failure happened to, when known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Identity of the logical operation that failed, used to avoid running
    /// two retry loops for the same operation.
    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    /// Check whether `strategy` is among the offered recovery options.
    pub fn has_strategy(&self, strategy: RecoveryStrategy) -> bool {
        self.recovery_strategy.contains(&strategy)
    }

    /// First recovery option, shown for inline errors.
    pub fn top_action(&self) -> Option<RecoveryStrategy> {
        self.recovery_strategy.first().copied()
    }

    /// True once `retry_count` has reached `max_retries`.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// How the presentation layer should surface this record.
    ///
    /// # Returns
    /// `Inline` for low and medium severity, `Global` otherwise.
    pub fn display_mode(&self) -> DisplayMode {
        match self.severity {
            Severity::Low | Severity::Medium => DisplayMode::Inline,
            Severity::High | Severity::Critical => DisplayMode::Global,
        }
    }

    /// Critical records show the escalation path up front instead of behind a
    /// details toggle.
    pub fn escalation_presurfaced(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Add metadata to this record using builder pattern.
    ///
    /// # Example
    /// ```rust
    /// use marketplace_recovery::{AmbientContext, Classifier, RawFailure};
    ///
    /// let record = Classifier::default()
    ///     .classify(&RawFailure::new("Failed to fetch"), &AmbientContext::default())
    ///     .with_metadata("endpoint", serde_json::json!("/api/bookings"));
    /// assert!(record.has_metadata("endpoint"));
    /// ```
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Add a metadata entry in place, replacing any previous value.
    pub fn add_metadata<K: Into<String>>(&mut self, key: K, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Look up a metadata value by key.
    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// All metadata attached to the record.
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    pub(crate) fn set_recovery_strategy(&mut self, strategies: Vec<RecoveryStrategy>) {
        self.recovery_strategy = strategies;
    }

    pub(crate) fn set_retry_count(&mut self, retry_count: u32) {
        self.retry_count = retry_count;
    }

    /// Emit one tracing event for this record at a level that follows its
    /// severity. Callers gate this on `EngineSettings::log_errors`.
    pub fn log(&self) {
        let id = self.id;
        match self.severity {
            Severity::Low => tracing::debug!(
                error_id = %id, category = %self.category, area = %self.platform_area,
                "{}", self.message
            ),
            Severity::Medium => tracing::info!(
                error_id = %id, category = %self.category, area = %self.platform_area,
                "{}", self.message
            ),
            Severity::High => tracing::warn!(
                error_id = %id, category = %self.category, area = %self.platform_area,
                "{}", self.message
            ),
            Severity::Critical => tracing::error!(
                error_id = %id, category = %self.category, area = %self.platform_area,
                "{}", self.message
            ),
        }
    }
}
