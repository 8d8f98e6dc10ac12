//! Turns a raw failure plus ambient context into an [`ErrorRecord`].
//!
//! Category inference runs in a fixed order: explicit hint, specialized
//! details, strong HTTP statuses (401/402/403/413/415), domain keywords, weak
//! statuses, generic keywords, and finally the ambient connectivity. The first
//! signal that matches wins, so the same input always lands in the same
//! category.

use crate::category::{ErrorCategory, PlatformArea, UserContext};
use crate::connectivity::ConnectivityStatus;
use crate::messages::{MessageCatalog, TableCatalog};
use crate::record::{ErrorDetails, ErrorRecord, RecordParts};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A failure as observed at a feature boundary, before classification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawFailure {
    pub message: String,
    /// Error type name reported by the failing layer (`TypeError`, `AbortError`).
    pub kind: Option<String>,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Category asserted by the calling site.
    pub category_hint: Option<ErrorCategory>,
    #[serde(default)]
    pub details: ErrorDetails,
    /// Identity of the logical operation that failed.
    pub operation_key: Option<String>,
}

impl RawFailure {
    /// Create a failure from its raw message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the error kind reported by the runtime, e.g. `TypeError`.
    pub fn with_kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Attach the HTTP status of the failed response.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Force the category, skipping inference.
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category_hint = Some(category);
        self
    }

    /// Attach category-specific details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Tag the failure with the logical operation it belongs to.
    pub fn with_operation_key<S: Into<String>>(mut self, key: S) -> Self {
        self.operation_key = Some(key.into());
        self
    }
}

impl<E: std::error::Error> From<&E> for RawFailure {
    fn from(err: &E) -> Self {
        RawFailure::new(err.to_string())
    }
}

/// Where and for whom the failure happened.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AmbientContext {
    pub user_context: UserContext,
    pub platform_area: PlatformArea,
    pub user_id: Option<String>,
    #[serde(default)]
    pub connectivity: ConnectivityStatus,
    /// Link type reported by the platform (`wifi`, `4g`, ...).
    pub connection_type: Option<String>,
}

impl AmbientContext {
    /// Create a context for a role and area; connectivity defaults to online.
    pub fn new(user_context: UserContext, platform_area: PlatformArea) -> Self {
        Self {
            user_context,
            platform_area,
            ..Self::default()
        }
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the connectivity seen when the failure happened.
    pub fn with_connectivity(mut self, connectivity: ConnectivityStatus) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_connection_type<S: Into<String>>(mut self, connection_type: S) -> Self {
        self.connection_type = Some(connection_type.into());
        self
    }
}

type KeywordRule = (ErrorCategory, &'static [&'static str]);

/// Signals that identify the failure itself, whatever resource or field the
/// message happens to name.
const LEADING_KEYWORDS: &[KeywordRule] = &[
    (
        ErrorCategory::Network,
        &[
            "failed to fetch", "fetch failed", "networkerror", "net::err", "econnrefused",
            "econnreset", "err_internet_disconnected",
        ],
    ),
    (
        ErrorCategory::Validation,
        &[
            "must be", "must contain", "must match", "is required", "are required",
            "required field", "at least", "obligatorio",
        ],
    ),
];

const DOMAIN_KEYWORDS: &[KeywordRule] = &[
    (
        ErrorCategory::Payment,
        &[
            "payment", "pago", "card declined", "tarjeta", "insufficient funds", "stripe",
            "checkout", "charge failed",
        ],
    ),
    (
        ErrorCategory::Authentication,
        &[
            "unauthorized", "unauthenticated", "session expired", "sesión", "sesion", "token",
            "jwt", "login", "sign in", "credentials", "password",
        ],
    ),
    (
        ErrorCategory::Authorization,
        &["forbidden", "permission", "not allowed", "access denied", "permiso"],
    ),
    (
        ErrorCategory::FileUpload,
        &[
            "upload", "file too large", "file size", "file type", "mime", "subir", "archivo",
        ],
    ),
    (
        ErrorCategory::Booking,
        &["booking", "reserva", "appointment", "time slot", "availability", "disponibilidad"],
    ),
    (
        ErrorCategory::Subscription,
        &["subscription", "suscripci", "billing cycle", "plan upgrade"],
    ),
    (ErrorCategory::Chat, &["chat", "websocket", "socket", "mensaje"]),
];

const GENERIC_KEYWORDS: &[KeywordRule] = &[
    (
        ErrorCategory::Validation,
        &["validation", "invalid", "inválid", "required", "obligatorio", "must be"],
    ),
    (
        ErrorCategory::Server,
        &[
            "internal server error", "bad gateway", "service unavailable", "gateway timeout",
            "server error",
        ],
    ),
    (
        ErrorCategory::Network,
        &[
            "network", "failed to fetch", "fetch failed", "timeout", "timed out", "econnrefused",
            "econnreset", "connection", "conexión", "offline", "dns", "aborterror", "net::err",
        ],
    ),
    (
        ErrorCategory::System,
        &["quota", "storage", "out of memory", "indexeddb", "localstorage"],
    ),
    (
        ErrorCategory::Client,
        &[
            "typeerror", "referenceerror", "syntaxerror", "rangeerror", "undefined is not",
            "cannot read propert", "is not a function",
        ],
    ),
];

fn strong_status(status: u16) -> Option<ErrorCategory> {
    match status {
        401 => Some(ErrorCategory::Authentication),
        402 => Some(ErrorCategory::Payment),
        403 => Some(ErrorCategory::Authorization),
        413 | 415 => Some(ErrorCategory::FileUpload),
        _ => None,
    }
}

fn weak_status(status: u16) -> Option<ErrorCategory> {
    match status {
        0 | 408 => Some(ErrorCategory::Network),
        400 | 422 => Some(ErrorCategory::Validation),
        429 | 500..=599 => Some(ErrorCategory::Server),
        _ => None,
    }
}

fn match_keywords(haystack: &str, rules: &[KeywordRule]) -> Option<ErrorCategory> {
    rules
        .iter()
        .find(|(_, words)| words.iter().any(|w| haystack.contains(w)))
        .map(|(category, _)| *category)
}

/// Failure classifier.
///
/// Holds only the message catalog and the retry limit stamped on new records;
/// classification itself is side-effect free.
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<dyn MessageCatalog>,
    max_retries: u32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(TableCatalog::builtin()), 3)
    }
}

impl Classifier {
    /// Create a classifier.
    ///
    /// # Arguments
    /// * `catalog` - Source of user-facing messages
    /// * `max_retries` - Automatic retry budget stamped on every record
    pub fn new(catalog: Arc<dyn MessageCatalog>, max_retries: u32) -> Self {
        Self {
            catalog,
            max_retries,
        }
    }

    /// Replace the message catalog.
    pub fn with_catalog(mut self, catalog: Arc<dyn MessageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn MessageCatalog> {
        &self.catalog
    }

    /// Infer the category of a failure. Never fails; `Unknown` when nothing
    /// matches.
    pub fn infer_category(raw: &RawFailure, context: &AmbientContext) -> ErrorCategory {
        if let Some(hint) = raw.category_hint {
            return hint;
        }
        if let Some(category) = raw.details.implied_category() {
            return category;
        }
        if let Some(category) = raw.status.and_then(strong_status) {
            return category;
        }

        let mut haystack = raw.message.to_lowercase();
        if let Some(kind) = &raw.kind {
            haystack.push(' ');
            haystack.push_str(&kind.to_lowercase());
        }

        match_keywords(&haystack, LEADING_KEYWORDS)
            .or_else(|| match_keywords(&haystack, DOMAIN_KEYWORDS))
            .or_else(|| raw.status.and_then(weak_status))
            .or_else(|| match_keywords(&haystack, GENERIC_KEYWORDS))
            .or_else(|| context.connectivity.is_offline().then_some(ErrorCategory::Network))
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Classify a raw failure into a record with default (unfiltered)
    /// strategies.
    pub fn classify(&self, raw: &RawFailure, context: &AmbientContext) -> ErrorRecord {
        let category = Self::infer_category(raw, context);
        let details = Self::derive_details(category, raw, context);
        let user_message = self.catalog.user_message(category, context.user_context);

        ErrorRecord::from_parts(RecordParts {
            category,
            user_context: context.user_context,
            platform_area: context.platform_area,
            message: raw.message.clone(),
            user_message,
            details,
            user_id: context.user_id.clone(),
            operation_key: raw.operation_key.clone(),
            max_retries: self.max_retries,
            timestamp: Utc::now(),
        })
    }

    fn derive_details(
        category: ErrorCategory,
        raw: &RawFailure,
        context: &AmbientContext,
    ) -> ErrorDetails {
        if raw.details.implied_category() == Some(category) {
            return raw.details.clone();
        }
        let message = raw.message.to_lowercase();
        match category {
            ErrorCategory::Network => ErrorDetails::Network {
                connection_type: context.connection_type.clone(),
                is_offline: context.connectivity.is_offline(),
            },
            ErrorCategory::Authentication => ErrorDetails::Authentication {
                auth_type: None,
                session_expired: message.contains("expired") || message.contains("expirad"),
            },
            _ => ErrorDetails::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{RecoveryStrategy, Severity};

    fn infer(raw: RawFailure) -> ErrorCategory {
        Classifier::infer_category(&raw, &AmbientContext::default())
    }

    #[test]
    fn test_explicit_hint_should_win_over_message_signals() {
        let raw = RawFailure::new("Failed to fetch").with_category(ErrorCategory::Payment);
        assert_eq!(infer(raw), ErrorCategory::Payment);
    }

    #[test]
    fn test_keywords_should_infer_common_categories() {
        assert_eq!(infer(RawFailure::new("TypeError: Failed to fetch")), ErrorCategory::Network);
        assert_eq!(infer(RawFailure::new("Card declined by issuer")), ErrorCategory::Payment);
        assert_eq!(infer(RawFailure::new("JWT expired")), ErrorCategory::Authentication);
        assert_eq!(infer(RawFailure::new("Access denied for role")), ErrorCategory::Authorization);
        assert_eq!(infer(RawFailure::new("File too large")), ErrorCategory::FileUpload);
        assert_eq!(infer(RawFailure::new("Booking slot taken")), ErrorCategory::Booking);
        assert_eq!(infer(RawFailure::new("WebSocket closed")), ErrorCategory::Chat);
        assert_eq!(infer(RawFailure::new("Email is required")), ErrorCategory::Validation);
        assert_eq!(infer(RawFailure::new("502 Bad Gateway")), ErrorCategory::Server);
        assert_eq!(infer(RawFailure::new("QuotaExceededError: storage full")), ErrorCategory::System);
        assert_eq!(
            infer(RawFailure::new("x is undefined").with_kind("ReferenceError")),
            ErrorCategory::Client
        );
    }

    #[test]
    fn test_transport_signals_should_beat_resource_nouns() {
        // Given: fetch failures whose messages name a marketplace resource
        let bookings = RawFailure::new("TypeError: Failed to fetch /api/bookings");
        let checkout = RawFailure::new("net::ERR_CONNECTION_REFUSED while loading checkout");

        // Then: both are network failures, low severity and auto-recoverable
        assert_eq!(infer(bookings.clone()), ErrorCategory::Network);
        assert_eq!(infer(checkout), ErrorCategory::Network);
        let record = Classifier::default().classify(&bookings, &AmbientContext::default());
        assert_eq!(record.severity(), Severity::Low);
        assert!(record.can_auto_recover());
    }

    #[test]
    fn test_form_rules_should_classify_as_validation_not_authentication() {
        // Given: a password rule violation from a sign-up form
        let raw = RawFailure::new("Password must be at least 8 characters");

        // When: classifying
        let record = Classifier::default().classify(&raw, &AmbientContext::default());

        // Then: it stays a medium validation error with no escalation
        assert_eq!(record.category(), ErrorCategory::Validation);
        assert_eq!(record.severity(), Severity::Medium);
        assert_eq!(record.escalation_level(), 1);
        assert_eq!(infer(RawFailure::new("Invalid password")), ErrorCategory::Authentication);
    }

    #[test]
    fn test_status_codes_should_classify_responses() {
        assert_eq!(infer(RawFailure::new("nope").with_status(401)), ErrorCategory::Authentication);
        assert_eq!(infer(RawFailure::new("nope").with_status(403)), ErrorCategory::Authorization);
        assert_eq!(infer(RawFailure::new("nope").with_status(413)), ErrorCategory::FileUpload);
        assert_eq!(infer(RawFailure::new("nope").with_status(422)), ErrorCategory::Validation);
        assert_eq!(infer(RawFailure::new("nope").with_status(503)), ErrorCategory::Server);
        assert_eq!(infer(RawFailure::new("nope").with_status(0)), ErrorCategory::Network);
    }

    #[test]
    fn test_domain_keyword_should_beat_generic_server_status() {
        let raw = RawFailure::new("payment provider unavailable").with_status(503);
        assert_eq!(infer(raw), ErrorCategory::Payment);
    }

    #[test]
    fn test_offline_context_should_classify_silent_failures_as_network() {
        let raw = RawFailure::new("request aborted without reason");
        let ctx = AmbientContext::default().with_connectivity(ConnectivityStatus::Offline);
        assert_eq!(Classifier::infer_category(&raw, &ctx), ErrorCategory::Network);
    }

    #[test]
    fn test_missing_signals_should_default_to_unknown_low() {
        let record = Classifier::default().classify(&RawFailure::new(""), &AmbientContext::default());
        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert_eq!(record.severity(), Severity::Low);
        assert_eq!(
            record.recovery_strategy(),
            &[RecoveryStrategy::Retry, RecoveryStrategy::ContactSupport]
        );
    }

    #[test]
    fn test_classify_should_derive_network_details_from_context() {
        // Given: a network failure on a cellular link
        let ctx = AmbientContext::new(UserContext::Consumer, PlatformArea::Search)
            .with_connection_type("3g");

        // When: classifying
        let record = Classifier::default().classify(&RawFailure::new("net::ERR_TIMED_OUT"), &ctx);

        // Then: network details carry the link type
        assert_eq!(
            record.details(),
            &ErrorDetails::Network {
                connection_type: Some("3g".to_string()),
                is_offline: false,
            }
        );
        assert!(record.can_auto_recover());
        assert_eq!(record.escalation_level(), 0);
    }

    #[test]
    fn test_classify_should_drop_details_that_disagree_with_hint() {
        let raw = RawFailure::new("declined")
            .with_category(ErrorCategory::Booking)
            .with_details(ErrorDetails::Payment {
                amount: Some(120.0),
                currency: Some("COP".to_string()),
                payment_method: None,
            });

        let record = Classifier::default().classify(&raw, &AmbientContext::default());

        assert_eq!(record.category(), ErrorCategory::Booking);
        assert!(record.details().is_none());
    }

    #[test]
    fn test_classify_should_detect_expired_sessions() {
        let record = Classifier::default()
            .classify(&RawFailure::new("Session expired").with_status(401), &AmbientContext::default());

        assert_eq!(
            record.details(),
            &ErrorDetails::Authentication {
                auth_type: None,
                session_expired: true,
            }
        );
    }

    #[test]
    fn test_user_message_should_come_from_role_aware_catalog() {
        let ctx = AmbientContext::new(UserContext::Provider, PlatformArea::Portfolio);
        let record = Classifier::default().classify(&RawFailure::new("upload failed"), &ctx);
        assert!(record.user_message().contains("portafolio"));
    }
}
