//! Error taxonomy and the fixed recovery policy tables.
//!
//! Every other component reads these tables; none of them writes severity,
//! auto-recovery, escalation level or candidate strategies on its own. Adding a
//! category means adding a variant here plus one row in each table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Functional category a failure is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity loss, timeouts, DNS and transport failures.
    Network,
    /// Login, session and token failures.
    Authentication,
    /// The user is authenticated but not allowed to do this.
    Authorization,
    /// Input rejected by client or server validation.
    Validation,
    /// Checkout, card and payout failures.
    Payment,
    /// Portfolio and attachment uploads.
    FileUpload,
    /// Real-time messaging.
    Chat,
    /// Booking creation, rescheduling and availability.
    Booking,
    /// Subscription plans and billing cycles.
    Subscription,
    /// Local platform failures (storage quota, memory).
    System,
    /// Backend returned a 5xx or equivalent.
    Server,
    /// Bugs in the client itself.
    Client,
    /// No signal matched.
    Unknown,
}

impl ErrorCategory {
    /// Every category, in declaration order.
    pub const ALL: [ErrorCategory; 13] = [
        ErrorCategory::Network,
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Validation,
        ErrorCategory::Payment,
        ErrorCategory::FileUpload,
        ErrorCategory::Chat,
        ErrorCategory::Booking,
        ErrorCategory::Subscription,
        ErrorCategory::System,
        ErrorCategory::Server,
        ErrorCategory::Client,
        ErrorCategory::Unknown,
    ];

    /// Stable snake_case name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Payment => "payment",
            ErrorCategory::FileUpload => "file_upload",
            ErrorCategory::Chat => "chat",
            ErrorCategory::Booking => "booking",
            ErrorCategory::Subscription => "subscription",
            ErrorCategory::System => "system",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Severity policy for this category.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCategory::Payment | ErrorCategory::Authentication => Severity::Critical,
            ErrorCategory::Booking | ErrorCategory::FileUpload => Severity::High,
            ErrorCategory::Chat | ErrorCategory::Validation => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Whether the engine may retry this category without asking the user.
    pub fn can_auto_recover(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Chat
        )
    }

    /// How close this category is to needing a human: 0 self-heals, 3 means
    /// immediate contact.
    pub fn escalation_level(&self) -> u8 {
        match self {
            ErrorCategory::Payment | ErrorCategory::Authentication => 3,
            ErrorCategory::Booking | ErrorCategory::Authorization => 2,
            ErrorCategory::Validation | ErrorCategory::FileUpload => 1,
            _ => 0,
        }
    }

    /// Ordered candidate strategies before any connectivity filtering.
    pub fn candidate_strategies(&self) -> &'static [RecoveryStrategy] {
        use RecoveryStrategy::*;
        match self {
            ErrorCategory::Network => &[Retry, Reload, OfflineMode],
            ErrorCategory::Authentication => &[Redirect, Manual],
            ErrorCategory::Authorization => &[ContactSupport, Redirect],
            ErrorCategory::Validation => &[Manual, AutoFix],
            ErrorCategory::Payment => &[Retry, Manual, ContactSupport],
            ErrorCategory::FileUpload => &[Retry, Manual],
            ErrorCategory::Chat => &[Retry, Reload],
            ErrorCategory::Booking => &[Retry, Manual, Fallback],
            ErrorCategory::Server => &[Retry, Reload, ContactSupport],
            ErrorCategory::Client => &[Reload, Retry],
            ErrorCategory::Subscription | ErrorCategory::System | ErrorCategory::Unknown => {
                &[Retry, ContactSupport]
            }
        }
    }

    /// Categories whose retries use the long network backoff cap.
    pub fn uses_network_backoff(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Chat)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Severity, always derived from [`ErrorCategory::severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Active role when the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserContext {
    #[default]
    #[serde(rename = "guest")]
    Guest,
    /// Consumer browsing and booking services.
    #[serde(rename = "explorador")]
    Consumer,
    /// Service provider offering work on the marketplace.
    #[serde(rename = "as")]
    Provider,
    #[serde(rename = "admin")]
    Admin,
}

impl UserContext {
    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            UserContext::Guest => "guest",
            UserContext::Consumer => "explorador",
            UserContext::Provider => "as",
            UserContext::Admin => "admin",
        }
    }

    /// Human-facing role label used in support messages.
    pub fn label(&self) -> &'static str {
        match self {
            UserContext::Guest => "Visitante",
            UserContext::Consumer => "Explorador",
            UserContext::Provider => "AS (proveedor)",
            UserContext::Admin => "Administrador",
        }
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Functional area of the marketplace where the failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformArea {
    Authentication,
    Dashboard,
    Marketplace,
    Chat,
    Payments,
    Portfolio,
    Booking,
    Profile,
    Search,
    Subscription,
    Notifications,
    Settings,
    #[default]
    General,
}

impl PlatformArea {
    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            PlatformArea::Authentication => "authentication",
            PlatformArea::Dashboard => "dashboard",
            PlatformArea::Marketplace => "marketplace",
            PlatformArea::Chat => "chat",
            PlatformArea::Payments => "payments",
            PlatformArea::Portfolio => "portfolio",
            PlatformArea::Booking => "booking",
            PlatformArea::Profile => "profile",
            PlatformArea::Search => "search",
            PlatformArea::Subscription => "subscription",
            PlatformArea::Notifications => "notifications",
            PlatformArea::Settings => "settings",
            PlatformArea::General => "general",
        }
    }

    /// Support team that owns incidents raised from this area.
    pub fn support_team(&self) -> &'static str {
        match self {
            PlatformArea::Payments | PlatformArea::Subscription => "billing",
            PlatformArea::Booking => "bookings",
            PlatformArea::Portfolio | PlatformArea::Profile => "content",
            PlatformArea::Authentication | PlatformArea::Settings => "accounts",
            PlatformArea::Chat | PlatformArea::Notifications => "messaging",
            _ => "general",
        }
    }
}

impl fmt::Display for PlatformArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remediation approach offered for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Reload,
    Redirect,
    Manual,
    ContactSupport,
    OfflineMode,
    AutoFix,
    Fallback,
}

impl RecoveryStrategy {
    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::Reload => "reload",
            RecoveryStrategy::Redirect => "redirect",
            RecoveryStrategy::Manual => "manual",
            RecoveryStrategy::ContactSupport => "contact_support",
            RecoveryStrategy::OfflineMode => "offline_mode",
            RecoveryStrategy::AutoFix => "auto_fix",
            RecoveryStrategy::Fallback => "fallback",
        }
    }

    /// Strategies that cannot work without a network round trip.
    pub fn needs_network(&self) -> bool {
        matches!(self, RecoveryStrategy::Retry | RecoveryStrategy::Reload)
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_table_should_match_policy_for_every_category() {
        // Given: the full category set and the expected severity policy
        let expected = |c: ErrorCategory| match c {
            ErrorCategory::Payment | ErrorCategory::Authentication => Severity::Critical,
            ErrorCategory::Booking | ErrorCategory::FileUpload => Severity::High,
            ErrorCategory::Chat | ErrorCategory::Validation => Severity::Medium,
            _ => Severity::Low,
        };

        // When/Then: each category maps to its policy severity
        for category in ErrorCategory::ALL {
            assert_eq!(category.severity(), expected(category), "{category}");
        }
    }

    #[test]
    fn test_auto_recovery_should_be_limited_to_transient_categories() {
        let recoverable: Vec<_> = ErrorCategory::ALL
            .into_iter()
            .filter(|c| c.can_auto_recover())
            .collect();

        assert_eq!(
            recoverable,
            vec![ErrorCategory::Network, ErrorCategory::Chat, ErrorCategory::Server]
        );
    }

    #[test]
    fn test_escalation_levels_should_follow_policy() {
        assert_eq!(ErrorCategory::Payment.escalation_level(), 3);
        assert_eq!(ErrorCategory::Authentication.escalation_level(), 3);
        assert_eq!(ErrorCategory::Booking.escalation_level(), 2);
        assert_eq!(ErrorCategory::Authorization.escalation_level(), 2);
        assert_eq!(ErrorCategory::Validation.escalation_level(), 1);
        assert_eq!(ErrorCategory::FileUpload.escalation_level(), 1);
        assert_eq!(ErrorCategory::Network.escalation_level(), 0);
        assert_eq!(ErrorCategory::Unknown.escalation_level(), 0);
    }

    #[test]
    fn test_candidate_strategies_should_keep_table_order() {
        use RecoveryStrategy::*;
        assert_eq!(
            ErrorCategory::Network.candidate_strategies(),
            &[Retry, Reload, OfflineMode]
        );
        assert_eq!(ErrorCategory::Validation.candidate_strategies(), &[Manual, AutoFix]);
        assert_eq!(ErrorCategory::Client.candidate_strategies(), &[Reload, Retry]);
        assert_eq!(
            ErrorCategory::Subscription.candidate_strategies(),
            &[Retry, ContactSupport]
        );
    }

    #[test]
    fn test_user_context_should_serialize_with_marketplace_role_names() {
        assert_eq!(
            serde_json::to_string(&UserContext::Consumer).unwrap(),
            "\"explorador\""
        );
        assert_eq!(serde_json::to_string(&UserContext::Provider).unwrap(), "\"as\"");
        let parsed: UserContext = serde_json::from_str("\"as\"").unwrap();
        assert_eq!(parsed, UserContext::Provider);
    }

    #[test]
    fn test_severity_ordering_should_rank_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
