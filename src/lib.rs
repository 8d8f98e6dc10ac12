//! # Marketplace Recovery
//!
//! Error recovery orchestration for the marketplace client.
//!
//! Failures reported from any feature boundary are classified into a fixed
//! taxonomy, given an ordered list of recovery strategies, tracked in a rolling
//! health window and, when automatic recovery is not enough, escalated to human
//! support with a ready-to-send payload.
//!
//! ## Features
//!
//! - **Classification**: keyword, status and hint based, deterministic
//! - **Fixed policy tables**: severity, auto-recovery, escalation level and
//!   strategies all derive from the category
//! - **Automatic retries**: exponential backoff with jitter, suspended while
//!   offline, cancellable at any point
//! - **Health signals**: lifetime error rate and a 0-100 frustration score
//! - **Escalation**: business-hours aware channel selection and ticket metadata
//! - **Offline mode**: a single durable flag that survives restarts
//!
//! ## Quick Start
//!
//! ```rust
//! use marketplace_recovery::{
//!     AmbientContext, ErrorCategory, PlatformArea, RawFailure, RecoveryOrchestrator,
//!     RecoveryStrategy, Severity, UserContext,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let orchestrator = RecoveryOrchestrator::builder().build();
//!
//! let record = orchestrator
//!     .report(
//!         RawFailure::new("Card declined by issuer"),
//!         AmbientContext::new(UserContext::Consumer, PlatformArea::Payments),
//!     )
//!     .unwrap();
//!
//! assert_eq!(record.category(), ErrorCategory::Payment);
//! assert_eq!(record.severity(), Severity::Critical);
//! assert!(record.has_strategy(RecoveryStrategy::ContactSupport));
//!
//! let escalation = orchestrator.escalate().unwrap();
//! assert_eq!(escalation.estimated_resolution, "2-4 horas");
//! # }
//! ```
//!
//! ## Custom Message Catalogs
//!
//! User-facing text is data. Swap the built-in Spanish table for any JSON
//! document with the same shape:
//!
//! ```rust
//! use marketplace_recovery::{ErrorCategory, MessageCatalog, TableCatalog, UserContext};
//!
//! let catalog = TableCatalog::from_json(r#"{
//!     "fallback_message": "Something went wrong.",
//!     "messages": { "network": { "default": "You appear to be offline." } }
//! }"#).unwrap();
//!
//! assert_eq!(
//!     catalog.user_message(ErrorCategory::Network, UserContext::Guest),
//!     "You appear to be offline."
//! );
//! ```

pub mod category;
pub mod classifier;
pub mod connectivity;
pub mod error;
pub mod escalation;
pub mod health;
pub mod messages;
pub mod offline;
pub mod orchestrator;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod strategy;

pub use category::{ErrorCategory, PlatformArea, RecoveryStrategy, Severity, UserContext};
pub use classifier::{AmbientContext, Classifier, RawFailure};
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySignal, ConnectivityState, ConnectivityStatus, LinkProbe,
    LinkQuality,
};
pub use error::{RecoveryError, RecoveryResult};
pub use escalation::{
    EscalationGenerator, EscalationTrigger, HealthSignals, SupportChannel, SupportEscalation,
    TicketPriority,
};
pub use health::{HealthTracker, HealthUpdate, ResolutionMethod};
pub use messages::{MessageCatalog, TableCatalog};
pub use offline::{FileOfflineStore, MemoryOfflineStore, OfflineFlag, OfflineStore};
pub use orchestrator::{
    RecoveryEvent, RecoveryOrchestrator, RecoveryOrchestratorBuilder, RecoverySnapshot,
    RetryOutcome,
};
pub use record::{DisplayMode, ErrorDetails, ErrorRecord};
pub use retry::RetryPolicy;
pub use scheduler::{RecoveryAction, RetryScheduler, SchedulerState};
pub use settings::EngineSettings;
pub use strategy::StrategySelector;
