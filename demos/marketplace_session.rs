//! A short marketplace session driven through the recovery orchestrator.
//!
//! Run with `RUST_LOG=marketplace_recovery=debug` to watch the scheduler and
//! connectivity transitions.

use marketplace_recovery::{
    settings::RetrySettings, AmbientContext, EngineSettings, ErrorCategory, PlatformArea,
    RawFailure, RecoveryEvent, RecoveryOrchestrator, UserContext,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("marketplace_recovery=info".parse()?),
        )
        .init();

    let settings = EngineSettings::default().with_retry(RetrySettings {
        base_delay: Duration::from_millis(200),
        ..RetrySettings::default()
    });
    let orchestrator = RecoveryOrchestrator::builder()
        .with_settings(settings)
        .with_initially_online(false)
        .build();
    let mut events = orchestrator.events();

    info!("Session 1: provider loads bookings while offline");
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let reload_bookings = move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RawFailure::new("net::ERR_CONNECTION_RESET"))
            } else {
                Ok(())
            }
        }
    };
    let record = orchestrator.report_with_action(
        RawFailure::new("TypeError: Failed to fetch").with_operation_key("GET /api/bookings"),
        AmbientContext::new(UserContext::Provider, PlatformArea::Dashboard),
        Arc::new(reload_bookings),
    )?;
    info!(
        category = %record.category(),
        strategies = ?record.recovery_strategy(),
        "reported while offline"
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    orchestrator.set_online(true);

    loop {
        match events.recv().await? {
            RecoveryEvent::RetryScheduled { attempt, delay, .. } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
            }
            RecoveryEvent::RetrySucceeded { attempts, .. } => {
                info!(attempts, "bookings reloaded");
                break;
            }
            RecoveryEvent::RetryExhausted { retry_count, .. } => {
                info!(retry_count, "gave up, manual action needed");
                break;
            }
            _ => {}
        }
    }

    info!("Session 2: explorer keeps failing at checkout");
    for amount in [45_000, 45_000, 90_000] {
        let record = orchestrator.report(
            RawFailure::new("Card declined by issuer").with_category(ErrorCategory::Payment),
            AmbientContext::new(UserContext::Consumer, PlatformArea::Payments)
                .with_user_id("explorador-1138"),
        )?;
        info!(
            amount,
            frustration = orchestrator.frustration_score(),
            actions = ?orchestrator.recommended_actions(&record),
            "checkout failed"
        );
    }

    while let Ok(event) = events.try_recv() {
        if let RecoveryEvent::Escalated(escalation) = event {
            println!("{}", serde_json::to_string_pretty(&escalation)?);
        }
    }

    let snapshot = orchestrator.snapshot();
    info!(
        error_rate = snapshot.error_rate,
        frustration = snapshot.frustration_score,
        offline = snapshot.offline_mode,
        "final health"
    );

    orchestrator.shutdown();
    Ok(())
}
