//! Support escalation payloads.
//!
//! The generator picks a contact channel, derives ticket metadata and renders
//! the message a channel adapter will send. It does no I/O. If business hours
//! cannot be evaluated (no clock reading, unusable configuration) only email is
//! offered.

use crate::category::{ErrorCategory, PlatformArea, Severity, UserContext};
use crate::record::ErrorRecord;
use crate::settings::SupportSettings;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Contact channel offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportChannel {
    Phone,
    Whatsapp,
    LiveChat,
    Email,
}

impl SupportChannel {
    /// Channels staffed only inside business hours.
    pub fn business_hours_only(&self) -> bool {
        !matches!(self, SupportChannel::Email)
    }

    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            SupportChannel::Phone => "phone",
            SupportChannel::Whatsapp => "whatsapp",
            SupportChannel::LiveChat => "live_chat",
            SupportChannel::Email => "email",
        }
    }
}

impl fmt::Display for SupportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ticket priority, mapped 1:1 from severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Urgent,
    High,
    Medium,
    Low,
}

impl TicketPriority {
    /// Map a record severity onto a ticket priority.
    ///
    /// # Arguments
    /// * `severity` - Severity of the record being escalated
    ///
    /// # Returns
    /// `Urgent` for critical down to `Low` for low.
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => TicketPriority::Urgent,
            Severity::High => TicketPriority::High,
            Severity::Medium => TicketPriority::Medium,
            Severity::Low => TicketPriority::Low,
        }
    }

    /// Resolution window promised to the user for this priority.
    pub fn estimated_resolution(&self) -> &'static str {
        match self {
            TicketPriority::Urgent => "2-4 horas",
            TicketPriority::High => "4-8 horas",
            TicketPriority::Medium => "24-48 horas",
            TicketPriority::Low => "2-3 días",
        }
    }

    /// Stable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            TicketPriority::Urgent => "urgent",
            TicketPriority::High => "high",
            TicketPriority::Medium => "medium",
            TicketPriority::Low => "low",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mon-Fri opening window in the business timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    offset: FixedOffset,
    open_hour: u32,
    close_hour: u32,
}

impl BusinessHours {
    /// `None` when the configured window or offset is unusable.
    pub fn from_settings(settings: &SupportSettings) -> Option<Self> {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes.checked_mul(60)?)?;
        if settings.open_hour >= settings.close_hour || settings.close_hour > 24 {
            return None;
        }
        Some(Self {
            offset,
            open_hour: settings.open_hour,
            close_hour: settings.close_hour,
        })
    }

    /// Whether `now` falls on a weekday between the opening and closing hour,
    /// in the support desk's local time.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        (self.open_hour..self.close_hour).contains(&local.hour())
    }
}

/// What caused an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// The user asked for help.
    Manual,
    /// Frustration crossed the threshold with a global error showing.
    Frustration,
    /// Critical record not recovered within one retry cycle.
    CriticalFailure,
}

/// Health readings attached to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HealthSignals {
    pub frustration_score: f64,
    pub error_rate: f64,
}

/// Structured contact payload handed to a channel adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportEscalation {
    pub ticket_id: String,
    pub error_id: Uuid,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub platform_area: PlatformArea,
    pub user_context: UserContext,
    pub user_id: Option<String>,
    pub priority: TicketPriority,
    pub estimated_resolution: String,
    pub channel: SupportChannel,
    /// Phone number, WhatsApp number, chat route or mailbox for `channel`.
    pub contact_target: String,
    pub available_channels: Vec<SupportChannel>,
    pub team: String,
    pub subject: String,
    pub message: String,
    pub frustration_score: f64,
    pub error_rate: f64,
    pub trigger: EscalationTrigger,
    pub created_at: DateTime<Utc>,
}

/// Builds [`SupportEscalation`] payloads.
#[derive(Debug, Clone, Default)]
pub struct EscalationGenerator {
    support: SupportSettings,
}

impl EscalationGenerator {
    /// Create a generator for the given support desk configuration.
    pub fn new(support: SupportSettings) -> Self {
        Self { support }
    }

    pub fn settings(&self) -> &SupportSettings {
        &self.support
    }

    /// Channels usable at `now`. Email is always included.
    pub fn available_channels(&self, now: Option<DateTime<Utc>>) -> Vec<SupportChannel> {
        let open = match (now, BusinessHours::from_settings(&self.support)) {
            (Some(now), Some(hours)) => hours.contains(now),
            _ => false,
        };
        if open {
            vec![
                SupportChannel::Phone,
                SupportChannel::Whatsapp,
                SupportChannel::LiveChat,
                SupportChannel::Email,
            ]
        } else {
            vec![SupportChannel::Email]
        }
    }

    /// Highest-priority available channel for a record of `severity`.
    pub fn select_channel(severity: Severity, available: &[SupportChannel]) -> SupportChannel {
        let order: &[SupportChannel] = if severity == Severity::Critical {
            &[
                SupportChannel::Phone,
                SupportChannel::Whatsapp,
                SupportChannel::LiveChat,
                SupportChannel::Email,
            ]
        } else {
            &[
                SupportChannel::Whatsapp,
                SupportChannel::LiveChat,
                SupportChannel::Email,
            ]
        };
        order
            .iter()
            .copied()
            .find(|channel| available.contains(channel))
            .unwrap_or(SupportChannel::Email)
    }

    /// Configured number, route or address for a channel.
    pub fn contact_target(&self, channel: SupportChannel) -> &str {
        match channel {
            SupportChannel::Phone => &self.support.phone_number,
            SupportChannel::Whatsapp => &self.support.whatsapp_number,
            SupportChannel::LiveChat => &self.support.live_chat_route,
            SupportChannel::Email => &self.support.email_address,
        }
    }

    /// Build the payload for `record`. `now` is the wall clock used for the
    /// business-hours check; pass `None` when it is unavailable.
    pub fn generate(
        &self,
        record: &ErrorRecord,
        signals: HealthSignals,
        trigger: EscalationTrigger,
        now: Option<DateTime<Utc>>,
    ) -> SupportEscalation {
        let available = self.available_channels(now);
        let channel = Self::select_channel(record.severity(), &available);
        let priority = TicketPriority::from_severity(record.severity());

        SupportEscalation {
            ticket_id: ticket_id(),
            error_id: record.id(),
            category: record.category(),
            severity: record.severity(),
            platform_area: record.platform_area(),
            user_context: record.user_context(),
            user_id: record.user_id().map(str::to_string),
            priority,
            estimated_resolution: priority.estimated_resolution().to_string(),
            channel,
            contact_target: self.contact_target(channel).to_string(),
            available_channels: available,
            team: record.platform_area().support_team().to_string(),
            subject: format!(
                "[{}] Error de {} en {}",
                priority,
                record.category(),
                record.platform_area()
            ),
            message: render_message(record),
            frustration_score: signals.frustration_score,
            error_rate: signals.error_rate,
            trigger,
            created_at: now.unwrap_or_else(Utc::now),
        }
    }
}

fn ticket_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("SUP-{}", simple[..8].to_uppercase())
}

/// One extra sentence for role and area combinations support often sees.
pub fn contextual_hint(user_context: UserContext, area: PlatformArea) -> Option<&'static str> {
    use PlatformArea as A;
    use UserContext as U;
    match (user_context, area) {
        (U::Provider, A::Portfolio) => Some(
            "Estaba subiendo imágenes a mi portafolio (JPG, PNG o WebP de máximo 10MB).",
        ),
        (U::Provider, A::Subscription) | (U::Provider, A::Payments) => {
            Some("Soy AS y el problema afecta el pago de mi plan de suscripción.")
        }
        (U::Provider, A::Booking) => Some("Estaba gestionando la reserva de un cliente."),
        (U::Consumer, A::Booking) => Some("Estaba intentando reservar un servicio."),
        (U::Consumer, A::Payments) => {
            Some("Estaba pagando una reserva y no sé si se realizó el cobro.")
        }
        (U::Consumer, A::Chat) | (U::Provider, A::Chat) => {
            Some("No puedo enviar ni recibir mensajes en el chat.")
        }
        (U::Guest, A::Authentication) => Some("Estaba intentando iniciar sesión o registrarme."),
        _ => None,
    }
}

fn render_message(record: &ErrorRecord) -> String {
    let mut lines = vec![
        "Hola, necesito ayuda con un error en la plataforma.".to_string(),
        String::new(),
        format!("ID del error: {}", record.id()),
        format!("Categoría: {}", record.category()),
        format!("Área: {}", record.platform_area()),
        format!("Rol: {}", record.user_context().label()),
        format!("Mensaje: {}", record.user_message()),
    ];
    if let Some(user_id) = record.user_id() {
        lines.push(format!("Usuario: {user_id}"));
    }
    if let Some(hint) = contextual_hint(record.user_context(), record.platform_area()) {
        lines.push(String::new());
        lines.push(hint.to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{AmbientContext, Classifier, RawFailure};
    use chrono::TimeZone;

    fn wednesday_10am_local() -> DateTime<Utc> {
        // 15:00 UTC is 10:00 at UTC-5
        Utc.with_ymd_and_hms(2026, 10, 14, 15, 0, 0).unwrap()
    }

    fn record(category: ErrorCategory, user: UserContext, area: PlatformArea) -> ErrorRecord {
        Classifier::default().classify(
            &RawFailure::new("failure").with_category(category),
            &AmbientContext::new(user, area).with_user_id("user-42"),
        )
    }

    #[test]
    fn test_priority_should_map_from_severity() {
        assert_eq!(TicketPriority::from_severity(Severity::Critical), TicketPriority::Urgent);
        assert_eq!(TicketPriority::Urgent.estimated_resolution(), "2-4 horas");
        assert_eq!(TicketPriority::High.estimated_resolution(), "4-8 horas");
        assert_eq!(TicketPriority::Medium.estimated_resolution(), "24-48 horas");
        assert_eq!(TicketPriority::Low.estimated_resolution(), "2-3 días");
    }

    #[test]
    fn test_inside_hours_should_offer_every_channel() {
        let generator = EscalationGenerator::default();
        let channels = generator.available_channels(Some(wednesday_10am_local()));
        assert_eq!(channels.len(), 4);
    }

    #[test]
    fn test_outside_hours_should_only_offer_email() {
        // Given: Saturday, and a weekday evening in the business timezone
        let generator = EscalationGenerator::default();
        let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 15, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 10, 15, 2, 0, 0).unwrap();

        for now in [saturday, evening] {
            // When: computing availability
            let channels = generator.available_channels(Some(now));

            // Then: no business-hours channel is offered
            assert_eq!(channels, vec![SupportChannel::Email]);
            assert!(channels.iter().all(|c| !c.business_hours_only()));
        }
    }

    #[test]
    fn test_missing_clock_or_bad_config_should_fail_open_to_email() {
        let generator = EscalationGenerator::default();
        assert_eq!(generator.available_channels(None), vec![SupportChannel::Email]);

        let broken = EscalationGenerator::new(SupportSettings {
            open_hour: 18,
            close_hour: 9,
            ..SupportSettings::default()
        });
        assert_eq!(
            broken.available_channels(Some(wednesday_10am_local())),
            vec![SupportChannel::Email]
        );
    }

    #[test]
    fn test_channel_selection_should_prefer_phone_for_critical() {
        let all = [
            SupportChannel::Phone,
            SupportChannel::Whatsapp,
            SupportChannel::LiveChat,
            SupportChannel::Email,
        ];
        assert_eq!(
            EscalationGenerator::select_channel(Severity::Critical, &all),
            SupportChannel::Phone
        );
        assert_eq!(
            EscalationGenerator::select_channel(Severity::High, &all),
            SupportChannel::Whatsapp
        );
        assert_eq!(
            EscalationGenerator::select_channel(Severity::Critical, &[SupportChannel::Email]),
            SupportChannel::Email
        );
    }

    #[test]
    fn test_generate_should_build_contextual_payload() {
        // Given: a provider failing to upload to their portfolio
        let generator = EscalationGenerator::default();
        let rec = record(
            ErrorCategory::FileUpload,
            UserContext::Provider,
            PlatformArea::Portfolio,
        );

        // When: escalating during business hours
        let escalation = generator.generate(
            &rec,
            HealthSignals {
                frustration_score: 40.0,
                error_rate: 0.5,
            },
            EscalationTrigger::Manual,
            Some(wednesday_10am_local()),
        );

        // Then: metadata and message carry the context
        assert!(escalation.ticket_id.starts_with("SUP-"));
        assert_eq!(escalation.ticket_id.len(), 12);
        assert_eq!(escalation.priority, TicketPriority::High);
        assert_eq!(escalation.channel, SupportChannel::Whatsapp);
        assert_eq!(escalation.contact_target, "+57 300 555 0100");
        assert_eq!(escalation.team, "content");
        assert!(escalation.message.contains(&rec.id().to_string()));
        assert!(escalation.message.contains("file_upload"));
        assert!(escalation.message.contains("portfolio"));
        assert!(escalation.message.contains("AS (proveedor)"));
        assert!(escalation.message.contains(rec.user_message()));
        assert!(escalation.message.contains("imágenes"));
        assert_eq!(escalation.user_id.as_deref(), Some("user-42"));
    }

    #[test]
    fn test_generate_without_hint_should_omit_context_sentence() {
        let generator = EscalationGenerator::default();
        let rec = record(ErrorCategory::Server, UserContext::Admin, PlatformArea::Dashboard);

        let escalation = generator.generate(
            &rec,
            HealthSignals::default(),
            EscalationTrigger::Manual,
            None,
        );

        assert_eq!(escalation.channel, SupportChannel::Email);
        assert_eq!(escalation.contact_target, "soporte@marketplace.example");
        // greeting, blank, id, category, area, role, message, user
        assert_eq!(escalation.message.lines().count(), 8);
    }
}
