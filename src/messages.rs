//! User-facing message tables.
//!
//! The classifier asks a [`MessageCatalog`] for text and never hard-codes any
//! itself, so a deployment can swap the table (another language, another
//! tone) by loading a different JSON document.

use crate::category::{ErrorCategory, PlatformArea, RecoveryStrategy, UserContext};
use crate::error::{RecoveryError, RecoveryResult};
use crate::record::ErrorRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Source of localized user messages and contextual hints.
pub trait MessageCatalog: fmt::Debug + Send + Sync {
    /// Message for `category` as seen by `user_context`.
    fn user_message(&self, category: ErrorCategory, user_context: UserContext) -> String;

    /// Short hints rendered next to a record.
    fn recommended_actions(&self, record: &ErrorRecord) -> Vec<String>;
}

/// Messages for one category: a default plus optional per-role overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryMessages {
    pub default: String,
    #[serde(default)]
    pub by_role: HashMap<UserContext, String>,
}

/// Table-driven catalog, (de)serializable as JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableCatalog {
    /// Used when a category has no entry at all.
    pub fallback_message: String,
    #[serde(default)]
    pub messages: HashMap<ErrorCategory, CategoryMessages>,
    #[serde(default)]
    pub category_actions: HashMap<ErrorCategory, Vec<String>>,
    #[serde(default)]
    pub area_actions: HashMap<PlatformArea, Vec<String>>,
    /// Hint appended when the record offers offline mode.
    #[serde(default)]
    pub offline_action: Option<String>,
}

impl TableCatalog {
    /// Parse a catalog from JSON.
    pub fn from_json(json: &str) -> RecoveryResult<Self> {
        let catalog: TableCatalog = serde_json::from_str(json)?;
        if catalog.fallback_message.trim().is_empty() {
            return Err(RecoveryError::configuration(
                "message catalog needs a non-empty fallback_message",
            ));
        }
        Ok(catalog)
    }

    pub fn to_json(&self) -> RecoveryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Built-in Spanish catalog used by default.
    pub fn builtin() -> Self {
        use ErrorCategory::*;
        use UserContext::*;

        let mut messages = HashMap::new();
        let mut add = |category: ErrorCategory, default: &str, roles: &[(UserContext, &str)]| {
            messages.insert(
                category,
                CategoryMessages {
                    default: default.to_string(),
                    by_role: roles
                        .iter()
                        .map(|(role, text)| (*role, text.to_string()))
                        .collect(),
                },
            );
        };

        add(
            Network,
            "Parece que hay un problema de conexión. Verifica tu internet e inténtalo de nuevo.",
            &[],
        );
        add(
            Authentication,
            "Tu sesión ha expirado o no es válida. Inicia sesión nuevamente.",
            &[(Guest, "Necesitas iniciar sesión o crear una cuenta para continuar.")],
        );
        add(
            Authorization,
            "No tienes permisos para realizar esta acción.",
            &[(
                Provider,
                "Tu cuenta de AS aún no tiene acceso a esta función. Revisa el estado de tu perfil.",
            )],
        );
        add(
            Validation,
            "Algunos datos no son válidos. Revisa la información e inténtalo de nuevo.",
            &[],
        );
        add(
            Payment,
            "No pudimos procesar tu pago. Verifica tu método de pago o intenta con otro.",
            &[
                (
                    Consumer,
                    "No pudimos procesar el pago de tu reserva. Verifica tu tarjeta o usa otro método de pago.",
                ),
                (
                    Provider,
                    "No pudimos procesar el cobro de tu plan. Revisa tus datos de facturación.",
                ),
            ],
        );
        add(
            FileUpload,
            "No pudimos subir el archivo. Verifica el formato y el tamaño.",
            &[(
                Provider,
                "No pudimos subir la imagen a tu portafolio. Usa JPG, PNG o WebP de máximo 10MB.",
            )],
        );
        add(
            Chat,
            "El chat no está disponible en este momento. Reintentaremos la conexión.",
            &[],
        );
        add(
            Booking,
            "No pudimos completar la reserva. Inténtalo de nuevo o elige otro horario.",
            &[(
                Provider,
                "No pudimos actualizar la reserva de tu cliente. Revisa tu disponibilidad.",
            )],
        );
        add(
            Subscription,
            "Hubo un problema con tu suscripción. Inténtalo de nuevo en unos minutos.",
            &[],
        );
        add(
            System,
            "La aplicación se quedó sin recursos. Cierra otras pestañas y recarga la página.",
            &[],
        );
        add(
            Server,
            "Nuestros servidores están teniendo problemas. Lo reintentaremos automáticamente.",
            &[(Admin, "Error del servidor. Revisa el panel de estado del sistema.")],
        );
        add(
            Client,
            "Algo salió mal en la aplicación. Recarga la página para continuar.",
            &[],
        );

        let category_actions = [
            (Network, vec!["Verifica tu conexión a internet"]),
            (Authentication, vec!["Inicia sesión nuevamente"]),
            (Validation, vec!["Revisa los campos marcados"]),
            (
                Payment,
                vec![
                    "Verifica los datos de tu tarjeta",
                    "Intenta con otro método de pago",
                ],
            ),
            (
                FileUpload,
                vec!["Usa archivos JPG, PNG o WebP", "Reduce el tamaño a menos de 10MB"],
            ),
            (Booking, vec!["Elige otro horario disponible"]),
            (Server, vec!["Espera unos minutos e inténtalo de nuevo"]),
            (Client, vec!["Recarga la página"]),
        ]
        .into_iter()
        .map(|(c, actions)| (c, actions.into_iter().map(String::from).collect()))
        .collect();

        let area_actions = [
            (
                PlatformArea::Portfolio,
                vec!["Sube las imágenes de una en una"],
            ),
            (
                PlatformArea::Payments,
                vec!["Confirma que tu banco no bloqueó la transacción"],
            ),
            (
                PlatformArea::Chat,
                vec!["Tus mensajes se enviarán al reconectar"],
            ),
        ]
        .into_iter()
        .map(|(a, actions)| (a, actions.into_iter().map(String::from).collect()))
        .collect();

        Self {
            fallback_message: "Ocurrió un error inesperado. Inténtalo de nuevo.".to_string(),
            messages,
            category_actions,
            area_actions,
            offline_action: Some(
                "Puedes seguir navegando sin conexión; sincronizaremos al reconectar".to_string(),
            ),
        }
    }
}

impl MessageCatalog for TableCatalog {
    fn user_message(&self, category: ErrorCategory, user_context: UserContext) -> String {
        match self.messages.get(&category) {
            Some(entry) => entry
                .by_role
                .get(&user_context)
                .unwrap_or(&entry.default)
                .clone(),
            None => self.fallback_message.clone(),
        }
    }

    fn recommended_actions(&self, record: &ErrorRecord) -> Vec<String> {
        let mut actions: Vec<String> = Vec::new();
        let mut push = |action: &String| {
            if !actions.contains(action) {
                actions.push(action.clone());
            }
        };

        if let Some(list) = self.category_actions.get(&record.category()) {
            list.iter().for_each(&mut push);
        }
        if let Some(list) = self.area_actions.get(&record.platform_area()) {
            list.iter().for_each(&mut push);
        }
        if record.has_strategy(RecoveryStrategy::OfflineMode) {
            if let Some(action) = &self.offline_action {
                push(action);
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_should_prefer_role_override() {
        let catalog = TableCatalog::builtin();

        let provider = catalog.user_message(ErrorCategory::FileUpload, UserContext::Provider);
        let consumer = catalog.user_message(ErrorCategory::FileUpload, UserContext::Consumer);

        assert!(provider.contains("portafolio"));
        assert_eq!(
            consumer,
            "No pudimos subir el archivo. Verifica el formato y el tamaño."
        );
    }

    #[test]
    fn test_catalog_should_fall_back_for_unlisted_category() {
        let catalog = TableCatalog::builtin();
        assert_eq!(
            catalog.user_message(ErrorCategory::Unknown, UserContext::Admin),
            catalog.fallback_message
        );
    }

    #[test]
    fn test_catalog_should_load_from_json() {
        // Given: a minimal English catalog
        let json = r#"{
            "fallback_message": "Something went wrong.",
            "messages": {
                "payment": {
                    "default": "Payment failed.",
                    "by_role": { "explorador": "Your booking payment failed." }
                }
            }
        }"#;

        // When: loading it
        let catalog = TableCatalog::from_json(json).unwrap();

        // Then: lookups use the swapped table
        assert_eq!(
            catalog.user_message(ErrorCategory::Payment, UserContext::Consumer),
            "Your booking payment failed."
        );
        assert_eq!(
            catalog.user_message(ErrorCategory::Payment, UserContext::Provider),
            "Payment failed."
        );
        assert_eq!(
            catalog.user_message(ErrorCategory::Network, UserContext::Guest),
            "Something went wrong."
        );
    }

    #[test]
    fn test_catalog_without_fallback_should_be_rejected() {
        let result = TableCatalog::from_json(r#"{ "fallback_message": "  " }"#);
        assert!(matches!(result, Err(RecoveryError::Configuration { .. })));
    }
}
