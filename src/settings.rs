//! Engine configuration and environment variable handling.
//!
//! All recovery policy numbers (backoff, frustration weights, business hours,
//! debounce) live here so they can be tuned without touching the components.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Backoff and retry limits for the retry scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Maximum automatic retries per record.
    pub max_retries: u32,
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Backoff cap for network-bound categories.
    pub network_max_delay: Duration,
    /// Backoff cap for everything else.
    pub generic_max_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of the backoff.
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            network_max_delay: Duration::from_millis(30_000),
            generic_max_delay: Duration::from_millis(10_000),
            jitter_fraction: 0.3,
        }
    }
}

/// Window and weights for the aggregate health tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSettings {
    /// Maximum entries kept in the health window.
    pub capacity: usize,
    /// Trailing horizon the frustration score looks at.
    pub frustration_window: Duration,
    /// Points per unresolved entry in the window.
    pub unresolved_weight: f64,
    /// Cap on the total unresolved contribution.
    pub unresolved_cap: f64,
    /// Points per critical entry in the window.
    pub critical_weight: f64,
    /// Points per entry in the window.
    pub volume_weight: f64,
    /// Cap on the total volume contribution.
    pub volume_cap: f64,
    /// Frustration above which escalation is triggered.
    pub escalation_threshold: f64,
    /// Points removed by a manual clear.
    pub clear_decay: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            capacity: 20,
            frustration_window: Duration::from_secs(5 * 60),
            unresolved_weight: 15.0,
            unresolved_cap: 60.0,
            critical_weight: 25.0,
            volume_weight: 5.0,
            volume_cap: 50.0,
            escalation_threshold: 70.0,
            clear_decay: 20.0,
        }
    }
}

/// Thresholds for the connectivity monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivitySettings {
    /// Minimum spacing between published state changes.
    pub debounce: Duration,
    /// Round-trip time at or above which the link counts as slow.
    pub slow_rtt: Duration,
    /// Downlink bandwidth (Mbps) below which the link counts as slow.
    pub slow_downlink_mbps: f64,
    /// Online/offline flips within `flap_window` that make the link unstable.
    pub flap_threshold: usize,
    pub flap_window: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            slow_rtt: Duration::from_millis(500),
            slow_downlink_mbps: 1.0,
            flap_threshold: 3,
            flap_window: Duration::from_secs(30),
        }
    }
}

/// Support desk availability and contact targets.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportSettings {
    /// Offset of the business timezone from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// First open hour (inclusive), local business time.
    pub open_hour: u32,
    /// Closing hour (exclusive), local business time.
    pub close_hour: u32,
    pub phone_number: String,
    pub whatsapp_number: String,
    pub live_chat_route: String,
    pub email_address: String,
}

impl Default for SupportSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: -300,
            open_hour: 9,
            close_hour: 18,
            phone_number: "+57 601 555 0100".to_string(),
            whatsapp_number: "+57 300 555 0100".to_string(),
            live_chat_route: "/soporte/chat".to_string(),
            email_address: "soporte@marketplace.example".to_string(),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub retry: RetrySettings,
    pub health: HealthSettings,
    pub connectivity: ConnectivitySettings,
    pub support: SupportSettings,
    /// Persist the offline flag and suspend retries while offline.
    pub enable_offline_support: bool,
    /// Location of the durable offline flag; in-memory when unset.
    pub offline_flag_path: Option<PathBuf>,
    /// Emit a tracing event for every reported error.
    pub log_errors: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            health: HealthSettings::default(),
            connectivity: ConnectivitySettings::default(),
            support: SupportSettings::default(),
            enable_offline_support: true,
            offline_flag_path: None,
            log_errors: true,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

impl EngineSettings {
    /// Get global engine settings from environment variables.
    ///
    /// Loaded once on first access and cached for the process lifetime.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RECOVERY_MAX_RETRIES` | `3` | Automatic retries per record |
    /// | `RECOVERY_BASE_DELAY_MS` | `1000` | Backoff for attempt 0 |
    /// | `RECOVERY_NETWORK_MAX_DELAY_MS` | `30000` | Backoff cap, network |
    /// | `RECOVERY_GENERIC_MAX_DELAY_MS` | `10000` | Backoff cap, other |
    /// | `RECOVERY_JITTER_FRACTION` | `0.3` | Max extra random delay |
    /// | `RECOVERY_HEALTH_CAPACITY` | `20` | Health window size |
    /// | `RECOVERY_FRUSTRATION_WINDOW_SECS` | `300` | Frustration horizon |
    /// | `RECOVERY_ESCALATION_THRESHOLD` | `70` | Auto-escalation trigger |
    /// | `RECOVERY_CLEAR_DECAY` | `20` | Points removed by `clear()` |
    /// | `RECOVERY_DEBOUNCE_MS` | `250` | Connectivity debounce |
    /// | `RECOVERY_SUPPORT_UTC_OFFSET_MINUTES` | `-300` | Business timezone |
    /// | `RECOVERY_SUPPORT_OPEN_HOUR` | `9` | Business hours start |
    /// | `RECOVERY_SUPPORT_CLOSE_HOUR` | `18` | Business hours end |
    /// | `RECOVERY_OFFLINE_SUPPORT` | `true` | Offline mode handling |
    /// | `RECOVERY_OFFLINE_FLAG_PATH` | - | File for the durable flag |
    /// | `RECOVERY_LOG_ERRORS` | `true` | Trace every report |
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static SETTINGS: OnceLock<EngineSettings> = OnceLock::new();

        SETTINGS.get_or_init(Self::from_env)
    }

    /// Build settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retry = RetrySettings {
            max_retries: env_parse("RECOVERY_MAX_RETRIES").unwrap_or(defaults.retry.max_retries),
            base_delay: env_millis("RECOVERY_BASE_DELAY_MS").unwrap_or(defaults.retry.base_delay),
            network_max_delay: env_millis("RECOVERY_NETWORK_MAX_DELAY_MS")
                .unwrap_or(defaults.retry.network_max_delay),
            generic_max_delay: env_millis("RECOVERY_GENERIC_MAX_DELAY_MS")
                .unwrap_or(defaults.retry.generic_max_delay),
            jitter_fraction: env_parse::<f64>("RECOVERY_JITTER_FRACTION")
                .map(|f| f.clamp(0.0, 1.0))
                .unwrap_or(defaults.retry.jitter_fraction),
        };

        let health = HealthSettings {
            capacity: env_parse::<usize>("RECOVERY_HEALTH_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.health.capacity),
            frustration_window: env_parse::<u64>("RECOVERY_FRUSTRATION_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.health.frustration_window),
            escalation_threshold: env_parse("RECOVERY_ESCALATION_THRESHOLD")
                .unwrap_or(defaults.health.escalation_threshold),
            clear_decay: env_parse("RECOVERY_CLEAR_DECAY").unwrap_or(defaults.health.clear_decay),
            ..defaults.health
        };

        let connectivity = ConnectivitySettings {
            debounce: env_millis("RECOVERY_DEBOUNCE_MS").unwrap_or(defaults.connectivity.debounce),
            ..defaults.connectivity
        };

        let support = SupportSettings {
            utc_offset_minutes: env_parse("RECOVERY_SUPPORT_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.support.utc_offset_minutes),
            open_hour: env_parse("RECOVERY_SUPPORT_OPEN_HOUR").unwrap_or(defaults.support.open_hour),
            close_hour: env_parse("RECOVERY_SUPPORT_CLOSE_HOUR")
                .unwrap_or(defaults.support.close_hour),
            ..defaults.support
        };

        Self {
            retry,
            health,
            connectivity,
            support,
            enable_offline_support: env_bool("RECOVERY_OFFLINE_SUPPORT")
                .unwrap_or(defaults.enable_offline_support),
            offline_flag_path: std::env::var("RECOVERY_OFFLINE_FLAG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            log_errors: env_bool("RECOVERY_LOG_ERRORS").unwrap_or(defaults.log_errors),
        }
    }

    /// Disable offline handling (builder style, mostly for tests).
    pub fn without_offline_support(mut self) -> Self {
        self.enable_offline_support = false;
        self
    }

    /// Override the retry settings.
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Override the support desk settings.
    pub fn with_support(mut self, support: SupportSettings) -> Self {
        self.support = support;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_default_should_carry_policy_numbers() {
        // Given: default settings
        let settings = EngineSettings::default();

        // Then: the documented policy values are in place
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.retry.base_delay, Duration::from_secs(1));
        assert_eq!(settings.retry.network_max_delay, Duration::from_secs(30));
        assert_eq!(settings.retry.generic_max_delay, Duration::from_secs(10));
        assert_eq!(settings.health.capacity, 20);
        assert_eq!(settings.health.frustration_window, Duration::from_secs(300));
        assert_eq!(settings.health.escalation_threshold, 70.0);
        assert_eq!(settings.connectivity.debounce, Duration::from_millis(250));
        assert_eq!(settings.support.open_hour, 9);
        assert_eq!(settings.support.close_hour, 18);
        assert!(settings.enable_offline_support);
        assert!(settings.log_errors);
    }

    #[test]
    fn test_engine_settings_from_env_should_override_and_ignore_garbage() {
        // Given: a mix of valid and invalid overrides
        std::env::set_var("RECOVERY_MAX_RETRIES", "5");
        std::env::set_var("RECOVERY_BASE_DELAY_MS", "not-a-number");
        std::env::set_var("RECOVERY_OFFLINE_SUPPORT", "false");
        std::env::set_var("RECOVERY_JITTER_FRACTION", "4.0");

        // When: loading from the environment
        let settings = EngineSettings::from_env();

        // Then: valid values apply, invalid ones fall back, fractions clamp
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(1000));
        assert!(!settings.enable_offline_support);
        assert_eq!(settings.retry.jitter_fraction, 1.0);

        std::env::remove_var("RECOVERY_MAX_RETRIES");
        std::env::remove_var("RECOVERY_BASE_DELAY_MS");
        std::env::remove_var("RECOVERY_OFFLINE_SUPPORT");
        std::env::remove_var("RECOVERY_JITTER_FRACTION");
    }

    #[test]
    fn test_builder_overrides_should_replace_sections() {
        let settings = EngineSettings::default()
            .without_offline_support()
            .with_retry(RetrySettings {
                max_retries: 1,
                ..RetrySettings::default()
            });

        assert!(!settings.enable_offline_support);
        assert_eq!(settings.retry.max_retries, 1);
    }
}
