use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use gpuaudit_application::{DEFAULT_RECENT_WINDOW, PiiDetectorKind, RedactionPolicy};
use gpuaudit_core::AppError;
use tracing_subscriber::EnvFilter;

const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_JOURNAL_PATH: &str = "data/audit.jsonl";

/// Event store backend selected by `AUDIT_STORE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackendConfig {
    /// PostgreSQL `audit_logs` table.
    Postgres { database_url: String },
    /// Local JSON Lines journal.
    Journal { path: PathBuf },
    /// Process memory only.
    Memory,
}

impl StoreBackendConfig {
    /// Returns the `AUDIT_STORE` value of this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Journal { .. } => "journal",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub store: StoreBackendConfig,
    pub api_host: String,
    pub api_port: u16,
    pub operation_timeout: Duration,
    pub recent_window: TimeDelta,
    pub redaction: RedactionPolicy,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let store = match optional("AUDIT_STORE")
            .unwrap_or_else(|| "postgres".to_owned())
            .as_str()
        {
            "postgres" => StoreBackendConfig::Postgres {
                database_url: optional("DATABASE_URL").ok_or_else(|| {
                    AppError::validation("DATABASE_URL", "DATABASE_URL is required")
                })?,
            },
            "journal" => StoreBackendConfig::Journal {
                path: PathBuf::from(
                    optional("AUDIT_JOURNAL_PATH").unwrap_or_else(|| DEFAULT_JOURNAL_PATH.to_owned()),
                ),
            },
            "memory" => StoreBackendConfig::Memory,
            other => {
                return Err(AppError::validation(
                    "AUDIT_STORE",
                    format!("AUDIT_STORE must be 'postgres', 'journal' or 'memory', got '{other}'"),
                ));
            }
        };

        if migrate_only && !matches!(store, StoreBackendConfig::Postgres { .. }) {
            return Err(AppError::validation(
                "AUDIT_STORE",
                "migrate requires AUDIT_STORE=postgres",
            ));
        }

        let api_host = optional("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = parse_or("API_PORT", optional("API_PORT"), 3001_u16)?;

        let timeout_ms = parse_or(
            "AUDIT_OPERATION_TIMEOUT_MS",
            optional("AUDIT_OPERATION_TIMEOUT_MS"),
            DEFAULT_OPERATION_TIMEOUT_MS,
        )?;
        if timeout_ms == 0 {
            return Err(AppError::validation(
                "AUDIT_OPERATION_TIMEOUT_MS",
                "AUDIT_OPERATION_TIMEOUT_MS must be greater than zero",
            ));
        }

        let recent_window = match optional("AUDIT_RECENT_WINDOW_HOURS") {
            None => DEFAULT_RECENT_WINDOW,
            Some(value) => window_from_hours("AUDIT_RECENT_WINDOW_HOURS", &value)?,
        };

        let defaults = RedactionPolicy::default();
        let detectors = match lookup("AUDIT_REDACTION_DETECTORS") {
            None => defaults.detectors,
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(PiiDetectorKind::from_str)
                .collect::<Result<Vec<_>, _>>()?,
        };
        let redaction = RedactionPolicy {
            detectors,
            extra_sensitive_keys: optional("AUDIT_REDACTION_EXTRA_KEYS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(ToOwned::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            max_depth: parse_or(
                "AUDIT_REDACTION_MAX_DEPTH",
                optional("AUDIT_REDACTION_MAX_DEPTH"),
                defaults.max_depth,
            )?,
            max_scan_bytes: parse_or(
                "AUDIT_REDACTION_MAX_SCAN_BYTES",
                optional("AUDIT_REDACTION_MAX_SCAN_BYTES"),
                defaults.max_scan_bytes,
            )?,
            user_id_pepper: optional("AUDIT_USER_ID_PEPPER"),
        };

        Ok(Self {
            migrate_only,
            store,
            api_host,
            api_port,
            operation_timeout: Duration::from_millis(timeout_ms),
            recent_window,
            redaction,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

/// Parses a positive whole number of hours into a window.
pub fn window_from_hours(field: &str, value: &str) -> Result<TimeDelta, AppError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| *hours > 0)
        .and_then(TimeDelta::try_hours)
        .ok_or_else(|| {
            AppError::validation(field, format!("{field} must be a positive number of hours"))
        })
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|error| AppError::validation(name, format!("invalid {name}: {error}"))),
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::TimeDelta;
    use gpuaudit_application::PiiDetectorKind;
    use gpuaudit_core::AppError;

    use super::{ApiConfig, StoreBackendConfig};

    fn load(vars: &[(&str, &str)], migrate_only: bool) -> Result<ApiConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ApiConfig::from_lookup(migrate_only, |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_for_memory_store() {
        let config = load(&[("AUDIT_STORE", "memory")], false);

        assert!(config.as_ref().is_ok_and(|config| {
            config.store == StoreBackendConfig::Memory
                && config.api_port == 3001
                && config.operation_timeout == Duration::from_millis(5_000)
                && config.recent_window == TimeDelta::days(7)
                && config.redaction.detectors == PiiDetectorKind::all()
        }));
    }

    #[test]
    fn postgres_requires_database_url() {
        let result = load(&[], false);

        assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "DATABASE_URL"));
    }

    #[test]
    fn migrate_requires_postgres() {
        let result = load(&[("AUDIT_STORE", "journal")], true);

        assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "AUDIT_STORE"));
    }

    #[test]
    fn redaction_settings_are_parsed() {
        let config = load(
            &[
                ("AUDIT_STORE", "memory"),
                ("AUDIT_REDACTION_DETECTORS", "email, phone"),
                ("AUDIT_REDACTION_EXTRA_KEYS", "patient_id,badge"),
                ("AUDIT_USER_ID_PEPPER", "s3cret"),
                ("AUDIT_RECENT_WINDOW_HOURS", "24"),
            ],
            false,
        );

        assert!(config.is_ok_and(|config| {
            config.redaction.detectors == vec![PiiDetectorKind::Email, PiiDetectorKind::Phone]
                && config.redaction.extra_sensitive_keys == vec!["patient_id", "badge"]
                && config.redaction.user_id_pepper.as_deref() == Some("s3cret")
                && config.recent_window == TimeDelta::hours(24)
        }));
    }

    #[test]
    fn blank_detector_list_disables_detectors() {
        let config = load(
            &[("AUDIT_STORE", "memory"), ("AUDIT_REDACTION_DETECTORS", "")],
            false,
        );

        assert!(config.is_ok_and(|config| config.redaction.detectors.is_empty()));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("AUDIT_STORE", "redis")], false).is_err());
        assert!(load(&[("AUDIT_STORE", "memory"), ("API_PORT", "http")], false).is_err());
        assert!(
            load(
                &[("AUDIT_STORE", "memory"), ("AUDIT_OPERATION_TIMEOUT_MS", "0")],
                false
            )
            .is_err()
        );
        assert!(
            load(
                &[("AUDIT_STORE", "memory"), ("AUDIT_RECENT_WINDOW_HOURS", "-3")],
                false
            )
            .is_err()
        );
        assert!(
            load(
                &[("AUDIT_STORE", "memory"), ("AUDIT_REDACTION_DETECTORS", "retina")],
                false
            )
            .is_err()
        );
    }
}
