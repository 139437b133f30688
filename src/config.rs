//! Runtime configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::guard::DEFAULT_ADMISSION_TIMEOUT;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;
/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Configuration of the deletion guard process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardConfig {
    pub webhook_port: u16,
    pub health_port: u16,
    pub cert_path: String,
    pub key_path: String,
    /// Upper bound for one validation
    pub admission_timeout: Duration,
    /// Optional bound on concurrent checks during a collection delete
    pub fanout_max_concurrency: Option<usize>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            webhook_port: WEBHOOK_PORT,
            health_port: HEALTH_PORT,
            cert_path: WEBHOOK_CERT_PATH.to_string(),
            key_path: WEBHOOK_KEY_PATH.to_string(),
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            fanout_max_concurrency: None,
        }
    }
}

impl GuardConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Invalid values fall back to
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            webhook_port: parse_or(&lookup, "WEBHOOK_PORT", defaults.webhook_port),
            health_port: parse_or(&lookup, "HEALTH_PORT", defaults.health_port),
            cert_path: lookup("WEBHOOK_CERT_PATH").unwrap_or(defaults.cert_path),
            key_path: lookup("WEBHOOK_KEY_PATH").unwrap_or(defaults.key_path),
            admission_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ADMISSION_TIMEOUT_SECS",
                defaults.admission_timeout.as_secs(),
            )),
            fanout_max_concurrency: lookup("FANOUT_MAX_CONCURRENCY")
                .and_then(|raw| match raw.parse::<usize>() {
                    Ok(0) => None,
                    Ok(n) => Some(n),
                    Err(_) => {
                        warn!(
                            value = %raw,
                            "Invalid FANOUT_MAX_CONCURRENCY, using unbounded fan-out"
                        );
                        None
                    }
                }),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}
