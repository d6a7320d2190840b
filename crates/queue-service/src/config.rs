//! Queue service configuration.
//!
//! Configuration is loaded from environment variables once at startup. The
//! database URL and the QR signing secret are redacted in Debug output.

use crate::crypto::qr_token::MIN_SECRET_LENGTH;
use common::secret::{decode_base64_secret, ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default interval between QR token rotations for a ready student.
pub const DEFAULT_QR_ROTATION_INTERVAL_SECONDS: u64 = 10;

/// Default lifetime of a single QR token.
pub const DEFAULT_QR_TTL_SECONDS: u64 = 15;

/// Default time a called student has to check in.
pub const DEFAULT_NO_SHOW_TIMEOUT_SECONDS: u64 = 120;

/// Default interval of the auto no-show sweep.
pub const DEFAULT_NO_SHOW_SWEEP_INTERVAL_SECONDS: u64 = 5;

/// Default estimated minutes spent per student, used for wait estimates.
pub const DEFAULT_ESTIMATED_MINUTES_PER_STUDENT: u32 = 10;

/// Default shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// Upper bound for any configured interval or timeout (one day).
pub const MAX_DURATION_SECONDS: u64 = 86_400;

/// Queue service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base64 encoded HMAC key for QR tokens. Validated to decode to at least
    /// 32 bytes.
    pub qr_signing_secret: SecretString,

    /// How often a ready student's QR token is replaced.
    pub qr_rotation_interval_seconds: u64,

    /// Lifetime of a single QR token. Never longer than the no-show timeout.
    pub qr_ttl_seconds: u64,

    /// Time a ready student has to scan before being marked no-show.
    pub no_show_timeout_seconds: u64,

    /// How often the auto no-show sweep runs.
    pub no_show_sweep_interval_seconds: u64,

    /// Minutes added to the wait estimate per student ahead.
    pub estimated_minutes_per_student: u32,

    /// Seconds to wait after a shutdown signal before exiting.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("qr_signing_secret", &"[REDACTED]")
            .field(
                "qr_rotation_interval_seconds",
                &self.qr_rotation_interval_seconds,
            )
            .field("qr_ttl_seconds", &self.qr_ttl_seconds)
            .field("no_show_timeout_seconds", &self.no_show_timeout_seconds)
            .field(
                "no_show_sweep_interval_seconds",
                &self.no_show_sweep_interval_seconds,
            )
            .field(
                "estimated_minutes_per_student",
                &self.estimated_minutes_per_student,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid QR signing secret: {0}")]
    InvalidSigningSecret(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid wait estimate configuration: {0}")]
    InvalidWaitEstimate(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let qr_signing_secret = SecretString::from(
            vars.get("QR_SIGNING_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("QR_SIGNING_SECRET".to_string()))?
                .clone(),
        );

        // Validate now so a weak key fails startup rather than the first call-next
        let key = decode_base64_secret(&qr_signing_secret)
            .map_err(|e| ConfigError::InvalidSigningSecret(e.to_string()))?;
        if key.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidSigningSecret(format!(
                "QR_SIGNING_SECRET must decode to at least {} bytes, got {}",
                MIN_SECRET_LENGTH,
                key.expose_secret().len()
            )));
        }

        let qr_rotation_interval_seconds = parse_positive_seconds(
            vars,
            "QR_ROTATION_INTERVAL_SECONDS",
            DEFAULT_QR_ROTATION_INTERVAL_SECONDS,
        )?;

        let qr_ttl_seconds = parse_positive_seconds(vars, "QR_TTL_SECONDS", DEFAULT_QR_TTL_SECONDS)?;

        let no_show_timeout_seconds = parse_positive_seconds(
            vars,
            "NO_SHOW_TIMEOUT_SECONDS",
            DEFAULT_NO_SHOW_TIMEOUT_SECONDS,
        )?;

        if qr_ttl_seconds > no_show_timeout_seconds {
            return Err(ConfigError::InvalidDuration(format!(
                "QR_TTL_SECONDS ({}) must not exceed NO_SHOW_TIMEOUT_SECONDS ({})",
                qr_ttl_seconds, no_show_timeout_seconds
            )));
        }

        if qr_ttl_seconds < qr_rotation_interval_seconds {
            return Err(ConfigError::InvalidDuration(format!(
                "QR_TTL_SECONDS ({}) must be at least QR_ROTATION_INTERVAL_SECONDS ({})",
                qr_ttl_seconds, qr_rotation_interval_seconds
            )));
        }

        let no_show_sweep_interval_seconds = parse_positive_seconds(
            vars,
            "NO_SHOW_SWEEP_INTERVAL_SECONDS",
            DEFAULT_NO_SHOW_SWEEP_INTERVAL_SECONDS,
        )?;

        let estimated_minutes_per_student =
            if let Some(value_str) = vars.get("ESTIMATED_MINUTES_PER_STUDENT") {
                value_str.parse::<u32>().map_err(|e| {
                    ConfigError::InvalidWaitEstimate(format!(
                        "ESTIMATED_MINUTES_PER_STUDENT must be a valid non-negative integer, got '{}': {}",
                        value_str, e
                    ))
                })?
            } else {
                DEFAULT_ESTIMATED_MINUTES_PER_STUDENT
            };

        let drain_seconds = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_DRAIN_SECONDS
        };

        Ok(Config {
            database_url,
            bind_address,
            qr_signing_secret,
            qr_rotation_interval_seconds,
            qr_ttl_seconds,
            no_show_timeout_seconds,
            no_show_sweep_interval_seconds,
            estimated_minutes_per_student,
            drain_seconds,
        })
    }

    pub fn qr_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.qr_rotation_interval_seconds)
    }

    pub fn no_show_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.no_show_sweep_interval_seconds)
    }
}

fn parse_positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    if value > MAX_DURATION_SECONDS {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must not exceed {} seconds, got {}",
            name, MAX_DURATION_SECONDS, value
        )));
    }

    Ok(value)
}
