pub mod cli;
pub mod toml_config;

use crate::utils::error::{CertError, Result};
use crate::utils::validation::{self, Validate};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";
pub const DEFAULT_RENEW_COMMAND: &str = "sudo certbot renew --non-interactive";
pub const DEFAULT_RESTART_COMMAND: &str = "sudo systemctl restart nginx";
pub const DEFAULT_CERT_DIRECTORY: &str = "/etc/letsencrypt/live";
pub const DEFAULT_LOG_FILE: &str = "certkeeper.log";
pub const DEFAULT_THRESHOLD_DAYS: u32 = 30;
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Settings for the expiry supervisor. Built once at startup and shared
/// read-only with every component.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SupervisorConfig {
    pub check_schedule: String,
    pub expiry_threshold_days: u32,
    pub cert_root_directory: PathBuf,
    pub cert_file_name: String,
    pub renew_command: String,
    pub log_file: PathBuf,
    pub command_timeout_secs: u64,
    pub openssl_bin: String,
    pub restart: RestartConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RestartConfig {
    pub enabled: bool,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EmailConfig {
    pub notifications_enabled: bool,
    pub from: String,
    /// Comma separated list of recipients.
    pub to: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_schedule: DEFAULT_SCHEDULE.to_string(),
            expiry_threshold_days: DEFAULT_THRESHOLD_DAYS,
            cert_root_directory: PathBuf::from(DEFAULT_CERT_DIRECTORY),
            cert_file_name: "cert.pem".to_string(),
            renew_command: DEFAULT_RENEW_COMMAND.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            openssl_bin: "openssl".to_string(),
            restart: RestartConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: DEFAULT_RESTART_COMMAND.to_string(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            notifications_enabled: false,
            from: String::new(),
            to: String::new(),
            smtp_host: String::new(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: String::new(),
            smtp_pass: String::new(),
        }
    }
}

impl EmailConfig {
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }

    /// Port 465 is SMTPS; every other port negotiates STARTTLS.
    pub fn uses_implicit_tls(&self) -> bool {
        self.smtp_port == 465
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`SupervisorConfig::from_env`], with `KEY=value` lines from a
    /// dotenv file filling in keys the process environment does not set.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_error = |e: dotenvy::Error| CertError::FileSystem {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut file_vars = HashMap::new();
        for entry in dotenvy::from_path_iter(path).map_err(file_error)? {
            let (key, value) = entry.map_err(file_error)?;
            file_vars.insert(key, value);
        }

        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    /// Builds the configuration from an environment-style lookup. Keys that
    /// are absent keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        // Older deployments still use the nginx-specific names.
        let get_or_legacy = |key: &str, legacy: &str| get(key).or_else(|| get(legacy));

        if let Some(value) = get("CERT_CHECK_SCHEDULE") {
            config.check_schedule = value;
        }
        if let Some(value) = get("DAYS_BEFORE_EXPIRY") {
            config.expiry_threshold_days = parse_number("DAYS_BEFORE_EXPIRY", &value)?;
        }
        if let Some(value) = get("CERT_DIRECTORY") {
            config.cert_root_directory = PathBuf::from(value);
        }
        if let Some(value) = get("CERT_FILE_NAME") {
            config.cert_file_name = value;
        }
        if let Some(value) = get_or_legacy("RENEW_COMMAND", "CERTBOT_COMMAND") {
            config.renew_command = value;
        }
        if let Some(value) = get("LOG_FILE") {
            config.log_file = PathBuf::from(value);
        }
        if let Some(value) = get("COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = parse_number("COMMAND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("OPENSSL_BIN") {
            config.openssl_bin = value;
        }

        if let Some(value) = get_or_legacy("RESTART_ENABLED", "RESTART_NGINX") {
            config.restart.enabled = parse_flag(&value);
        }
        if let Some(value) = get_or_legacy("RESTART_COMMAND", "NGINX_RESTART_COMMAND") {
            config.restart.command = value;
        }

        if let Some(value) = get("EMAIL_NOTIFICATIONS") {
            config.email.notifications_enabled = parse_flag(&value);
        }
        if let Some(value) = get("EMAIL_FROM") {
            config.email.from = value;
        }
        if let Some(value) = get("EMAIL_TO") {
            config.email.to = value;
        }
        if let Some(value) = get("EMAIL_SMTP_HOST") {
            config.email.smtp_host = value;
        }
        if let Some(value) = get("EMAIL_SMTP_PORT") {
            config.email.smtp_port = parse_number("EMAIL_SMTP_PORT", &value)?;
        }
        if let Some(value) = get("EMAIL_SMTP_USER") {
            config.email.smtp_user = value;
        }
        if let Some(value) = get("EMAIL_SMTP_PASS") {
            config.email.smtp_pass = value;
        }

        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_number<T>(field: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| CertError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

impl Validate for SupervisorConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("check-schedule", &self.check_schedule)?;
        validation::validate_non_empty_string("renew-command", &self.renew_command)?;
        validation::validate_non_empty_string("cert-file-name", &self.cert_file_name)?;
        validation::validate_path(
            "cert-root-directory",
            &self.cert_root_directory.to_string_lossy(),
        )?;
        validation::validate_path("log-file", &self.log_file.to_string_lossy())?;

        if self.restart.enabled {
            validation::validate_non_empty_string("restart.command", &self.restart.command)?;
        }

        if self.email.notifications_enabled {
            validation::validate_non_empty_string("email.from", &self.email.from)?;
            validation::validate_non_empty_string("email.smtp-host", &self.email.smtp_host)?;
            if self.email.recipients().next().is_none() {
                return Err(CertError::MissingConfigError {
                    field: "email.to".to_string(),
                });
            }
        }

        Ok(())
    }
}
