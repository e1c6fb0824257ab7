use crate::core::provisioner::{ActivationMode, ProvisionSettings};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "certkeeper")]
#[command(about = "Watches certificate expiry and renews certificates on a schedule")]
pub struct SupervisorArgs {
    /// TOML configuration file; the environment is used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dotenv file read before the environment lookup; `.env` is used when
    /// present and this is omitted
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Run a single check and exit instead of following the schedule
    #[arg(long)]
    pub once: bool,

    /// Scan and report expiry without renewing anything
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "certkeeper-provision")]
#[command(about = "Creates a reverse-proxy entry for a domain and issues its certificate")]
pub struct ProvisionArgs {
    /// Domain name for the proxy configuration
    #[arg(short, long)]
    pub domain: String,

    /// Local port to proxy to
    #[arg(short, long)]
    pub port: u16,

    /// Skip certificate issuance
    #[arg(long)]
    pub no_ssl: bool,

    /// Email for ACME account notifications
    #[arg(long)]
    pub email: Option<String>,

    /// Directory the proxy configuration file is written to
    #[arg(long, default_value = "/etc/nginx/conf.d")]
    pub config_dir: PathBuf,

    /// Symlink the configuration into this directory instead of relying on
    /// directory-based loading (e.g. /etc/nginx/sites-enabled)
    #[arg(long)]
    pub enabled_dir: Option<PathBuf>,

    #[arg(long, default_value = "nginx -t")]
    pub validate_command: String,

    #[arg(long, default_value = "systemctl reload nginx")]
    pub reload_command: String,

    /// ACME client binary
    #[arg(long, default_value = "certbot")]
    pub acme_client: String,

    /// Deadline for each external command, in seconds
    #[arg(long, default_value = "300")]
    pub command_timeout_secs: u64,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl ProvisionArgs {
    pub fn settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            domain: self.domain.clone(),
            port: self.port,
            issue_certificate: !self.no_ssl,
            email: self.email.clone().filter(|email| !email.trim().is_empty()),
            config_dir: self.config_dir.clone(),
            activation: match &self.enabled_dir {
                Some(dir) => ActivationMode::SitesEnabled {
                    enabled_dir: dir.clone(),
                },
                None => ActivationMode::ConfDir,
            },
            validate_command: self.validate_command.clone(),
            reload_command: self.reload_command.clone(),
            acme_client: self.acme_client.clone(),
        }
    }
}

impl Validate for ProvisionArgs {
    fn validate(&self) -> Result<()> {
        validation::validate_domain_name("domain", &self.domain)?;
        validation::validate_path("config-dir", &self.config_dir.to_string_lossy())?;
        validation::validate_non_empty_string("validate-command", &self.validate_command)?;
        validation::validate_non_empty_string("reload-command", &self.reload_command)?;
        if !self.no_ssl {
            validation::validate_non_empty_string("acme-client", &self.acme_client)?;
        }
        Ok(())
    }
}
