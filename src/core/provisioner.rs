use crate::domain::model::Invocation;
use crate::domain::ports::CommandRunner;
use crate::utils::error::{CertError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// How a freshly written proxy configuration becomes active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationMode {
    /// The proxy loads every file in the config directory (RHEL style
    /// `conf.d`); nothing to do.
    ConfDir,
    /// The config is linked into `enabled_dir` (Debian style
    /// `sites-enabled`).
    SitesEnabled { enabled_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub domain: String,
    pub port: u16,
    pub issue_certificate: bool,
    pub email: Option<String>,
    pub config_dir: PathBuf,
    pub activation: ActivationMode,
    pub validate_command: String,
    pub reload_command: String,
    pub acme_client: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    WriteConfig,
    Activate,
    ValidateProxy,
    ReloadProxy,
    IssueCertificate,
}

impl ProvisionStep {
    /// Process exit code for a failure in this step. 1 and 2 are left to
    /// clap and argument validation.
    pub fn exit_code(self) -> i32 {
        match self {
            ProvisionStep::WriteConfig => 3,
            ProvisionStep::Activate => 4,
            ProvisionStep::ValidateProxy => 5,
            ProvisionStep::ReloadProxy => 6,
            ProvisionStep::IssueCertificate => 7,
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::WriteConfig => "writing proxy configuration",
            ProvisionStep::Activate => "activating proxy configuration",
            ProvisionStep::ValidateProxy => "validating proxy configuration",
            ProvisionStep::ReloadProxy => "reloading proxy",
            ProvisionStep::IssueCertificate => "issuing certificate",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{step} failed: {source}")]
pub struct ProvisionError {
    pub step: ProvisionStep,
    #[source]
    pub source: CertError,
}

impl ProvisionError {
    fn at(step: ProvisionStep) -> impl FnOnce(CertError) -> Self {
        move |source| Self { step, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub config_path: PathBuf,
    pub overwritten: bool,
    pub certificate_issued: bool,
}

/// One-shot setup of a new domain: proxy entry, activation, reload and
/// optional certificate issuance. Each step only runs when the previous one
/// succeeded; nothing is rolled back.
pub struct Provisioner {
    settings: ProvisionSettings,
    runner: Arc<dyn CommandRunner>,
}

pub fn render_proxy_config(domain: &str, port: u16) -> String {
    format!(
        r#"server {{
    listen 80;
    server_name {domain};

    location / {{
        proxy_pass http://localhost:{port};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_cache_bypass $http_upgrade;
    }}
}}
"#
    )
}

impl Provisioner {
    pub fn new(settings: ProvisionSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    pub fn config_path(&self) -> PathBuf {
        self.settings
            .config_dir
            .join(format!("{}.conf", self.settings.domain))
    }

    pub async fn run(&self) -> std::result::Result<ProvisionReport, ProvisionError> {
        let config_path = self.config_path();

        let overwritten = self
            .write_config(&config_path)
            .await
            .map_err(ProvisionError::at(ProvisionStep::WriteConfig))?;

        self.activate(&config_path)
            .await
            .map_err(ProvisionError::at(ProvisionStep::Activate))?;

        self.reload_proxy().await?;

        let certificate_issued = if self.settings.issue_certificate {
            self.issue_certificate()
                .await
                .map_err(ProvisionError::at(ProvisionStep::IssueCertificate))?;
            true
        } else {
            tracing::info!("SSL setup skipped");
            false
        };

        Ok(ProvisionReport {
            config_path,
            overwritten,
            certificate_issued,
        })
    }

    /// Returns whether an existing file was replaced.
    async fn write_config(&self, config_path: &Path) -> Result<bool> {
        tracing::info!(
            "Creating proxy configuration for {} -> localhost:{}",
            self.settings.domain,
            self.settings.port
        );

        let existed = tokio::fs::try_exists(config_path).await.unwrap_or(false);
        if existed {
            tracing::warn!(
                "Config file already exists at {}. Overriding...",
                config_path.display()
            );
        }

        let contents = render_proxy_config(&self.settings.domain, self.settings.port);
        tokio::fs::write(config_path, contents)
            .await
            .map_err(|e| CertError::FileSystem {
                path: config_path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::info!("Proxy configuration created at: {}", config_path.display());
        Ok(existed)
    }

    async fn activate(&self, config_path: &Path) -> Result<()> {
        let enabled_dir = match &self.settings.activation {
            ActivationMode::ConfDir => {
                tracing::info!("Proxy configuration is loaded automatically from its directory");
                return Ok(());
            }
            ActivationMode::SitesEnabled { enabled_dir } => enabled_dir,
        };

        let link = enabled_dir.join(
            config_path
                .file_name()
                .unwrap_or_else(|| config_path.as_os_str()),
        );
        let fs_error = |e: std::io::Error| CertError::FileSystem {
            path: link.clone(),
            message: e.to_string(),
        };

        if tokio::fs::symlink_metadata(&link).await.is_ok() {
            tracing::debug!("removing existing link {}", link.display());
            tokio::fs::remove_file(&link).await.map_err(fs_error)?;
        }

        create_symlink(config_path, &link).await.map_err(fs_error)?;
        tracing::info!("Enabled proxy configuration via {}", link.display());
        Ok(())
    }

    async fn reload_proxy(&self) -> std::result::Result<(), ProvisionError> {
        tracing::info!("Reloading proxy...");

        self.runner
            .run(&Invocation::shell(self.settings.validate_command.as_str()))
            .await
            .map_err(ProvisionError::at(ProvisionStep::ValidateProxy))?;

        self.runner
            .run(&Invocation::shell(self.settings.reload_command.as_str()))
            .await
            .map_err(ProvisionError::at(ProvisionStep::ReloadProxy))?;

        tracing::info!("Proxy reloaded successfully");
        Ok(())
    }

    pub fn certificate_invocation(&self) -> Invocation {
        let mut args = vec![
            "--nginx".to_string(),
            "-d".to_string(),
            self.settings.domain.clone(),
        ];
        match &self.settings.email {
            Some(email) => {
                args.push("--email".to_string());
                args.push(email.clone());
            }
            None => args.push("--register-unsafely-without-email".to_string()),
        }
        args.extend(
            ["--agree-tos", "--redirect", "--non-interactive"]
                .into_iter()
                .map(String::from),
        );

        Invocation::exec(self.settings.acme_client.clone(), args)
    }

    async fn issue_certificate(&self) -> Result<()> {
        tracing::info!("Setting up SSL certificate for {}...", self.settings.domain);
        self.runner.run(&self.certificate_invocation()).await?;
        tracing::info!(
            "SSL certificate successfully installed for {}",
            self.settings.domain
        );
        Ok(())
    }
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlink activation is only supported on unix",
    ))
}

/// Whether the process runs as uid 0, read from the owner of `/proc/self`.
/// `None` when that cannot be determined, including every platform without
/// procfs.
#[cfg(target_os = "linux")]
pub fn running_as_root() -> Option<bool> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .ok()
        .map(|meta| meta.uid() == 0)
}

#[cfg(not(target_os = "linux"))]
pub fn running_as_root() -> Option<bool> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedRunner {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            let text = invocation.to_string();
            self.calls.lock().unwrap().push(text.clone());
            if self.failing.iter().any(|needle| text.contains(needle)) {
                return Err(CertError::ExternalCommand {
                    command: text,
                    status: "exit status: 1".to_string(),
                    stdout: String::new(),
                    stderr: "nginx: configuration file test failed".to_string(),
                });
            }
            Ok(CommandOutput::default())
        }
    }

    fn settings(config_dir: &Path) -> ProvisionSettings {
        ProvisionSettings {
            domain: "app.example.com".to_string(),
            port: 8080,
            issue_certificate: true,
            email: None,
            config_dir: config_dir.to_path_buf(),
            activation: ActivationMode::ConfDir,
            validate_command: "nginx -t".to_string(),
            reload_command: "systemctl reload nginx".to_string(),
            acme_client: "certbot".to_string(),
        }
    }

    #[test]
    fn test_render_proxy_config() {
        let config = render_proxy_config("app.example.com", 8080);

        assert!(config.contains("server_name app.example.com;"));
        assert!(config.contains("proxy_pass http://localhost:8080;"));
        assert!(config.contains("proxy_set_header Upgrade $http_upgrade;"));
        assert!(config.contains("proxy_set_header Connection 'upgrade';"));
        assert!(config.contains("X-Forwarded-For $proxy_add_x_forwarded_for;"));
        assert!(config.starts_with("server {"));
    }

    #[test]
    fn test_certificate_invocation_flags() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());

        let provisioner = Provisioner::new(settings(dir.path()), runner.clone());
        assert_eq!(
            provisioner.certificate_invocation().to_string(),
            "certbot --nginx -d app.example.com --register-unsafely-without-email --agree-tos --redirect --non-interactive"
        );

        let mut with_email = settings(dir.path());
        with_email.email = Some("ops@example.com".to_string());
        let provisioner = Provisioner::new(with_email, runner);
        assert_eq!(
            provisioner.certificate_invocation().to_string(),
            "certbot --nginx -d app.example.com --email ops@example.com --agree-tos --redirect --non-interactive"
        );
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let provisioner = Provisioner::new(settings(dir.path()), runner.clone());

        let report = provisioner.run().await.unwrap();

        assert_eq!(report.config_path, dir.path().join("app.example.com.conf"));
        assert!(!report.overwritten);
        assert!(report.certificate_issued);
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "nginx -t");
        assert_eq!(calls[1], "systemctl reload nginx");
        assert!(calls[2].starts_with("certbot --nginx"));
    }

    #[tokio::test]
    async fn test_existing_config_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.example.com.conf");
        std::fs::write(&path, "stale").unwrap();

        let mut settings = settings(dir.path());
        settings.issue_certificate = false;
        let provisioner = Provisioner::new(settings, Arc::new(ScriptedRunner::default()));

        let report = provisioner.run().await.unwrap();

        assert!(report.overwritten);
        assert!(!report.certificate_issued);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("proxy_pass http://localhost:8080;"));
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_reload_and_issuance() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner {
            failing: vec!["nginx -t"],
            ..ScriptedRunner::default()
        });
        let provisioner = Provisioner::new(settings(dir.path()), runner.clone());

        let err = provisioner.run().await.unwrap_err();

        assert_eq!(err.step, ProvisionStep::ValidateProxy);
        assert_eq!(err.step.exit_code(), 5);
        assert_eq!(*runner.calls.lock().unwrap(), vec!["nginx -t"]);
    }

    #[tokio::test]
    async fn test_issuance_failure_has_its_own_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner {
            failing: vec!["certbot"],
            ..ScriptedRunner::default()
        });
        let provisioner = Provisioner::new(settings(dir.path()), runner);

        let err = provisioner.run().await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::IssueCertificate);
        assert_eq!(err.step.exit_code(), 7);
        assert!(err.to_string().starts_with("issuing certificate failed"));
    }

    #[tokio::test]
    async fn test_missing_config_dir_fails_write_step() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let provisioner =
            Provisioner::new(settings(&dir.path().join("missing")), runner.clone());

        let err = provisioner.run().await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::WriteConfig);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sites_enabled_link_is_replaced() {
        let available = TempDir::new().unwrap();
        let enabled = TempDir::new().unwrap();
        let link = enabled.path().join("app.example.com.conf");
        std::fs::write(&link, "old regular file").unwrap();

        let mut settings = settings(available.path());
        settings.issue_certificate = false;
        settings.activation = ActivationMode::SitesEnabled {
            enabled_dir: enabled.path().to_path_buf(),
        };
        let provisioner = Provisioner::new(settings, Arc::new(ScriptedRunner::default()));

        provisioner.run().await.unwrap();

        let target = std::fs::read_link(&link).unwrap();
        assert_eq!(target, available.path().join("app.example.com.conf"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_root_check_is_known_on_linux() {
        use std::os::unix::fs::MetadataExt;
        let owner = std::fs::metadata("/proc/self").unwrap().uid();
        assert_eq!(running_as_root(), Some(owner == 0));
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_root_check_is_unknown_without_procfs() {
        assert_eq!(running_as_root(), None);
    }
}
