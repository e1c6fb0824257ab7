use crate::domain::model::{CommandOutput, Invocation, Notification};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Runs external programs. A non-zero exit status, a spawn failure or a
/// missed deadline are all reported as errors.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Returns the raw textual report of a certificate, which must contain a
/// `notAfter=<date>` line.
#[async_trait]
pub trait CertInspector: Send + Sync {
    async fn inspect(&self, cert_path: &Path) -> Result<String>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}
