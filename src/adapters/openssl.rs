use crate::domain::model::Invocation;
use crate::domain::ports::{CertInspector, CommandRunner};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Reads the `notAfter` line of a PEM certificate with `openssl x509`.
pub struct OpensslInspector {
    runner: Arc<dyn CommandRunner>,
    openssl_bin: String,
}

impl OpensslInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, openssl_bin: impl Into<String>) -> Self {
        Self {
            runner,
            openssl_bin: openssl_bin.into(),
        }
    }

    fn invocation(&self, cert_path: &Path) -> Invocation {
        Invocation::exec(
            self.openssl_bin.clone(),
            [
                "x509".to_string(),
                "-enddate".to_string(),
                "-noout".to_string(),
                "-in".to_string(),
                cert_path.to_string_lossy().into_owned(),
            ],
        )
    }
}

#[async_trait]
impl CertInspector for OpensslInspector {
    async fn inspect(&self, cert_path: &Path) -> Result<String> {
        let output = self.runner.run(&self.invocation(cert_path)).await?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CommandOutput;
    use std::sync::Mutex;

    struct EchoRunner {
        seen: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl CommandRunner for EchoRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(CommandOutput {
                stdout: "notAfter=Jun  1 00:00:00 2031 GMT\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_inspect_runs_openssl_without_shell() {
        let runner = Arc::new(EchoRunner {
            seen: Mutex::new(Vec::new()),
        });
        let inspector = OpensslInspector::new(runner.clone(), "openssl");

        let report = inspector
            .inspect(Path::new("/etc/letsencrypt/live/a b/cert.pem"))
            .await
            .unwrap();

        assert!(report.starts_with("notAfter="));
        let seen = runner.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            Invocation::exec(
                "openssl",
                ["x509", "-enddate", "-noout", "-in", "/etc/letsencrypt/live/a b/cert.pem"]
            )
        );
    }
}
