use crate::config::SupervisorConfig;
use crate::core::notifier::Notifier;
use crate::domain::model::{Invocation, RenewalOutcome};
use crate::domain::ports::CommandRunner;
use crate::utils::error::CertError;
use std::sync::Arc;

pub const SUBJECT_RENEWAL_FAILED: &str = "Certificate Renewal Failed";
pub const SUBJECT_RESTART_FAILED: &str = "Certificate Renewal Successful, but Restart Failed";
pub const SUBJECT_RENEWED_AND_RESTARTED: &str = "Certificate Renewal and Restart Successful";
pub const SUBJECT_RENEWED: &str = "Certificate Renewal Successful";

/// Runs the renewal command, restarts the dependent service when asked to,
/// and sends exactly one notification describing how far it got.
///
/// The renewal command is domain-agnostic: one invocation renews every
/// certificate the underlying tool manages.
pub struct RenewalOrchestrator {
    runner: Arc<dyn CommandRunner>,
    renew: Invocation,
    restart: Option<Invocation>,
    notifier: Notifier,
}

impl RenewalOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        renew_command: &str,
        restart_command: Option<&str>,
        notifier: Notifier,
    ) -> Self {
        Self {
            runner,
            renew: Invocation::shell(renew_command),
            restart: restart_command.map(Invocation::shell),
            notifier,
        }
    }

    pub fn from_config(
        config: &SupervisorConfig,
        runner: Arc<dyn CommandRunner>,
        notifier: Notifier,
    ) -> Self {
        let restart = config
            .restart
            .enabled
            .then_some(config.restart.command.as_str());
        Self::new(runner, &config.renew_command, restart, notifier)
    }

    pub async fn renew(&self) -> RenewalOutcome {
        tracing::info!("Starting certificate renewal process");

        let output = match self.runner.run(&self.renew).await {
            Ok(output) => output,
            Err(e) => {
                let (stdout, stderr) = captured_output(&e);
                let mut message = format!("Certificate renewal failed: {}", e);
                if !stdout.trim().is_empty() {
                    message = format!("{}\n{}", message, stdout.trim_end());
                }
                tracing::error!("{}", message);
                self.notifier.notify(SUBJECT_RENEWAL_FAILED, &message).await;
                return RenewalOutcome {
                    succeeded: false,
                    stdout,
                    stderr,
                    ..RenewalOutcome::default()
                };
            }
        };

        let success_message = format!("Certificate renewal completed successfully\n{}", output.stdout);
        tracing::info!("{}", success_message.trim_end());

        let mut outcome = RenewalOutcome {
            succeeded: true,
            stdout: output.stdout,
            stderr: output.stderr,
            ..RenewalOutcome::default()
        };

        let Some(restart) = &self.restart else {
            self.notifier.notify(SUBJECT_RENEWED, &success_message).await;
            return outcome;
        };

        tracing::info!("Restarting service: {}", restart);
        outcome.restarted = true;

        match self.runner.run(restart).await {
            Ok(_) => {
                tracing::info!("Service restarted successfully");
                outcome.restart_succeeded = Some(true);
                let body = format!("{}\n\nService restarted successfully", success_message);
                self.notifier
                    .notify(SUBJECT_RENEWED_AND_RESTARTED, &body)
                    .await;
            }
            Err(e) => {
                let restart_message = format!("Service restart failed: {}", e);
                tracing::error!("{}", restart_message);
                outcome.restart_succeeded = Some(false);
                outcome.restart_detail = Some(restart_message.clone());
                let body = format!("{}\n\n{}", success_message, restart_message);
                self.notifier.notify(SUBJECT_RESTART_FAILED, &body).await;
            }
        }

        outcome
    }
}

/// Output of a failed command as `(stdout, stderr)`; errors without captured
/// output report their message as stderr.
fn captured_output(err: &CertError) -> (String, String) {
    match err {
        CertError::ExternalCommand { stdout, stderr, .. } => (stdout.clone(), stderr.clone()),
        other => (String::new(), other.to_string()),
    }
}
