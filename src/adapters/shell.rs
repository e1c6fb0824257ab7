use crate::domain::model::{CommandOutput, Invocation};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{CertError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs invocations as child processes with a hard deadline. The child is
/// killed when the deadline passes.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = match invocation {
            Invocation::Shell(line) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                command
            }
            Invocation::Exec { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation, timeout = ?self.timeout, "spawning command");

        let child = Self::command(invocation)
            .spawn()
            .map_err(|e| CertError::ExternalCommand {
                command: invocation.to_string(),
                status: "spawn failed".to_string(),
                stdout: String::new(),
                stderr: e.to_string(),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CertError::CommandTimeout {
                command: invocation.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|e| CertError::ExternalCommand {
                command: invocation.to_string(),
                status: "wait failed".to_string(),
                stdout: String::new(),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CertError::ExternalCommand {
                command: invocation.to_string(),
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_shell_command_captures_stdout() {
        let output = runner()
            .run(&Invocation::shell("echo renewed; echo warn >&2"))
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "renewed");
        assert_eq!(output.stderr.trim(), "warn");
    }

    #[tokio::test]
    async fn test_exec_does_not_interpret_shell_syntax() {
        let output = runner()
            .run(&Invocation::exec("echo", ["$HOME;", "done"]))
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "$HOME; done");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_external_command_error() {
        let err = runner()
            .run(&Invocation::shell("echo details; echo boom >&2; exit 3"))
            .await
            .unwrap_err();

        match err {
            CertError::ExternalCommand {
                stdout,
                stderr,
                status,
                ..
            } => {
                assert_eq!(stdout.trim(), "details");
                assert_eq!(stderr.trim(), "boom");
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let err = runner()
            .run(&Invocation::exec("certkeeper-no-such-binary", Vec::<String>::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, CertError::ExternalCommand { .. }));
    }

    #[tokio::test]
    async fn test_deadline_is_enforced() {
        let runner = ShellRunner::new(Duration::from_millis(100));
        let err = runner.run(&Invocation::shell("sleep 5")).await.unwrap_err();

        assert!(matches!(err, CertError::CommandTimeout { .. }));
    }
}
