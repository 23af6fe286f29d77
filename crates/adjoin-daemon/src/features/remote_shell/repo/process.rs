use super::{RemoteCommandChannel, RemoteSession};
use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::{CommandResult, OutputLine, ShellCommand};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Environment variable through which the bridge receives the session password.
pub const PASSWORD_ENV: &str = "REMOTE_SHELL_PASSWORD";

/// Channel that delegates to an external bridge executable (a WinRM client or similar).
///
/// Each command is run as `<program> [args..] <host> <user>` with the password in
/// [`PASSWORD_ENV`] and the command line on stdin. Stdout lines come first, then
/// stderr lines. The exit status is not interpreted.
#[derive(Debug, Clone)]
pub struct ProcessCommandChannel {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessCommandChannel {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl RemoteCommandChannel for ProcessCommandChannel {
    async fn open(
        &self,
        host: &str,
        user: &str,
        secret: &str,
    ) -> DaemonResult<Box<dyn RemoteSession>> {
        Ok(Box::new(ProcessSession {
            channel: self.clone(),
            host: host.to_string(),
            user: user.to_string(),
            secret: secret.to_string(),
        }))
    }
}

struct ProcessSession {
    channel: ProcessCommandChannel,
    host: String,
    user: String,
    secret: String,
}

impl ProcessSession {
    async fn run_one(&self, command: &ShellCommand) -> DaemonResult<Vec<String>> {
        let mut child = Command::new(&self.channel.program)
            .args(&self.channel.args)
            .arg(&self.host)
            .arg(&self.user)
            .env(PASSWORD_ENV, &self.secret)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DaemonError::RemoteShell(format!(
                    "failed to start {}: {e}",
                    self.channel.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\r\n", command.as_str());
            match stdin.write_all(line.as_bytes()).await {
                // bridge exited without reading; its output still tells what happened
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(DaemonError::RemoteShell(format!(
                        "failed to send command: {e}"
                    )))
                }
                Ok(()) => {}
            }
        }

        let output = tokio::time::timeout(self.channel.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                DaemonError::RemoteShell(format!(
                    "command on {} timed out after {:?}",
                    self.host, self.channel.timeout
                ))
            })?
            .map_err(|e| DaemonError::RemoteShell(format!("failed to read output: {e}")))?;

        debug!(host = %self.host, status = ?output.status, "Remote shell bridge exited");

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(stdout
            .lines()
            .chain(stderr.lines())
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }
}

#[async_trait]
impl RemoteSession for ProcessSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&mut self, commands: &[ShellCommand]) -> DaemonResult<CommandResult> {
        let mut lines = Vec::new();
        for command in commands {
            for line in self.run_one(command).await? {
                lines.push(OutputLine {
                    host: self.host.clone(),
                    line,
                });
            }
        }
        Ok(CommandResult::new(lines))
    }
}
