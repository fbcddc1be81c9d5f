//! `shell.run`: run command strings one at a time through the configured
//! shell, optionally inside an activated environment.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::{CommandExecutor, StepContext};
use crate::core::config::ShellConfig;
use crate::core::environment::ActivationGuard;
use crate::core::resolver::CommandInvocation;
use crate::error::StepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

pub struct ShellCommandExecutor {
    shell: ShellConfig,
    stream_output: bool,
}

impl ShellCommandExecutor {
    pub fn new(shell: ShellConfig, stream_output: bool) -> Self {
        Self {
            shell,
            stream_output,
        }
    }

    async fn run_one(
        &self,
        command: &str,
        cwd: &Path,
        activation: Option<&ActivationGuard>,
    ) -> Result<(), StepError> {
        let mut child_cmd = Command::new(&self.shell.program);
        child_cmd
            .args(&self.shell.args)
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(guard) = activation {
            guard.apply(&mut child_cmd)?;
        }

        tracing::info!(
            command,
            cwd = %cwd.display(),
            env = activation.map(|g| g.environment().name.as_str()),
            "running command"
        );
        let mut child = child_cmd.spawn().map_err(|e| StepError::SpawnFailed {
            command: command.to_string(),
            cause: e.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, OutputStream::Stdout, self.stream_output)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, OutputStream::Stderr, self.stream_output)));

        let status = child.wait().await.map_err(|e| StepError::SpawnFailed {
            command: command.to_string(),
            cause: e.to_string(),
        })?;
        join_forwarders(command, [stdout, stderr].into_iter().flatten()).await;

        if status.success() {
            Ok(())
        } else {
            tracing::warn!(command, exit_code = ?status.code(), "command failed");
            Err(StepError::CommandFailed {
                command: command.to_string(),
                exit_code: status.code(),
            })
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellCommandExecutor {
    async fn run_commands(
        &self,
        invocation: &CommandInvocation,
        ctx: &StepContext<'_>,
    ) -> Result<(), StepError> {
        let registry = ctx.registry();
        // Held until the last command returns or the first one fails.
        let activation = match &invocation.environment {
            Some(name) => {
                let env = registry.ensure(name).await?;
                Some(registry.activate(&env))
            }
            None => None,
        };

        for command in &invocation.commands {
            self.run_one(command, &invocation.cwd, activation.as_ref())
                .await?;
        }
        Ok(())
    }
}

/// Wait for the output forwarders. A forwarder that panicked only loses
/// output, so it is logged and never fails the command.
async fn join_forwarders(command: &str, forwarders: impl IntoIterator<Item = JoinHandle<()>>) {
    for forwarder in forwarders {
        if let Err(e) = forwarder.await {
            tracing::warn!(command, error = %e, "output forwarder did not finish");
        }
    }
}

/// Drain `reader` to EOF, one line at a time. Lines are rendered lossily so
/// non-UTF-8 output never closes the pipe while the child is still writing.
async fn forward_lines<R>(reader: R, stream: OutputStream, echo: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if echo {
                    match stream {
                        OutputStream::Stdout => println!("{}", line),
                        OutputStream::Stderr => eprintln!("{}", line),
                    }
                }
                tracing::trace!(stream = ?stream, "{}", line);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(stream = ?stream, error = %e, "reading command output failed");
                // Drain anyway; the child must not hit a closed pipe.
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
}
