use std::process::Stdio;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;
use crate::error::{HostVerifyError, Result};
use super::CommandOutput;
use super::shell::quote;

/// How shell scripts reach the target machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "connection", rename_all = "lowercase")]
pub enum Transport {
    Local,
    Ssh {
        host: String,
        user: Option<String>,
        port: Option<u16>,
    },
    Docker {
        container: String,
    },
    Podman {
        container: String,
    },
}

impl Transport {
    pub fn describe(&self) -> String {
        match self {
            Transport::Local => "local://".to_string(),
            Transport::Ssh { host, user, port } => {
                let user = user.as_ref().map(|u| format!("{}@", u)).unwrap_or_default();
                let port = port.map(|p| format!(":{}", p)).unwrap_or_default();
                format!("ssh://{}{}{}", user, host, port)
            }
            Transport::Docker { container } => format!("docker://{}", container),
            Transport::Podman { container } => format!("podman://{}", container),
        }
    }

    fn command(&self, script: &str) -> Command {
        match self {
            Transport::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
            Transport::Ssh { host, user, port } => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"]);
                if let Some(port) = port {
                    cmd.arg("-p").arg(port.to_string());
                }
                if let Some(user) = user {
                    cmd.arg("-l").arg(user);
                }
                cmd.arg(host).arg("--").arg(format!("sh -c {}", quote(script)));
                cmd
            }
            Transport::Docker { container } => {
                let mut cmd = Command::new("docker");
                cmd.args(["exec", container.as_str(), "sh", "-c", script]);
                cmd
            }
            Transport::Podman { container } => {
                let mut cmd = Command::new("podman");
                cmd.args(["exec", container.as_str(), "sh", "-c", script]);
                cmd
            }
        }
    }

    pub async fn exec(&self, script: &str, limit: Duration) -> Result<CommandOutput> {
        debug!("[{}] {}", self.describe(), script);

        let mut cmd = self.command(script);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.spawn_error(e)),
            Err(_) => {
                return Err(HostVerifyError::Timeout {
                    command: script.to_string(),
                    secs: limit.as_secs(),
                })
            }
        };

        let result = CommandOutput {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if self.is_connection_failure(&result) {
            return Err(HostVerifyError::Unreachable(format!(
                "{}: {}",
                self.describe(),
                result.stderr.trim()
            )));
        }

        Ok(result)
    }

    fn spawn_error(&self, err: std::io::Error) -> HostVerifyError {
        match self {
            Transport::Local => HostVerifyError::Command(format!("failed to spawn sh: {}", err)),
            _ => HostVerifyError::Unreachable(format!("{}: {}", self.describe(), err)),
        }
    }

    fn is_connection_failure(&self, output: &CommandOutput) -> bool {
        match self {
            Transport::Local => false,
            Transport::Ssh { .. } => output.exit_status == 255,
            Transport::Docker { .. } | Transport::Podman { .. } => {
                output.exit_status == 125
                    || output.stderr.starts_with("Error response from daemon")
                    || output.stderr.starts_with("Error: no such container")
                    || output.stderr.starts_with("Error: No such container")
            }
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}
