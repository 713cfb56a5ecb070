mod mock;
mod shell;
mod transport;

use std::collections::BTreeMap;
use async_trait::async_trait;
use serde::Serialize;
use crate::error::Result;

pub use mock::{MockHost, MockFile};
pub use shell::{ShellHost, quote, run_as, parse_passwd_line};
pub use transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub exists: bool,
    pub is_directory: bool,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl FileInfo {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            is_directory: false,
            owner: None,
            group: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub running: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageState {
    pub installed: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

/// Read-only view of a provisioned machine.
///
/// Every operation observes state and never changes it, so one handle can be
/// shared by all checks of a run.
#[async_trait]
pub trait Host: Send + Sync {
    /// Human readable name used in reports and logs.
    fn label(&self) -> &str;

    async fn run(&self, command: &str) -> Result<CommandOutput>;

    async fn file(&self, path: &str) -> Result<FileInfo>;

    /// Raw file content, `None` when the path does not exist.
    async fn file_content(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn service(&self, name: &str) -> Result<ServiceState>;

    async fn package(&self, name: &str) -> Result<PackageState>;

    async fn user(&self, name: &str) -> Result<Option<UserInfo>>;

    /// Absolute path the executable resolves to on the host's search path.
    async fn find_command(&self, name: &str) -> Result<Option<String>>;

    /// Installed distributions reported by the given pip, keyed by name.
    /// `None` when that pip cannot be executed.
    async fn pip_packages(&self, pip_path: &str) -> Result<Option<BTreeMap<String, String>>>;
}
