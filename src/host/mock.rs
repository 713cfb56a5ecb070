use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use crate::error::{HostVerifyError, Result};
use super::{CommandOutput, FileInfo, Host, PackageState, ServiceState, UserInfo};

#[derive(Debug, Clone)]
pub struct MockFile {
    pub content: Option<Vec<u8>>,
    pub is_directory: bool,
    pub owner: String,
    pub group: String,
}

/// In-memory host for exercising checks without a real machine.
///
/// Commands are matched on their exact text; unknown commands behave like
/// a missing executable (exit 127).
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    label: String,
    files: HashMap<String, MockFile>,
    services: HashMap<String, ServiceState>,
    packages: HashMap<String, String>,
    users: HashMap<String, UserInfo>,
    commands: HashMap<String, CommandOutput>,
    command_paths: HashMap<String, String>,
    pip: HashMap<String, BTreeMap<String, String>>,
    unreachable: bool,
}

impl MockHost {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(normalize(path), MockFile {
            content: Some(content.into()),
            is_directory: false,
            owner: "root".into(),
            group: "root".into(),
        });
        self
    }

    pub fn with_directory(mut self, path: &str) -> Self {
        self.files.insert(normalize(path), MockFile {
            content: None,
            is_directory: true,
            owner: "root".into(),
            group: "root".into(),
        });
        self
    }

    /// Change ownership of a path added earlier.
    pub fn with_owner(mut self, path: &str, owner: &str, group: &str) -> Self {
        if let Some(file) = self.files.get_mut(&normalize(path)) {
            file.owner = owner.to_string();
            file.group = group.to_string();
        }
        self
    }

    pub fn without_file(mut self, path: &str) -> Self {
        self.files.remove(&normalize(path));
        self
    }

    pub fn with_service(mut self, name: &str, running: bool, enabled: bool) -> Self {
        self.services.insert(name.to_string(), ServiceState { running, enabled });
        self
    }

    pub fn with_package(mut self, name: &str, version: &str) -> Self {
        self.packages.insert(name.to_string(), version.to_string());
        self
    }

    pub fn with_user(mut self, name: &str, home: &str, shell: &str) -> Self {
        let uid = 1000 + self.users.len() as u32;
        self.users.insert(name.to_string(), UserInfo {
            name: name.to_string(),
            uid,
            gid: uid,
            home: home.to_string(),
            shell: shell.to_string(),
        });
        self
    }

    pub fn with_command(mut self, command: &str, output: CommandOutput) -> Self {
        self.commands.insert(command.to_string(), output);
        self
    }

    pub fn with_command_path(mut self, name: &str, path: &str) -> Self {
        self.command_paths.insert(name.to_string(), path.to_string());
        self
    }

    pub fn with_pip_packages(mut self, pip_path: &str, packages: &[(&str, &str)]) -> Self {
        let map = packages
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect();
        self.pip.insert(pip_path.to_string(), map);
        self
    }

    /// Every subsequent query fails as if the connection dropped.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn connect(&self) -> Result<()> {
        if self.unreachable {
            Err(HostVerifyError::Unreachable(format!("{}: connection refused", self.label)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Host for MockHost {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.connect()?;
        Ok(self.commands
            .get(command)
            .cloned()
            .unwrap_or_else(|| CommandOutput::new(127, "", format!("sh: {}: not found", command))))
    }

    async fn file(&self, path: &str) -> Result<FileInfo> {
        self.connect()?;
        Ok(match self.files.get(&normalize(path)) {
            Some(file) => FileInfo {
                path: path.to_string(),
                exists: true,
                is_directory: file.is_directory,
                owner: Some(file.owner.clone()),
                group: Some(file.group.clone()),
            },
            None => FileInfo::missing(path),
        })
    }

    async fn file_content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.connect()?;
        match self.files.get(&normalize(path)) {
            Some(file) if file.is_directory => Err(HostVerifyError::Command(format!(
                "reading {} failed: Is a directory",
                path
            ))),
            Some(file) => Ok(file.content.clone()),
            None => Ok(None),
        }
    }

    async fn service(&self, name: &str) -> Result<ServiceState> {
        self.connect()?;
        Ok(self.services.get(name).copied().unwrap_or_default())
    }

    async fn package(&self, name: &str) -> Result<PackageState> {
        self.connect()?;
        Ok(match self.packages.get(name) {
            Some(version) => PackageState { installed: true, version: Some(version.clone()) },
            None => PackageState::default(),
        })
    }

    async fn user(&self, name: &str) -> Result<Option<UserInfo>> {
        self.connect()?;
        Ok(self.users.get(name).cloned())
    }

    async fn find_command(&self, name: &str) -> Result<Option<String>> {
        self.connect()?;
        Ok(self.command_paths.get(name).cloned())
    }

    async fn pip_packages(&self, pip_path: &str) -> Result<Option<BTreeMap<String, String>>> {
        self.connect()?;
        Ok(self.pip.get(pip_path).cloned())
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trailing_slash_is_same_path() {
        let host = MockHost::new("mock").with_directory("/srv/funkwhale");
        let info = host.file("/srv/funkwhale/").await.unwrap();
        assert!(info.exists);
        assert!(info.is_directory);
    }

    #[tokio::test]
    async fn test_unknown_command_exits_127() {
        let host = MockHost::new("mock");
        let out = host.run("psql").await.unwrap();
        assert_eq!(out.exit_status, 127);
    }

    #[tokio::test]
    async fn test_unreachable_errors_every_query() {
        let host = MockHost::new("mock").with_directory("/srv").unreachable();
        assert!(host.file("/srv").await.unwrap_err().is_unreachable());
        assert!(host.service("nginx").await.unwrap_err().is_unreachable());
    }
}
