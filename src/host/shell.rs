use std::collections::BTreeMap;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::time::Duration;
use tracing::debug;
use crate::error::{HostVerifyError, Result};
use super::transport::Transport;
use super::{CommandOutput, FileInfo, Host, PackageState, ServiceState, UserInfo};

const MISSING_EXIT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageManager {
    Dpkg,
    Rpm,
    Apk,
    Pacman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitSystem {
    Systemd,
    SysV,
}

#[derive(Deserialize)]
struct PipEntry {
    name: String,
    version: String,
}

/// [`Host`] implementation that answers every query with POSIX shell
/// snippets sent over a [`Transport`].
pub struct ShellHost {
    label: String,
    transport: Transport,
    timeout: Duration,
    become_root: bool,
    package_manager: OnceCell<PackageManager>,
    init_system: OnceCell<InitSystem>,
}

impl ShellHost {
    pub fn new(label: impl Into<String>, transport: Transport) -> Self {
        Self {
            label: label.into(),
            transport,
            timeout: Duration::from_secs(60),
            become_root: false,
            package_manager: OnceCell::new(),
            init_system: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wrap every script in `sudo -n` so root-only files can be read.
    pub fn with_become(mut self, become_root: bool) -> Self {
        self.become_root = become_root;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn exec(&self, script: &str) -> Result<CommandOutput> {
        if self.become_root {
            let wrapped = format!("sudo -n sh -c {}", quote(script));
            self.transport.exec(&wrapped, self.timeout).await
        } else {
            self.transport.exec(script, self.timeout).await
        }
    }

    async fn package_manager(&self) -> Result<PackageManager> {
        self.package_manager
            .get_or_try_init(|| async {
                let out = self.exec(
                    "if command -v dpkg-query >/dev/null 2>&1; then echo dpkg; \
                     elif command -v rpm >/dev/null 2>&1; then echo rpm; \
                     elif command -v apk >/dev/null 2>&1; then echo apk; \
                     elif command -v pacman >/dev/null 2>&1; then echo pacman; \
                     else echo unknown; fi",
                ).await?;

                let manager = match out.stdout.trim() {
                    "dpkg" => PackageManager::Dpkg,
                    "rpm" => PackageManager::Rpm,
                    "apk" => PackageManager::Apk,
                    "pacman" => PackageManager::Pacman,
                    other => {
                        return Err(HostVerifyError::Command(format!(
                            "no supported package manager on {} (probe said '{}')",
                            self.label, other
                        )))
                    }
                };
                debug!("{}: package manager {:?}", self.label, manager);
                Ok::<_, HostVerifyError>(manager)
            })
            .await
            .copied()
    }

    async fn init_system(&self) -> Result<InitSystem> {
        self.init_system
            .get_or_try_init(|| async {
                let out = self.exec(
                    "command -v systemctl >/dev/null 2>&1 && test -d /run/systemd/system",
                ).await?;
                let init = if out.succeeded() { InitSystem::Systemd } else { InitSystem::SysV };
                debug!("{}: init system {:?}", self.label, init);
                Ok::<_, HostVerifyError>(init)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl Host for ShellHost {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.exec(command).await
    }

    async fn file(&self, path: &str) -> Result<FileInfo> {
        let out = self.exec(&format!("stat -L -c '%F|%U|%G' -- {}", quote(path))).await?;
        if !out.succeeded() {
            return Ok(FileInfo::missing(path));
        }

        let mut parts = out.stdout.trim().splitn(3, '|');
        let kind = parts.next().unwrap_or_default();
        let owner = parts.next().map(str::to_string);
        let group = parts.next().map(str::to_string);

        Ok(FileInfo {
            path: path.to_string(),
            exists: true,
            is_directory: kind == "directory",
            owner,
            group,
        })
    }

    async fn file_content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let quoted = quote(path);
        let script = format!("test -e {q} || exit {code}; base64 < {q}", q = quoted, code = MISSING_EXIT);
        let out = self.exec(&script).await?;

        if out.exit_status == MISSING_EXIT {
            return Ok(None);
        }
        if !out.succeeded() {
            return Err(HostVerifyError::Command(format!(
                "reading {} failed: {}",
                path,
                out.stderr.trim()
            )));
        }

        let encoded: String = out.stdout.split_whitespace().collect();
        STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| HostVerifyError::Decode(format!("{}: {}", path, e)))
    }

    async fn service(&self, name: &str) -> Result<ServiceState> {
        let quoted = quote(name);
        match self.init_system().await? {
            InitSystem::Systemd => {
                let active = self.exec(&format!("systemctl is-active -- {}", quoted)).await?;
                let enabled = self.exec(&format!("systemctl is-enabled -- {}", quoted)).await?;
                let state = enabled.stdout.trim();
                Ok(ServiceState {
                    running: active.succeeded(),
                    enabled: enabled.succeeded() && state != "disabled" && state != "masked",
                })
            }
            InitSystem::SysV => {
                if !is_safe_word(name) {
                    return Err(HostVerifyError::Command(format!("invalid service name '{}'", name)));
                }
                let running = self.exec(&format!("service {} status", quoted)).await?;
                let enabled = self.exec(&format!(
                    "for f in /etc/rc?.d/S??{}; do test -e \"$f\" && exit 0; done; exit 1",
                    name
                )).await?;
                Ok(ServiceState {
                    running: running.succeeded(),
                    enabled: enabled.succeeded(),
                })
            }
        }
    }

    async fn package(&self, name: &str) -> Result<PackageState> {
        let quoted = quote(name);
        let state = match self.package_manager().await? {
            PackageManager::Dpkg => {
                let script = String::from("dpkg-query -f '${Status} ${Version}' -W -- ") + &quoted;
                let out = self.exec(&script).await?;
                let line = out.stdout.trim();
                match line.strip_prefix("install ok installed") {
                    Some(version) if out.succeeded() => PackageState {
                        installed: true,
                        version: non_empty(version.trim()),
                    },
                    _ => PackageState::default(),
                }
            }
            PackageManager::Rpm => {
                let out = self.exec(&format!("rpm -q --queryformat '%{{VERSION}}' {}", quoted)).await?;
                if out.succeeded() {
                    PackageState { installed: true, version: non_empty(out.stdout.trim()) }
                } else {
                    PackageState::default()
                }
            }
            PackageManager::Apk => {
                let out = self.exec(&format!("apk info -e {}", quoted)).await?;
                PackageState { installed: out.succeeded(), version: None }
            }
            PackageManager::Pacman => {
                let out = self.exec(&format!("pacman -Q {}", quoted)).await?;
                if out.succeeded() {
                    let version = out.stdout.split_whitespace().nth(1).and_then(non_empty);
                    PackageState { installed: true, version }
                } else {
                    PackageState::default()
                }
            }
        };
        Ok(state)
    }

    async fn user(&self, name: &str) -> Result<Option<UserInfo>> {
        let out = self.exec(&format!("getent passwd {}", quote(name))).await?;
        if !out.succeeded() {
            return Ok(None);
        }
        let line = out.stdout.lines().next().unwrap_or_default();
        parse_passwd_line(line)
            .map(Some)
            .ok_or_else(|| HostVerifyError::Decode(format!("malformed passwd entry: {}", line)))
    }

    async fn find_command(&self, name: &str) -> Result<Option<String>> {
        let q = quote(name);
        let script = format!(
            "command -v {q} && exit 0; \
             for d in /sbin /usr/sbin /usr/local/sbin; do \
             test -x \"$d\"/{q} && echo \"$d\"/{q} && exit 0; done; exit 1",
            q = q
        );
        let out = self.exec(&script).await?;
        if out.succeeded() {
            Ok(non_empty(out.stdout.trim()))
        } else {
            Ok(None)
        }
    }

    async fn pip_packages(&self, pip_path: &str) -> Result<Option<BTreeMap<String, String>>> {
        let out = self.exec(&format!("{} list --format=json 2>/dev/null", quote(pip_path))).await?;
        if out.exit_status == 126 || out.exit_status == 127 {
            return Ok(None);
        }
        if !out.succeeded() {
            return Err(HostVerifyError::Command(format!(
                "{} list exited with status {}",
                pip_path, out.exit_status
            )));
        }

        let entries: Vec<PipEntry> = serde_json::from_str(out.stdout.trim())?;
        Ok(Some(entries.into_iter().map(|e| (e.name, e.version)).collect()))
    }
}

/// Single-quote `value` for POSIX sh unless it only holds safe characters.
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Command line running `command` as another system account.
pub fn run_as(user: &str, command: &str) -> String {
    format!("sudo -u {} -- sh -c {}", quote(user), quote(command))
}

/// Parse one `name:pw:uid:gid:gecos:home:shell` passwd record.
pub fn parse_passwd_line(line: &str) -> Option<UserInfo> {
    let fields: Vec<&str> = line.trim_end().split(':').collect();
    if fields.len() != 7 {
        return None;
    }
    Some(UserInfo {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        home: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

fn is_safe_word(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || "@._-".contains(c))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() { None } else { Some(value.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_quote_plain_word() {
        assert_eq!(quote("/srv/funkwhale/config/.env"), "/srv/funkwhale/config/.env");
    }

    #[test]
    fn test_quote_with_spaces_and_quotes() {
        assert_eq!(quote("it's here"), "'it'\\''s here'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_run_as_wraps_in_sudo() {
        let cmd = run_as("postgres", "psql -A -t -c \"SELECT 1\"");
        assert_eq!(cmd, "sudo -u postgres -- sh -c 'psql -A -t -c \"SELECT 1\"'");
    }

    #[test]
    fn test_parse_passwd_line() {
        let user = parse_passwd_line("funkwhale:x:999:998::/srv/funkwhale:/bin/false\n").unwrap();
        assert_eq!(user.name, "funkwhale");
        assert_eq!(user.uid, 999);
        assert_eq!(user.gid, 998);
        assert_eq!(user.home, "/srv/funkwhale");
        assert_eq!(user.shell, "/bin/false");
    }

    #[test]
    fn test_parse_passwd_line_malformed() {
        assert!(parse_passwd_line("funkwhale:x:999").is_none());
        assert!(parse_passwd_line("funkwhale:x:abc:998::/srv:/bin/false").is_none());
    }

    #[tokio::test]
    async fn test_local_file_and_content() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("django_secret_key");
        fs::write(&file_path, b"s3cr3t").unwrap();

        let host = ShellHost::new("local", Transport::Local);

        let dir_info = host.file(&dir.path().to_string_lossy()).await.unwrap();
        assert!(dir_info.exists);
        assert!(dir_info.is_directory);

        let path = file_path.to_string_lossy();
        let info = host.file(&path).await.unwrap();
        assert!(info.exists);
        assert!(!info.is_directory);
        assert!(info.owner.is_some());

        let content = host.file_content(&path).await.unwrap();
        assert_eq!(content.as_deref(), Some(&b"s3cr3t"[..]));
    }

    #[tokio::test]
    async fn test_local_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope").to_string_lossy().into_owned();

        let host = ShellHost::new("local", Transport::Local);
        assert!(!host.file(&missing).await.unwrap().exists);
        assert!(host.file_content(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_find_command() {
        let host = ShellHost::new("local", Transport::Local);
        let sh = host.find_command("sh").await.unwrap();
        assert!(sh.map(|p| p.ends_with("/sh")).unwrap_or(false));
        assert!(host.find_command("definitely-not-a-command-xyz").await.unwrap().is_none());
    }
}
