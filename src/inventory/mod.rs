use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tokio::time::Duration;
use crate::error::{HostVerifyError, Result};
use crate::host::{ShellHost, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSpec {
    pub name: String,
    pub transport: Transport,
    pub become_root: bool,
}

impl HostSpec {
    pub fn local() -> Self {
        Self {
            name: "localhost".to_string(),
            transport: Transport::Local,
            become_root: false,
        }
    }

    /// Parse `local://`, `ssh://[user@]host[:port]`, `docker://name` or `podman://name`.
    pub fn parse_uri(uri: &str) -> Result<Self> {
        let invalid = || HostVerifyError::InvalidHostUri(uri.to_string());
        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;

        let (name, transport) = match scheme {
            "local" => ("localhost".to_string(), Transport::Local),
            "ssh" => {
                let (user, host_port) = match rest.rsplit_once('@') {
                    Some((user, host_port)) if !user.is_empty() => (Some(user.to_string()), host_port),
                    Some(_) => return Err(invalid()),
                    None => (None, rest),
                };
                let (host, port) = match host_port.rsplit_once(':') {
                    Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
                    None => (host_port, None),
                };
                if host.is_empty() {
                    return Err(invalid());
                }
                (host.to_string(), Transport::Ssh { host: host.to_string(), user, port })
            }
            "docker" | "podman" => {
                if rest.is_empty() || rest.contains('/') {
                    return Err(invalid());
                }
                let container = rest.to_string();
                let transport = if scheme == "docker" {
                    Transport::Docker { container: container.clone() }
                } else {
                    Transport::Podman { container: container.clone() }
                };
                (container, transport)
            }
            _ => return Err(invalid()),
        };

        Ok(Self { name, transport, become_root: false })
    }

    pub fn connect(&self, timeout: Duration) -> ShellHost {
        ShellHost::new(self.name.clone(), self.transport.clone())
            .with_timeout(timeout)
            .with_become(self.become_root)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawGroup {
    #[serde(default)]
    hosts: Option<BTreeMap<String, Option<BTreeMap<String, Value>>>>,
    #[serde(default)]
    children: Option<BTreeMap<String, Option<RawGroup>>>,
    #[serde(default)]
    vars: Option<BTreeMap<String, Value>>,
}

/// The hosts a run verifies, handed to the verifier explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    hosts: Vec<HostSpec>,
}

impl Inventory {
    /// Hosts sharing a name collapse into the first one given.
    pub fn from_hosts(hosts: Vec<HostSpec>) -> Result<Self> {
        if hosts.is_empty() {
            return Err(HostVerifyError::Inventory("no hosts to verify".to_string()));
        }

        let mut seen = std::collections::BTreeSet::new();
        let hosts = hosts.into_iter().filter(|h| seen.insert(h.name.clone())).collect();
        Ok(Self { hosts })
    }

    pub fn load_ansible(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| HostVerifyError::Inventory(format!("{}: {}", path.display(), e)))?;
        Self::from_ansible_yaml(&content)
    }

    /// Read an Ansible YAML inventory (the format Molecule writes).
    ///
    /// Group `vars` flow down to child groups and hosts; host vars win.
    pub fn from_ansible_yaml(yaml: &str) -> Result<Self> {
        let groups: BTreeMap<String, Option<RawGroup>> = serde_yaml::from_str(yaml)
            .map_err(|e| HostVerifyError::Inventory(e.to_string()))?;

        let mut collected: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for group in groups.values().flatten() {
            collect_group(group, &BTreeMap::new(), &mut collected);
        }

        let hosts = collected
            .into_iter()
            .map(|(name, vars)| host_from_vars(name, &vars))
            .collect::<Result<Vec<_>>>()?;

        Self::from_hosts(hosts)
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Force privilege escalation on every host.
    pub fn with_become(mut self) -> Self {
        for host in &mut self.hosts {
            host.become_root = true;
        }
        self
    }
}

fn collect_group(
    group: &RawGroup,
    inherited: &BTreeMap<String, Value>,
    out: &mut BTreeMap<String, BTreeMap<String, Value>>,
) {
    let mut vars = inherited.clone();
    if let Some(group_vars) = &group.vars {
        vars.extend(group_vars.clone());
    }

    if let Some(hosts) = &group.hosts {
        for (name, host_vars) in hosts {
            let entry = out.entry(name.clone()).or_default();
            for (k, v) in &vars {
                entry.entry(k.clone()).or_insert_with(|| v.clone());
            }
            if let Some(host_vars) = host_vars {
                entry.extend(host_vars.clone());
            }
        }
    }

    if let Some(children) = &group.children {
        for child in children.values().flatten() {
            collect_group(child, &vars, out);
        }
    }
}

fn host_from_vars(name: String, vars: &BTreeMap<String, Value>) -> Result<HostSpec> {
    let text = |key: &str| -> Option<String> {
        match vars.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    };

    let address = text("ansible_host").unwrap_or_else(|| name.clone());
    let connection = text("ansible_connection").unwrap_or_else(|| "ssh".to_string());

    let transport = match connection.rsplit('.').next().unwrap_or_default() {
        "local" => Transport::Local,
        "ssh" | "paramiko" => {
            let port = match text("ansible_port") {
                Some(p) => Some(p.parse::<u16>().map_err(|_| {
                    HostVerifyError::Inventory(format!("{}: invalid ansible_port '{}'", name, p))
                })?),
                None => None,
            };
            Transport::Ssh {
                host: address,
                user: text("ansible_user"),
                port,
            }
        }
        "docker" => Transport::Docker { container: address },
        "podman" => Transport::Podman { container: address },
        other => {
            return Err(HostVerifyError::Inventory(format!(
                "{}: unsupported ansible_connection '{}'",
                name, other
            )))
        }
    };

    let become_root = matches!(
        text("ansible_become").as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("yes") | Some("1")
    );

    Ok(HostSpec { name, transport, become_root })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri_local() {
        let spec = HostSpec::parse_uri("local://").unwrap();
        assert_eq!(spec, HostSpec::local());
    }

    #[test]
    fn test_parse_uri_ssh_full() {
        let spec = HostSpec::parse_uri("ssh://deploy@funkwhale.example:2222").unwrap();
        assert_eq!(spec.name, "funkwhale.example");
        assert_eq!(spec.transport, Transport::Ssh {
            host: "funkwhale.example".into(),
            user: Some("deploy".into()),
            port: Some(2222),
        });
    }

    #[test]
    fn test_parse_uri_ssh_bare() {
        let spec = HostSpec::parse_uri("ssh://10.0.0.5").unwrap();
        assert_eq!(spec.transport, Transport::Ssh { host: "10.0.0.5".into(), user: None, port: None });
    }

    #[test]
    fn test_parse_uri_docker() {
        let spec = HostSpec::parse_uri("docker://instance").unwrap();
        assert_eq!(spec.transport, Transport::Docker { container: "instance".into() });
    }

    #[test]
    fn test_parse_uri_invalid() {
        assert!(HostSpec::parse_uri("instance").is_err());
        assert!(HostSpec::parse_uri("ftp://instance").is_err());
        assert!(HostSpec::parse_uri("ssh://host:notaport").is_err());
        assert!(HostSpec::parse_uri("docker://").is_err());
    }

    #[test]
    fn test_empty_inventory_rejected() {
        assert!(Inventory::from_hosts(vec![]).is_err());
    }

    #[test]
    fn test_duplicate_hosts_collapse() {
        let inv = Inventory::from_hosts(vec![
            HostSpec::parse_uri("docker://instance").unwrap(),
            HostSpec::local(),
            HostSpec::parse_uri("podman://instance").unwrap(),
        ])
        .unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.hosts()[0].transport, Transport::Docker { container: "instance".into() });
    }

    #[test]
    fn test_molecule_docker_inventory() {
        let yaml = r#"
all:
  hosts:
    instance:
      ansible_connection: docker
      ansible_host: instance
ungrouped:
  vars: {}
"#;
        let inv = Inventory::from_ansible_yaml(yaml).unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.hosts()[0].transport, Transport::Docker { container: "instance".into() });
    }

    #[test]
    fn test_group_vars_inherited_and_overridden() {
        let yaml = r#"
all:
  vars:
    ansible_user: root
    ansible_become: "yes"
  children:
    web:
      vars:
        ansible_port: 2222
      hosts:
        web1:
          ansible_host: 10.0.0.1
        web2:
          ansible_host: 10.0.0.2
          ansible_user: deploy
"#;
        let inv = Inventory::from_ansible_yaml(yaml).unwrap();
        assert_eq!(inv.len(), 2);

        let web1 = &inv.hosts()[0];
        assert_eq!(web1.name, "web1");
        assert!(web1.become_root);
        assert_eq!(web1.transport, Transport::Ssh {
            host: "10.0.0.1".into(),
            user: Some("root".into()),
            port: Some(2222),
        });

        let web2 = &inv.hosts()[1];
        assert_eq!(web2.transport, Transport::Ssh {
            host: "10.0.0.2".into(),
            user: Some("deploy".into()),
            port: Some(2222),
        });
    }

    #[test]
    fn test_fully_qualified_connection_plugin() {
        let yaml = r#"
all:
  hosts:
    instance:
      ansible_connection: community.docker.docker
"#;
        let inv = Inventory::from_ansible_yaml(yaml).unwrap();
        assert_eq!(inv.hosts()[0].transport, Transport::Docker { container: "instance".into() });
    }

    #[test]
    fn test_unsupported_connection() {
        let yaml = "all:\n  hosts:\n    win:\n      ansible_connection: winrm\n";
        let err = Inventory::from_ansible_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("winrm"));
    }
}
