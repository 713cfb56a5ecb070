use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub check: CheckKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Package reported installed by the host's package manager
    Package {
        package: String,
    },

    /// Service both running and enabled at boot
    Service {
        service: String,
    },

    /// Path exists, optionally with a required directory-ness
    File {
        path: String,
        #[serde(default)]
        directory: Option<bool>,
    },

    FileOwner {
        path: String,
        owner: String,
        group: String,
    },

    /// Every literal appears somewhere in the file
    FileContains {
        path: String,
        contains: Vec<String>,
    },

    /// Every regular expression matches the file
    FileMatches {
        path: String,
        patterns: Vec<String>,
    },

    /// Read `source`, then expect `template` with `{value}` filled in inside `path`
    DerivedContains {
        source: String,
        path: String,
        template: String,
        #[serde(default)]
        trim: bool,
    },

    /// Trimmed stdout of a command equals `expected`
    CommandOutput {
        command: String,
        #[serde(default)]
        user: Option<String>,
        expected: String,
    },

    User {
        user: String,
        #[serde(default)]
        home: Option<String>,
        #[serde(default)]
        shell: Option<String>,
    },

    /// Executable resolves to `expected` on the search path
    CommandPath {
        command: String,
        expected: String,
    },

    HttpContains {
        url: String,
        #[serde(default)]
        host_header: Option<String>,
        #[serde(default = "default_insecure")]
        insecure: bool,
        #[serde(default)]
        via: HttpVia,
        contains: Vec<String>,
    },

    /// JSON body field at a dotted path equals `expected`
    HttpJson {
        url: String,
        #[serde(default)]
        host_header: Option<String>,
        #[serde(default = "default_insecure")]
        insecure: bool,
        #[serde(default)]
        via: HttpVia,
        field: String,
        expected: String,
    },

    /// Named distributions installed in a virtualenv
    PipPackages {
        pip: String,
        packages: Vec<String>,
    },
}

/// Where an HTTP probe is issued from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpVia {
    /// `curl` on the target, so `localhost` is the target itself
    #[default]
    Host,
    /// The verifier's own HTTP client
    Direct,
}

impl HttpVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVia::Host => "host",
            HttpVia::Direct => "direct",
        }
    }
}

fn default_insecure() -> bool {
    true
}

impl CheckDef {
    /// Static problems that would make the check meaningless on any host.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("check name is empty".to_string());
        }

        match &self.check {
            CheckKind::FileContains { contains, .. } | CheckKind::HttpContains { contains, .. }
                if contains.is_empty() =>
            {
                Err(format!("{}: 'contains' lists no strings", self.name))
            }
            CheckKind::FileMatches { patterns, .. } => {
                if patterns.is_empty() {
                    return Err(format!("{}: 'patterns' lists no expressions", self.name));
                }
                for pattern in patterns {
                    regex::Regex::new(pattern)
                        .map_err(|e| format!("{}: invalid pattern '{}': {}", self.name, pattern, e))?;
                }
                Ok(())
            }
            CheckKind::DerivedContains { template, .. } if !template.contains("{value}") => {
                Err(format!("{}: template '{}' has no {{value}} placeholder", self.name, template))
            }
            CheckKind::PipPackages { packages, .. } if packages.is_empty() => {
                Err(format!("{}: 'packages' lists no distributions", self.name))
            }
            CheckKind::HttpJson { field, .. } if field.trim().is_empty() => {
                Err(format!("{}: 'field' is empty", self.name))
            }
            _ => Ok(()),
        }
    }
}

impl CheckKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CheckKind::Package { .. } => "package",
            CheckKind::Service { .. } => "service",
            CheckKind::File { .. } => "file",
            CheckKind::FileOwner { .. } => "file_owner",
            CheckKind::FileContains { .. } => "file_contains",
            CheckKind::FileMatches { .. } => "file_matches",
            CheckKind::DerivedContains { .. } => "derived_contains",
            CheckKind::CommandOutput { .. } => "command_output",
            CheckKind::User { .. } => "user",
            CheckKind::CommandPath { .. } => "command_path",
            CheckKind::HttpContains { .. } => "http_contains",
            CheckKind::HttpJson { .. } => "http_json",
            CheckKind::PipPackages { .. } => "pip_packages",
        }
    }

    /// The resource the check looks at, for listings.
    pub fn target(&self) -> &str {
        match self {
            CheckKind::Package { package } => package,
            CheckKind::Service { service } => service,
            CheckKind::File { path, .. }
            | CheckKind::FileOwner { path, .. }
            | CheckKind::FileContains { path, .. }
            | CheckKind::FileMatches { path, .. }
            | CheckKind::DerivedContains { path, .. } => path,
            CheckKind::CommandOutput { command, .. } | CheckKind::CommandPath { command, .. } => command,
            CheckKind::User { user, .. } => user,
            CheckKind::HttpContains { url, .. } | CheckKind::HttpJson { url, .. } => url,
            CheckKind::PipPackages { pip, .. } => pip,
        }
    }
}
