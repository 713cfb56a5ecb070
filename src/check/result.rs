use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Error,
}

impl CheckStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "✓",
            CheckStatus::Failed => "✗",
            CheckStatus::Error => "!",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Passed => write!(f, "passed"),
            CheckStatus::Failed => write!(f, "failed"),
            CheckStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingResource,
    ContentMismatch,
    UnreachableHost,
    UnexpectedOutput,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::MissingResource => write!(f, "missing resource"),
            FailureKind::ContentMismatch => write!(f, "content mismatch"),
            FailureKind::UnreachableHost => write!(f, "unreachable host"),
            FailureKind::UnexpectedOutput => write!(f, "unexpected output"),
        }
    }
}

impl CheckResult {
    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Passed,
            message: message.into(),
            details: None,
            kind: None,
            elapsed_ms: 0,
        }
    }

    pub fn failed(name: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Failed,
            message: message.into(),
            details: None,
            kind: Some(kind),
            elapsed_ms: 0,
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            message: message.into(),
            details: None,
            kind: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub run_id: Uuid,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub started_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
}

impl VerifyReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            host: host.into(),
            suite: None,
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    /// A run succeeds only when every check passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.is_passed())
    }

    pub fn passed_count(&self) -> usize {
        self.count(CheckStatus::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(CheckStatus::Failed)
    }

    pub fn error_count(&self) -> usize {
        self.count(CheckStatus::Error)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.is_passed())
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
