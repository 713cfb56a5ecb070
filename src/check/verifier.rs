use std::collections::BTreeSet;
use std::time::Instant;
use regex::Regex;
use tokio::time::Duration;
use tracing::{debug, info};
use crate::diff::{format_output_diff, has_changes};
use crate::error::{HostVerifyError, Result};
use crate::host::{run_as, Host};
use super::http::{json_equals, json_field, HttpProbe};
use super::result::{CheckResult, CheckStatus, FailureKind, VerifyReport};
use super::types::{CheckDef, CheckKind};

/// Runs a battery of checks against one host.
///
/// Every check runs regardless of earlier outcomes; an error raised while
/// evaluating a check only turns that check into [`CheckStatus::Error`].
pub struct Verifier<'a> {
    host: &'a dyn Host,
    http_timeout: Duration,
}

impl<'a> Verifier<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            http_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub async fn verify(&self, checks: &[CheckDef]) -> VerifyReport {
        let mut report = VerifyReport::new(self.host.label());
        report.results = self.run_checks(checks).await;

        info!(
            "{}: {} passed, {} failed, {} errors",
            report.host,
            report.passed_count(),
            report.failed_count(),
            report.error_count()
        );

        report
    }

    pub async fn run_checks(&self, checks: &[CheckDef]) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(checks.len());

        for check in checks {
            results.push(self.run_check(check).await);
        }

        results
    }

    pub async fn run_check(&self, check: &CheckDef) -> CheckResult {
        let started = Instant::now();

        let result = match self.evaluate(check).await {
            Ok(result) => result,
            Err(e) => {
                let result = CheckResult::error(&check.name, e.to_string());
                if e.is_unreachable() {
                    result.with_kind(FailureKind::UnreachableHost)
                } else {
                    result
                }
            }
        };

        match result.status {
            CheckStatus::Passed => debug!("{} {}: {}", result.status.symbol(), check.name, result.message),
            _ => debug!("{} {} ({}): {}", result.status.symbol(), check.name, result.status, result.message),
        }

        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    async fn evaluate(&self, check: &CheckDef) -> Result<CheckResult> {
        let name = check.name.as_str();
        match &check.check {
            CheckKind::Package { package } => self.check_package(name, package).await,
            CheckKind::Service { service } => self.check_service(name, service).await,
            CheckKind::File { path, directory } => self.check_file(name, path, *directory).await,
            CheckKind::FileOwner { path, owner, group } => {
                self.check_file_owner(name, path, owner, group).await
            }
            CheckKind::FileContains { path, contains } => {
                self.check_file_contains(name, path, contains).await
            }
            CheckKind::FileMatches { path, patterns } => {
                self.check_file_matches(name, path, patterns).await
            }
            CheckKind::DerivedContains { source, path, template, trim } => {
                self.check_derived_contains(name, source, path, template, *trim).await
            }
            CheckKind::CommandOutput { command, user, expected } => {
                self.check_command_output(name, command, user.as_deref(), expected).await
            }
            CheckKind::User { user, home, shell } => {
                self.check_user(name, user, home.as_deref(), shell.as_deref()).await
            }
            CheckKind::CommandPath { command, expected } => {
                self.check_command_path(name, command, expected).await
            }
            CheckKind::HttpContains { url, host_header, insecure, via, contains } => {
                let probe = HttpProbe { url, host_header: host_header.as_deref(), insecure: *insecure, via: *via };
                self.check_http_contains(name, probe, contains).await
            }
            CheckKind::HttpJson { url, host_header, insecure, via, field, expected } => {
                let probe = HttpProbe { url, host_header: host_header.as_deref(), insecure: *insecure, via: *via };
                self.check_http_json(name, probe, field, expected).await
            }
            CheckKind::PipPackages { pip, packages } => {
                self.check_pip_packages(name, pip, packages).await
            }
        }
    }

    async fn read_text(&self, path: &str) -> Result<Option<String>> {
        match self.host.file_content(path).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| HostVerifyError::Decode(format!("{} is not valid UTF-8: {}", path, e))),
            None => Ok(None),
        }
    }

    async fn check_package(&self, name: &str, package: &str) -> Result<CheckResult> {
        let state = self.host.package(package).await?;

        if state.installed {
            let version = state.version.map(|v| format!(" ({})", v)).unwrap_or_default();
            Ok(CheckResult::passed(name, format!("Package {} installed{}", package, version)))
        } else {
            Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("Package {} is not installed", package)))
        }
    }

    async fn check_service(&self, name: &str, service: &str) -> Result<CheckResult> {
        let state = self.host.service(service).await?;

        let message = match (state.running, state.enabled) {
            (true, true) => {
                return Ok(CheckResult::passed(name, format!("Service {} running and enabled", service)));
            }
            (true, false) => format!("Service {} is running but not enabled", service),
            (false, true) => format!("Service {} is enabled but not running", service),
            (false, false) => format!("Service {} is neither running nor enabled", service),
        };

        Ok(CheckResult::failed(name, FailureKind::MissingResource, message))
    }

    async fn check_file(&self, name: &str, path: &str, directory: Option<bool>) -> Result<CheckResult> {
        let info = self.host.file(path).await?;

        if !info.exists {
            return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", path)));
        }

        match directory {
            Some(true) if !info.is_directory => Ok(CheckResult::failed(
                name,
                FailureKind::MissingResource,
                format!("{} exists but is not a directory", path),
            )),
            Some(false) if info.is_directory => Ok(CheckResult::failed(
                name,
                FailureKind::MissingResource,
                format!("{} exists but is a directory", path),
            )),
            Some(true) => Ok(CheckResult::passed(name, format!("{} is a directory", path))),
            _ => Ok(CheckResult::passed(name, format!("{} exists", path))),
        }
    }

    async fn check_file_owner(&self, name: &str, path: &str, owner: &str, group: &str) -> Result<CheckResult> {
        let info = self.host.file(path).await?;

        if !info.exists {
            return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", path)));
        }

        let actual_owner = info.owner.unwrap_or_default();
        let actual_group = info.group.unwrap_or_default();

        if actual_owner == owner && actual_group == group {
            Ok(CheckResult::passed(name, format!("{} owned by {}:{}", path, owner, group)))
        } else {
            Ok(CheckResult::failed(
                name,
                FailureKind::ContentMismatch,
                format!("{} owned by {}:{} (expected {}:{})", path, actual_owner, actual_group, owner, group),
            ))
        }
    }

    async fn check_file_contains(&self, name: &str, path: &str, contains: &[String]) -> Result<CheckResult> {
        let content = match self.read_text(path).await? {
            Some(content) => content,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", path)));
            }
        };

        Ok(containment_result(name, path, &content, contains))
    }

    async fn check_file_matches(&self, name: &str, path: &str, patterns: &[String]) -> Result<CheckResult> {
        let content = match self.read_text(path).await? {
            Some(content) => content,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", path)));
            }
        };

        let mut unmatched = Vec::new();
        for pattern in patterns {
            let re = Regex::new(pattern)
                .map_err(|e| HostVerifyError::SuiteParse(format!("invalid pattern '{}': {}", pattern, e)))?;
            if !re.is_match(&content) {
                unmatched.push(pattern.as_str());
            }
        }

        if unmatched.is_empty() {
            Ok(CheckResult::passed(name, format!("{} matches {} patterns", path, patterns.len())))
        } else {
            Ok(CheckResult::failed(
                name,
                FailureKind::ContentMismatch,
                format!("{} of {} patterns did not match {}", unmatched.len(), patterns.len(), path),
            ).with_details(unmatched.join("\n")))
        }
    }

    async fn check_derived_contains(
        &self,
        name: &str,
        source: &str,
        path: &str,
        template: &str,
        trim: bool,
    ) -> Result<CheckResult> {
        let raw = match self.read_text(source).await? {
            Some(raw) => raw,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", source)));
            }
        };

        let value = if trim { raw.trim() } else { raw.as_str() };
        if value.is_empty() {
            return Ok(CheckResult::failed(name, FailureKind::ContentMismatch, format!("{} is empty", source)));
        }

        let content = match self.read_text(path).await? {
            Some(content) => content,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} does not exist", path)));
            }
        };

        let expected = template.replace("{value}", value);

        // Messages name the template, never the value: sources are usually secrets.
        if content.contains(&expected) {
            Ok(CheckResult::passed(name, format!("{} contains {} (value from {})", path, template, source)))
        } else {
            Ok(CheckResult::failed(
                name,
                FailureKind::ContentMismatch,
                format!("{} does not contain {} with the value from {}", path, template, source),
            ))
        }
    }

    async fn check_command_output(
        &self,
        name: &str,
        command: &str,
        user: Option<&str>,
        expected: &str,
    ) -> Result<CheckResult> {
        let command_line = match user {
            Some(user) => run_as(user, command),
            None => command.to_string(),
        };

        let out = self.host.run(&command_line).await?;
        let actual = out.stdout.trim();

        if !has_changes(expected, actual) {
            return Ok(CheckResult::passed(name, format!("Output: {}", actual)));
        }

        let mut details = format_output_diff(expected, actual);
        if out.exit_status != 0 {
            details.push_str(&format!("\nexit status {}", out.exit_status));
        }
        if !out.stderr.trim().is_empty() {
            details.push_str(&format!("\nstderr: {}", out.stderr.trim()));
        }

        Ok(CheckResult::failed(
            name,
            FailureKind::UnexpectedOutput,
            format!("Output '{}' (expected '{}')", actual, expected),
        ).with_details(details))
    }

    async fn check_user(
        &self,
        name: &str,
        user: &str,
        home: Option<&str>,
        shell: Option<&str>,
    ) -> Result<CheckResult> {
        let info = match self.host.user(user).await? {
            Some(info) => info,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("User {} does not exist", user)));
            }
        };

        let mut violations = Vec::new();
        if let Some(home) = home {
            if info.home != home {
                violations.push(format!("home {} != {}", info.home, home));
            }
        }
        if let Some(shell) = shell {
            if info.shell != shell {
                violations.push(format!("shell {} != {}", info.shell, shell));
            }
        }

        if violations.is_empty() {
            Ok(CheckResult::passed(name, format!("User {} (home {}, shell {})", user, info.home, info.shell)))
        } else {
            Ok(CheckResult::failed(name, FailureKind::ContentMismatch, violations.join(", ")))
        }
    }

    async fn check_command_path(&self, name: &str, command: &str, expected: &str) -> Result<CheckResult> {
        match self.host.find_command(command).await? {
            Some(path) if path == expected => {
                Ok(CheckResult::passed(name, format!("{} resolves to {}", command, path)))
            }
            Some(path) => Ok(CheckResult::failed(
                name,
                FailureKind::UnexpectedOutput,
                format!("{} resolves to {} (expected {})", command, path, expected),
            )),
            None => Ok(CheckResult::failed(
                name,
                FailureKind::MissingResource,
                format!("{} not found on the search path", command),
            )),
        }
    }

    async fn check_http_contains(&self, name: &str, probe: HttpProbe<'_>, contains: &[String]) -> Result<CheckResult> {
        let body = probe.fetch(self.host, self.http_timeout).await?;
        Ok(containment_result(name, probe.url, &body, contains))
    }

    async fn check_http_json(
        &self,
        name: &str,
        probe: HttpProbe<'_>,
        field: &str,
        expected: &str,
    ) -> Result<CheckResult> {
        let body = probe.fetch(self.host, self.http_timeout).await?;
        let data: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| HostVerifyError::Decode(format!("malformed JSON from {}: {}", probe.url, e)))?;

        match json_field(&data, field) {
            Some(value) if json_equals(value, expected) => {
                Ok(CheckResult::passed(name, format!("{} = {}", field, expected)))
            }
            Some(value) => Ok(CheckResult::failed(
                name,
                FailureKind::ContentMismatch,
                format!("{} = {} (expected {})", field, value, expected),
            )),
            None => Ok(CheckResult::failed(
                name,
                FailureKind::ContentMismatch,
                format!("{} not present in response from {}", field, probe.url),
            )),
        }
    }

    async fn check_pip_packages(&self, name: &str, pip: &str, packages: &[String]) -> Result<CheckResult> {
        let installed = match self.host.pip_packages(pip).await? {
            Some(installed) => installed,
            None => {
                return Ok(CheckResult::failed(name, FailureKind::MissingResource, format!("{} is not executable", pip)));
            }
        };

        let normalized: BTreeSet<String> = installed.keys().map(|k| normalize_distribution(k)).collect();
        let missing: Vec<&str> = packages
            .iter()
            .filter(|p| !normalized.contains(&normalize_distribution(p)))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(CheckResult::passed(name, format!("{} packages installed via {}", packages.len(), pip)))
        } else {
            Ok(CheckResult::failed(
                name,
                FailureKind::MissingResource,
                format!("Missing from {}: {}", pip, missing.join(", ")),
            ))
        }
    }
}

/// AND over literal substrings: passes only if every one is present.
fn containment_result(name: &str, origin: &str, content: &str, expected: &[String]) -> CheckResult {
    let missing: Vec<&str> = expected
        .iter()
        .filter(|s| !content.contains(s.as_str()))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        CheckResult::passed(name, format!("{} contains all {} expected strings", origin, expected.len()))
    } else {
        CheckResult::failed(
            name,
            FailureKind::ContentMismatch,
            format!("{} of {} expected strings missing from {}", missing.len(), expected.len(), origin),
        ).with_details(missing.join("\n"))
    }
}

/// PEP 503 name normalization.
fn normalize_distribution(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == '.' {
            if !last_dash {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.extend(c.to_lowercase());
            last_dash = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_all_present_any_order() {
        let content = "B=2\nextra\nA=1\n";
        let result = containment_result("env", ".env", content, &["A=1".into(), "B=2".into()]);
        assert_eq!(result.status, CheckStatus::Passed);
    }

    #[test]
    fn test_containment_one_missing_fails() {
        let content = "A=1\n";
        let result = containment_result("env", ".env", content, &["A=1".into(), "B=2".into()]);
        assert_eq!(result.status, CheckStatus::Failed);
        assert_eq!(result.kind, Some(FailureKind::ContentMismatch));
        assert_eq!(result.details.as_deref(), Some("B=2"));
    }

    #[test]
    fn test_normalize_distribution() {
        assert_eq!(normalize_distribution("Django"), "django");
        assert_eq!(normalize_distribution("django_rest.framework"), "django-rest-framework");
        assert_eq!(normalize_distribution("a__b"), "a-b");
    }
}
