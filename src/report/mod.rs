use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use crate::check::{CheckResult, CheckStatus, FailureKind, VerifyReport};
use crate::diff::colorize_diff_line;
use crate::error::Result;

#[derive(Debug, Clone, Tabled)]
pub struct ResultTableRow {
    #[tabled(rename = "Host")]
    pub host: String,
    #[tabled(rename = "Check")]
    pub check: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl ResultTableRow {
    fn new(host: &str, result: &CheckResult) -> Self {
        Self {
            host: host.to_string(),
            check: result.name.clone(),
            status: format!("{} {}", result.status.symbol(), result.status),
            message: result.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl Totals {
    pub fn of(reports: &[VerifyReport]) -> Self {
        reports.iter().fold(Totals::default(), |acc, r| Totals {
            passed: acc.passed + r.passed_count(),
            failed: acc.failed + r.failed_count(),
            errors: acc.errors + r.error_count(),
        })
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl std::fmt::Display for Totals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} passed, {} failed, {} errors", self.passed, self.failed, self.errors)
    }
}

pub fn render_console(report: &VerifyReport) -> String {
    let mut out = format!("Verifying {}\n", report.host.bold());

    for result in &report.results {
        let icon = match result.status {
            CheckStatus::Passed => result.status.symbol().green(),
            CheckStatus::Failed => result.status.symbol().red(),
            CheckStatus::Error => result.status.symbol().yellow(),
        };

        out.push_str(&format!("  {} {}: {}\n", icon, result.name, result.message));

        if let Some(kind) = &result.kind {
            if result.status != CheckStatus::Passed {
                out.push_str(&format!("    {}\n", format!("({})", kind).dimmed()));
            }
        }
        if let Some(details) = &result.details {
            let is_diff = result.kind == Some(FailureKind::UnexpectedOutput);
            for line in details.lines() {
                let line = if is_diff { colorize_diff_line(line) } else { line.to_string() };
                out.push_str(&format!("    {}\n", line));
            }
        }
    }

    out
}

pub fn render_table(reports: &[VerifyReport]) -> String {
    let rows: Vec<ResultTableRow> = reports
        .iter()
        .flat_map(|r| r.results.iter().map(move |result| ResultTableRow::new(&r.host, result)))
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::markdown());
    table.to_string()
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    totals: Totals,
    reports: &'a [VerifyReport],
}

pub fn render_json(reports: &[VerifyReport]) -> Result<String> {
    let doc = ReportDocument { totals: Totals::of(reports), reports };
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn render_yaml(reports: &[VerifyReport]) -> Result<String> {
    let doc = ReportDocument { totals: Totals::of(reports), reports };
    Ok(serde_yaml::to_string(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::format_output_diff;

    fn sample_report() -> VerifyReport {
        let mut report = VerifyReport::new("instance");
        report.results.push(CheckResult::passed("service nginx", "Service nginx running and enabled"));
        report.results.push(
            CheckResult::failed("env file settings", FailureKind::ContentMismatch, "1 of 2 expected strings missing")
                .with_details("CACHE_URL=redis://127.0.0.1:6379/0"),
        );
        report
    }

    #[test]
    fn test_totals() {
        let totals = Totals::of(&[sample_report(), sample_report()]);
        assert_eq!(totals, Totals { passed: 2, failed: 2, errors: 0 });
        assert!(!totals.all_passed());
        assert_eq!(totals.to_string(), "2 passed, 2 failed, 0 errors");
    }

    #[test]
    fn test_console_lists_every_check() {
        let out = render_console(&sample_report());
        assert!(out.contains("service nginx"));
        assert!(out.contains("env file settings"));
        assert!(out.contains("CACHE_URL=redis://127.0.0.1:6379/0"));
        assert!(out.contains("content mismatch"));
    }

    #[test]
    fn test_table_has_header_and_rows() {
        let out = render_table(&[sample_report()]);
        assert!(out.contains("| Host"));
        assert!(out.contains("✗ failed"));
        assert_eq!(out.lines().count(), 4);
    }

    #[test]
    fn test_json_document() {
        let json = render_json(&[sample_report()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["totals"]["failed"], 1);
        assert_eq!(value["reports"][0]["results"][1]["status"], "failed");
        assert_eq!(value["reports"][0]["results"][1]["kind"], "content_mismatch");
    }

    #[test]
    fn test_yaml_document() {
        let yaml = render_yaml(&[sample_report()]).unwrap();
        assert!(yaml.contains("host: instance"));
    }

    fn diff_report() -> VerifyReport {
        let mut report = VerifyReport::new("instance");
        report.results.push(
            CheckResult::failed("database created", FailureKind::UnexpectedOutput, "Output '' (expected '1')")
                .with_details(format_output_diff("1", "")),
        );
        report
    }

    #[test]
    fn test_structured_output_has_no_escape_codes() {
        let reports = [diff_report()];
        let json = render_json(&reports).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let details = value["reports"][0]["results"][0]["details"].as_str().unwrap();
        assert_eq!(details, "--- expected\n+++ actual\n-1\n+(no output)");

        assert!(!render_yaml(&reports).unwrap().contains('\x1b'));
        assert!(!render_table(&reports).contains('\x1b'));
    }

    #[test]
    fn test_console_shows_diff_lines() {
        let out = render_console(&diff_report());
        assert!(out.contains("-1"));
        assert!(out.contains("+(no output)"));
    }
}
