use colored::Colorize;
use similar::{ChangeTag, TextDiff};

const EMPTY: &str = "(no output)";

/// Plain-text line diff between what a check expected and what the host
/// produced. Color is added at render time by [`colorize_diff`].
pub fn format_output_diff(expected: &str, actual: &str) -> String {
    let expected = expected.trim_end();
    let actual = actual.trim_end();

    let mut out = vec!["--- expected".to_string(), "+++ actual".to_string()];

    if actual.is_empty() {
        out.extend(expected.lines().map(|l| format!("-{}", l)));
        out.push(format!("+{}", EMPTY));
        return out.join("\n");
    }

    for change in TextDiff::from_lines(expected, actual).iter_all_changes() {
        let text = change.value().trim_end_matches('\n');
        out.push(match change.tag() {
            ChangeTag::Equal => format!(" {}", text),
            ChangeTag::Delete => format!("-{}", text),
            ChangeTag::Insert => format!("+{}", text),
        });
    }

    out.join("\n")
}

/// Color one line of [`format_output_diff`] output for a terminal.
pub fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("---") || line.starts_with("+++") {
        line.bold().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else {
        line.to_string()
    }
}

/// Outputs differing only in surrounding whitespace count as equal.
pub fn has_changes(expected: &str, actual: &str) -> bool {
    expected.trim() != actual.trim()
}
