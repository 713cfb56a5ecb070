mod builtin;
mod loader;

use serde::Serialize;
use crate::check::CheckDef;

pub use builtin::{builtin_names, builtin_source};
pub use loader::SuiteLoader;

/// A named battery of checks.
#[derive(Debug, Clone, Serialize)]
pub struct Suite {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the suite was loaded from, a path or `builtin:<name>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub checks: Vec<CheckDef>,
}

impl Suite {
    /// Keep only checks whose name contains `needle`.
    pub fn retain_matching(&mut self, needle: &str) {
        self.checks.retain(|c| c.name.contains(needle));
    }
}
