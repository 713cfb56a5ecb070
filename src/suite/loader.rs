use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use glob::glob;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;
use crate::check::CheckDef;
use crate::error::{HostVerifyError, Result};
use super::builtin::builtin_source;
use super::Suite;

#[derive(Deserialize)]
struct RawSuite {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    vars: BTreeMap<String, Value>,
    checks: Vec<Value>,
}

pub struct SuiteLoader;

impl SuiteLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load_dir(&self, path: impl AsRef<Path>) -> Result<Vec<Suite>> {
        let mut files: Vec<PathBuf> = Vec::new();

        for ext in ["yaml", "yml"] {
            let pattern = path.as_ref().join(format!("**/*.{}", ext));
            let pattern_str = pattern.to_string_lossy();
            files.extend(
                glob(&pattern_str)
                    .map_err(|e| HostVerifyError::SuiteParse(e.to_string()))?
                    .filter_map(|r| r.ok()),
            );
        }
        files.sort();

        files.into_iter().map(|file| self.load_file(&file)).collect()
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Suite> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| HostVerifyError::SuiteFileNotFound(path.display().to_string()))?;

        let mut suite = self.parse_str(&content, &path.display().to_string())?;
        suite.source = Some(path.display().to_string());
        Ok(suite)
    }

    /// A file, a directory of suites, or a built-in name.
    pub fn load_any(&self, reference: &str) -> Result<Vec<Suite>> {
        let path = Path::new(reference);
        if path.is_dir() {
            self.load_dir(path)
        } else if path.exists() {
            Ok(vec![self.load_file(path)?])
        } else {
            Ok(vec![self.load_builtin(reference)?])
        }
    }

    pub fn load_builtin(&self, name: &str) -> Result<Suite> {
        let source = builtin_source(name)
            .ok_or_else(|| HostVerifyError::SuiteFileNotFound(format!("builtin:{}", name)))?;
        let mut suite = self.parse_str(source, &format!("builtin:{}", name))?;
        suite.source = Some(format!("builtin:{}", name));
        Ok(suite)
    }

    pub fn parse_str(&self, yaml: &str, origin: &str) -> Result<Suite> {
        let raw: RawSuite = serde_yaml::from_str(yaml)
            .map_err(|e| HostVerifyError::SuiteParse(format!("{}: {}", origin, e)))?;

        if raw.checks.is_empty() {
            return Err(HostVerifyError::SuiteParse(format!("{}: suite '{}' defines no checks", origin, raw.name)));
        }

        let mut vars = BTreeMap::new();
        for (key, value) in &raw.vars {
            let value = scalar_to_string(value)
                .map_err(|e| HostVerifyError::SuiteParse(format!("{}: var '{}': {}", origin, key, e)))?;
            vars.insert(key.clone(), value);
        }

        let pattern = placeholder_pattern()?;
        let mut checks = Vec::new();
        let mut seen = HashSet::new();

        for (index, row) in raw.checks.into_iter().enumerate() {
            for expanded in expand_row(row, &vars, &pattern)
                .map_err(|e| HostVerifyError::SuiteParse(format!("{}: check #{}: {}", origin, index + 1, e)))?
            {
                let check: CheckDef = serde_yaml::from_value(expanded)
                    .map_err(|e| HostVerifyError::SuiteParse(format!("{}: check #{}: {}", origin, index + 1, e)))?;

                check.validate()
                    .map_err(|e| HostVerifyError::SuiteParse(format!("{}: {}", origin, e)))?;

                if !seen.insert(check.name.clone()) {
                    return Err(HostVerifyError::DuplicateCheck {
                        suite: raw.name.clone(),
                        name: check.name,
                    });
                }

                checks.push(check);
            }
        }

        debug!("Loaded suite '{}' with {} checks from {}", raw.name, checks.len(), origin);

        Ok(Suite {
            name: raw.name,
            description: raw.description,
            source: None,
            checks,
        })
    }
}

impl Default for SuiteLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// `{{` and `}}` escapes, then the `{item}`, `{item.KEY}` and `{vars.KEY}` tokens.
const PLACEHOLDER_PATTERN: &str = r"\{\{|\}\}|\{(item(?:\.[A-Za-z0-9_-]+)?|vars\.[A-Za-z0-9_-]+)\}";

fn placeholder_pattern() -> Result<Regex> {
    Regex::new(PLACEHOLDER_PATTERN).map_err(|e| HostVerifyError::SuiteParse(e.to_string()))
}

/// One row becomes one check, or one check per `each` item.
fn expand_row(
    row: Value,
    vars: &BTreeMap<String, String>,
    pattern: &Regex,
) -> std::result::Result<Vec<Value>, String> {
    let mut map = match row {
        Value::Mapping(map) => map,
        _ => return Err("expected a mapping".to_string()),
    };

    let each = map.remove("each");
    let base = Value::Mapping(map);

    let globals: BTreeMap<String, String> = vars
        .iter()
        .map(|(key, value)| (format!("vars.{}", key), value.clone()))
        .collect();

    let bindings = match each {
        None => vec![globals],
        Some(Value::Sequence(items)) => {
            if items.is_empty() {
                return Err("'each' is empty".to_string());
            }
            let mut bindings = Vec::with_capacity(items.len());
            for item in items {
                let mut scope = globals.clone();
                match &item {
                    Value::Mapping(fields) => {
                        for (key, value) in fields {
                            let key = key.as_str().ok_or("'each' item keys must be strings")?;
                            let value = render(pattern, &scalar_to_string(value)?, &globals)?;
                            scope.insert(format!("item.{}", key), value);
                        }
                    }
                    other => {
                        let value = render(pattern, &scalar_to_string(other)?, &globals)?;
                        scope.insert("item".to_string(), value);
                    }
                }
                bindings.push(scope);
            }
            bindings
        }
        Some(_) => return Err("'each' must be a list".to_string()),
    };

    let mut rows = Vec::with_capacity(bindings.len());
    for scope in &bindings {
        let mut row = base.clone();
        render_value(&mut row, pattern, scope)?;
        rows.push(row);
    }

    Ok(rows)
}

fn render_value(
    value: &mut Value,
    pattern: &Regex,
    scope: &BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    match value {
        Value::String(s) => *s = render(pattern, s, scope)?,
        Value::Sequence(items) => {
            for item in items {
                render_value(item, pattern, scope)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                render_value(item, pattern, scope)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Single pass, so substituted text is never scanned again.
fn render(pattern: &Regex, text: &str, scope: &BTreeMap<String, String>) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);

        match caps.get(1) {
            Some(token) => match scope.get(token.as_str()) {
                Some(value) => out.push_str(value),
                None => return Err(format!("unresolved placeholder {}", whole.as_str())),
            },
            None => out.push_str(&whole.as_str()[..1]),
        }

        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

fn scalar_to_string(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err("expected a scalar value".to_string()),
    }
}
