use std::collections::HashMap;

use regex::{Captures, Regex};

use crate::error::{Error, Result};

pub const DEFAULT_SENTINEL: char = '&';

/// Substitutes variables in script text.
///
/// A token is the sentinel character followed by an identifier, e.g.
/// `&database`. Every token must resolve; substituted values are never
/// scanned again.
#[derive(Debug, Clone)]
pub struct Interpolator {
    sentinel: char,
    pattern: Regex,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::with_sentinel(DEFAULT_SENTINEL)
    }

    pub fn with_sentinel(sentinel: char) -> Self {
        let pattern = format!(
            "{}([A-Za-z_][A-Za-z0-9_]*)",
            regex::escape(&sentinel.to_string())
        );
        Self {
            sentinel,
            // An escaped literal followed by a fixed class always compiles.
            pattern: Regex::new(&pattern).expect("interpolation pattern is valid"),
        }
    }

    pub fn sentinel(&self) -> char {
        self.sentinel
    }

    /// Names referenced by `text`, in order of first appearance.
    pub fn tokens<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut names: Vec<&str> = Vec::new();
        for captures in self.pattern.captures_iter(text) {
            if let Some(name) = captures.get(1) {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    pub fn interpolate(&self, text: &str, variables: &HashMap<String, String>) -> Result<String> {
        let unresolved: Vec<String> = self
            .tokens(text)
            .into_iter()
            .filter(|name| !variables.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !unresolved.is_empty() {
            return Err(Error::UnresolvedVariable(unresolved));
        }

        let resolved = self.pattern.replace_all(text, |captures: &Captures<'_>| {
            variables
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        });
        Ok(resolved.into_owned())
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

/// `{database}` overlaid with the caller's variables; the caller wins on
/// collision.
pub fn variable_namespace(
    database: &str,
    vars: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut namespace = HashMap::with_capacity(vars.len() + 1);
    namespace.insert("database".to_string(), database.to_string());
    namespace.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    namespace
}
