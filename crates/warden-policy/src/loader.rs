//! Policy source loading: on-disk files merged over in-code defaults.
//!
//! Services register default rules in code; operators override them with
//! policy files. The merge mirrors the live services: defaults first, file
//! entries winning per rule name.
use crate::errors::{PolicyError, PolicyResult};
use crate::ruleset::Ruleset;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// In-code policy defaults: (service, [(rule name, expression)]).
#[derive(Debug, Clone, Default)]
pub struct DefaultRegistry {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl DefaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        service: impl Into<String>,
        rule: impl Into<String>,
        expression: impl Into<String>,
    ) {
        self.entries
            .entry(normalize_service(&service.into()))
            .or_default()
            .insert(rule.into(), expression.into());
    }

    pub fn register_all<I, R, E>(&mut self, service: impl Into<String>, rules: I)
    where
        I: IntoIterator<Item = (R, E)>,
        R: Into<String>,
        E: Into<String>,
    {
        let service = service.into();
        for (rule, expression) in rules {
            self.register(service.clone(), rule, expression);
        }
    }

    pub fn rules_for(&self, service: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(service)
    }
}

/// Substitute the single `%s` slot of a policy-file template.
pub fn policy_path(template: &str, service: &str) -> PathBuf {
    PathBuf::from(template.replacen("%s", service, 1))
}

fn normalize_service(service: &str) -> String {
    service.trim().to_lowercase()
}

/// Loads and merges a service's policy sources into a compiled [`Ruleset`].
#[derive(Debug, Clone, Default)]
pub struct PolicyLoader {
    templates: Vec<String>,
    defaults: DefaultRegistry,
}

impl PolicyLoader {
    pub fn new(templates: Vec<String>, defaults: DefaultRegistry) -> Self {
        Self {
            templates,
            defaults,
        }
    }

    /// Load the ruleset for `service`.
    ///
    /// Every configured template is tried; files that exist but do not parse
    /// contribute nothing and are logged. When neither the defaults registry
    /// nor any file yields a rule, the load fails with the attempted paths.
    pub fn load(&self, service: &str) -> PolicyResult<Ruleset> {
        let service = normalize_service(service);
        let mut merged = self
            .defaults
            .rules_for(&service)
            .cloned()
            .unwrap_or_default();

        let mut attempted = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let path = policy_path(template, &service);
            attempted.push(path.clone());
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            match decode_rules(&contents) {
                Ok(rules) => {
                    tracing::debug!(service = %service, path = %path.display(), rules = rules.len(), "loaded policy file");
                    merged.extend(rules);
                }
                Err(reason) => {
                    tracing::warn!(service = %service, path = %path.display(), %reason, "unparsable policy file ignored");
                }
            }
        }

        if merged.is_empty() {
            return Err(PolicyError::EmptySources { service, attempted });
        }
        Ruleset::compile(&service, &merged)
    }
}

// Policy files are a mapping of rule name to expression string, in either
// JSON-object or YAML-mapping shape; the format is detected by trying JSON
// first (every JSON object is also valid YAML, so order matters for error
// reporting only).
fn decode_rules(contents: &str) -> Result<BTreeMap<String, String>, String> {
    if let Ok(values) = serde_json::from_str::<BTreeMap<String, serde_json::Value>>(contents) {
        return coerce(values.into_iter().map(|(k, v)| (k, json_expr(v))));
    }
    match serde_yaml::from_str::<BTreeMap<String, serde_yaml::Value>>(contents) {
        Ok(values) => coerce(values.into_iter().map(|(k, v)| (k, yaml_expr(v)))),
        Err(err) => Err(err.to_string()),
    }
}

fn coerce(
    entries: impl Iterator<Item = (String, Option<String>)>,
) -> Result<BTreeMap<String, String>, String> {
    let mut rules = BTreeMap::new();
    for (name, expression) in entries {
        let Some(expression) = expression else {
            return Err(format!("rule {name:?} has a non-string expression"));
        };
        rules.insert(name, expression);
    }
    Ok(rules)
}

fn json_expr(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

fn yaml_expr(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}
