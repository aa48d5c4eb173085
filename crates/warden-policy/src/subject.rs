//! Subject, target, and decision types used by rule evaluation.
//!
//! # Purpose
//! Defines the acting identity and the object of an authorization check in a
//! strongly typed form, so the evaluator never touches raw request state.
//!
//! # How it fits
//! Oracles build a fresh [`Subject`] and [`Target`] per prediction and hand
//! both to [`crate::Ruleset::decide`].
//!
//! # Key invariants
//! - A subject's role set is exactly what the caller supplied; no implicit
//!   admin roles are added.
//! - A target built with [`Target::for_project`] always carries the
//!   `project_id`, `tenant_id`, and `network:tenant_id` aliases plus
//!   `user_id`.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The acting identity for one authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub user_id: String,
    pub project_id: String,
    pub roles: BTreeSet<String>,
    pub is_admin: bool,
    pub is_admin_project: bool,
}

impl Subject {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        roles: BTreeSet<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            roles,
            is_admin: false,
            is_admin_project: false,
        }
    }

    pub fn with_admin_project(mut self, is_admin_project: bool) -> Self {
        self.is_admin_project = is_admin_project;
        self
    }

    /// Named attribute lookup used by `attr:%(target)s` checks.
    ///
    /// `tenant_id` is an alias of the project id on the subject side as well,
    /// matching the identity service's project/tenant duality.
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        match name {
            "user_id" => Some(&self.user_id),
            "project_id" | "tenant_id" => Some(&self.project_id),
            _ => None,
        }
    }
}

/// The object a rule is evaluated against: a flat attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    attrs: BTreeMap<String, String>,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard target for a project-scoped check: the project id under all
    /// three conventional names, plus the user id.
    pub fn for_project(project_id: &str, user_id: &str) -> Self {
        let mut target = Self::new();
        target.insert("project_id", project_id);
        target.insert("tenant_id", project_id);
        target.insert("network:tenant_id", project_id);
        target.insert("user_id", user_id);
        target
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        self.attrs.extend(entries);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// Outcome of evaluating one rule for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed { Decision::Allow } else { Decision::Deny }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}
