//! Compiled rulesets and top-down rule evaluation.
//!
//! # Purpose
//! Holds one service's named rules as a compiled AST and answers
//! allow/deny questions for a (subject, target) pair.
//!
//! # Key invariants
//! - A compiled ruleset is immutable; callers share it behind an `Arc`.
//! - A missing rule name is an error, never a silent deny.
//! - Rule references are walked with a visited set; a cycle is surfaced as
//!   [`PolicyError::CyclicReference`] rather than looping.
use crate::errors::{PolicyError, PolicyResult};
use crate::expr::{self, RuleExpr};
use crate::subject::{Decision, Subject, Target};
use std::collections::{BTreeMap, BTreeSet};

/// Conventional rule consulted to derive the subject's admin flag.
pub const CONTEXT_IS_ADMIN: &str = "context_is_admin";

/// One service's rules, compiled once from their string expressions.
#[derive(Debug, Clone)]
pub struct Ruleset {
    service: String,
    rules: BTreeMap<String, RuleExpr>,
}

impl Ruleset {
    /// Compile a name → expression mapping.
    ///
    /// Fails on the first expression that does not parse.
    pub fn compile(service: &str, sources: &BTreeMap<String, String>) -> PolicyResult<Self> {
        let mut rules = BTreeMap::new();
        for (name, expression) in sources {
            rules.insert(name.clone(), expr::parse(expression)?);
        }
        Ok(Self {
            service: service.to_string(),
            rules,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn contains(&self, rule_name: &str) -> bool {
        self.rules.contains_key(rule_name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Evaluate `rule_name` for the given subject and target.
    ///
    /// The subject's `is_admin` flag is derived here: when the ruleset
    /// defines [`CONTEXT_IS_ADMIN`] that rule decides it, otherwise holding
    /// `admin_role` does.
    pub fn decide(
        &self,
        rule_name: &str,
        subject: &Subject,
        target: &Target,
        admin_role: &str,
    ) -> PolicyResult<Decision> {
        let mut subject = subject.clone();
        subject.is_admin = self.admin_context(&subject, target, admin_role)?;
        let mut visited = BTreeSet::new();
        let allowed = self.eval_rule(rule_name, &subject, target, &mut visited)?;
        Ok(Decision::from_bool(allowed))
    }

    fn admin_context(
        &self,
        subject: &Subject,
        target: &Target,
        admin_role: &str,
    ) -> PolicyResult<bool> {
        if self.rules.contains_key(CONTEXT_IS_ADMIN) {
            let mut visited = BTreeSet::new();
            self.eval_rule(CONTEXT_IS_ADMIN, subject, target, &mut visited)
        } else {
            Ok(subject.roles.contains(admin_role))
        }
    }

    fn eval_rule(
        &self,
        rule_name: &str,
        subject: &Subject,
        target: &Target,
        visited: &mut BTreeSet<String>,
    ) -> PolicyResult<bool> {
        let Some(rule) = self.rules.get(rule_name) else {
            return Err(PolicyError::UnknownRule {
                service: self.service.clone(),
                rule: rule_name.to_string(),
            });
        };
        if !visited.insert(rule_name.to_string()) {
            return Err(PolicyError::CyclicReference {
                service: self.service.clone(),
                rule: rule_name.to_string(),
            });
        }
        let result = self.eval_expr(rule, subject, target, visited);
        visited.remove(rule_name);
        result
    }

    fn eval_expr(
        &self,
        rule: &RuleExpr,
        subject: &Subject,
        target: &Target,
        visited: &mut BTreeSet<String>,
    ) -> PolicyResult<bool> {
        match rule {
            RuleExpr::True => Ok(true),
            RuleExpr::False => Ok(false),
            RuleExpr::Role(name) => Ok(subject.roles.contains(name)),
            RuleExpr::RuleRef(name) => self.eval_rule(name, subject, target, visited),
            RuleExpr::IsAdmin => Ok(subject.is_admin),
            RuleExpr::IsAdminProject => Ok(subject.is_admin_project),
            RuleExpr::AttrMatch {
                subject_attr,
                target_attr,
            } => Ok(match (subject.attr(subject_attr), target.get(target_attr)) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => false,
            }),
            RuleExpr::AttrLiteral {
                subject_attr,
                literal,
            } => Ok(subject.attr(subject_attr) == Some(literal.as_str())),
            RuleExpr::And(lhs, rhs) => {
                Ok(self.eval_expr(lhs, subject, target, visited)?
                    && self.eval_expr(rhs, subject, target, visited)?)
            }
            RuleExpr::Or(lhs, rhs) => {
                Ok(self.eval_expr(lhs, subject, target, visited)?
                    || self.eval_expr(rhs, subject, target, visited)?)
            }
            RuleExpr::Not(inner) => Ok(!self.eval_expr(inner, subject, target, visited)?),
        }
    }
}
