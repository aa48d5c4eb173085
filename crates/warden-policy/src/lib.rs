//! Policy rule grammar, evaluation, and source loading for warden.
//!
//! # Purpose
//! Centralizes how a service's authorization policy is represented: named
//! rules over subject attributes, compiled once into an AST and evaluated
//! against a (subject, target) pair.
//!
//! # How it fits
//! The RBAC oracles load a [`Ruleset`] through [`PolicyLoader`] and ask it
//! allow/deny questions; the conformance harness never parses rule strings
//! itself.
//!
//! # Key invariants
//! - A compiled [`Ruleset`] is immutable; callers cache and share it.
//! - A missing rule name is a [`PolicyError::UnknownRule`], never a silent
//!   deny.
//! - Rule-reference cycles are detected and surfaced as errors.
//!
//! # Examples
//! ```rust
//! use std::collections::BTreeMap;
//! use warden_policy::{Ruleset, Subject, Target};
//!
//! let sources = BTreeMap::from([("admin_rule".to_string(), "role:admin".to_string())]);
//! let rules = Ruleset::compile("compute", &sources).unwrap();
//! let subject = Subject::new("u1", "p1", ["admin".to_string()].into());
//! let target = Target::for_project("p1", "u1");
//! let decision = rules.decide("admin_rule", &subject, &target, "admin").unwrap();
//! assert!(decision.is_allowed());
//! ```

mod errors;
mod expr;
mod loader;
mod ruleset;
mod subject;

pub use errors::{PolicyError, PolicyResult};
pub use expr::{RuleExpr, parse};
pub use loader::{DefaultRegistry, PolicyLoader, policy_path};
pub use ruleset::{CONTEXT_IS_ADMIN, Ruleset};
pub use subject::{Decision, Subject, Target};
