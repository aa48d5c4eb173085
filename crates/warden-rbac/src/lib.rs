//! RBAC conformance-testing core.
//!
//! # Purpose
//! Decides, for every decorated test invocation: which role the test subject
//! must be wearing when the API call is issued, what outcome the declared
//! policy predicts for that role on that rule, and whether the actual outcome
//! is a pass, an over-permission failure, an under-permission failure, or an
//! infrastructure error.
//!
//! # How it fits
//! Surrounding test cases exercise each service's HTTP API under a chosen
//! role; this crate supplies the oracle (policy- or requirements-backed), the
//! role-switch coordinator, and the contract runner those tests plug into.
//! The framework predicts and compares — it never enforces policy.
//!
//! # Key invariants
//! - The subject wears exactly one of {admin role, test role} while a
//!   decorated body executes, and admin is restored before the next setup.
//! - A loaded ruleset is immutable and shared for the process lifetime.
//! - With reporting enabled, each decorated test contributes exactly one
//!   report row.
//!
//! # Concurrency
//! Parallel worker processes, single-threaded within a worker; each worker
//! owns disjoint (user, project) credentials. The process-wide caches are
//! write-once and the switch ledger is only touched from the worker's own
//! test thread, so nothing here takes locks beyond the report writer.

mod action;
mod authority;
mod catalog;
mod config;
mod context;
mod coordinator;
mod errors;
mod framework;
mod report;
mod requirements;

pub use action::ActionContract;
pub use authority::{PolicyAuthority, RulesetCache};
pub use catalog::ServiceCatalog;
pub use config::RbacConfig;
pub use context::{FixtureId, TargetBinding, TestContext};
pub use coordinator::RoleSwitchCoordinator;
pub use errors::{ApiFault, RbacError, RbacResult};
pub use framework::RbacFramework;
pub use report::{RbacReporter, ReportRow, Verdict};
pub use requirements::RequirementsAuthority;
