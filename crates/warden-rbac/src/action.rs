//! Action contracts and the prediction/outcome truth table.
//!
//! # Purpose
//! An [`ActionContract`] is the static metadata of one decorated test: which
//! service and rule it exercises, which error code a denial surfaces as, and
//! which extra target attributes feed the oracle. [`classify`] is the central
//! contract of the framework: it maps (prediction, observed outcome) to a
//! pass or a typed failure.
use crate::context::TargetBinding;
use crate::errors::{ApiFault, RbacError, RbacResult};
use crate::report::Verdict;
use std::collections::BTreeMap;

/// Static metadata attached to a decorated test.
#[derive(Debug, Clone)]
pub struct ActionContract {
    pub service: String,
    pub rule: String,
    pub expected_error_code: u16,
    pub admin_only: bool,
    pub extra_target_data: BTreeMap<String, TargetBinding>,
}

impl ActionContract {
    pub fn new(service: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            rule: rule.into(),
            expected_error_code: 403,
            admin_only: false,
            extra_target_data: BTreeMap::new(),
        }
    }

    pub fn with_expected_error_code(mut self, code: u16) -> Self {
        self.expected_error_code = code;
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub fn with_target_binding(mut self, key: impl Into<String>, binding: TargetBinding) -> Self {
        self.extra_target_data.insert(key.into(), binding);
        self
    }
}

/// The fault shape a denial is expected to surface as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpectedFault {
    Forbidden,
    NotFound,
}

impl ExpectedFault {
    /// Map an expected error code before the body runs; anything outside
    /// {403, 404} is a programming error in the test itself.
    pub(crate) fn from_code(code: u16) -> RbacResult<Self> {
        match code {
            403 => Ok(ExpectedFault::Forbidden),
            404 => Ok(ExpectedFault::NotFound),
            other => Err(RbacError::InvalidErrorCode(other)),
        }
    }

    pub(crate) fn matches(self, fault: &ApiFault) -> bool {
        matches!(
            (self, fault),
            (ExpectedFault::Forbidden, ApiFault::Forbidden)
                | (ExpectedFault::NotFound, ApiFault::NotFound)
        )
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            ExpectedFault::Forbidden => "Forbidden",
            ExpectedFault::NotFound => "NotFound",
        }
    }
}

// Faults that count as the service effectively denying the action even
// though they are not the mapped expected fault.
fn effectively_forbidden(fault: &ApiFault) -> bool {
    matches!(
        fault,
        ApiFault::MalformedResponse(_)
            | ApiFault::ActionFailed(_)
            | ApiFault::ConflictingPolicies(_)
    )
}

/// Map (prediction, outcome) to the test result and the observed verdict.
pub(crate) fn classify(
    predicted_allowed: bool,
    outcome: Result<(), ApiFault>,
    expected: ExpectedFault,
    role: &str,
    rule: &str,
    service: &str,
) -> (RbacResult<()>, Verdict) {
    match outcome {
        Ok(()) => {
            if predicted_allowed {
                (Ok(()), Verdict::Allowed)
            } else {
                (
                    Err(RbacError::OverPermission {
                        role: role.to_string(),
                        rule: rule.to_string(),
                        service: service.to_string(),
                    }),
                    Verdict::Allowed,
                )
            }
        }
        Err(ApiFault::InvalidService(name)) => (
            Err(RbacError::NotFound(format!(
                "service {name} not found while performing {rule}"
            ))),
            Verdict::Denied,
        ),
        Err(fault) if expected.matches(&fault) => {
            if predicted_allowed {
                (
                    Err(RbacError::UnderPermission {
                        role: role.to_string(),
                        rule: rule.to_string(),
                        service: service.to_string(),
                        fault,
                    }),
                    Verdict::Denied,
                )
            } else {
                (Ok(()), Verdict::Denied)
            }
        }
        Err(fault) if !predicted_allowed && effectively_forbidden(&fault) => {
            tracing::debug!(rule, service, fault = %fault, "fault treated as effective denial");
            (Ok(()), Verdict::Denied)
        }
        Err(fault) => (
            Err(RbacError::Unexpected {
                expected: expected.name(),
                rule: rule.to_string(),
                service: service.to_string(),
                source: fault,
            }),
            Verdict::Denied,
        ),
    }
}
