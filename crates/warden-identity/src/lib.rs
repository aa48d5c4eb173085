//! Identity-service plumbing shared by the warden core and harnesses.
//!
//! # Purpose
//! Defines the narrow interfaces the framework consumes from the identity
//! backend: role and catalog listing, project role assignment mutation,
//! token issuance, and the credential state of the test subject.
//!
//! # How it fits
//! The role-switch coordinator and the service catalog depend only on the
//! [`IdentityClient`] and [`CredentialProvider`] traits; the reqwest-backed
//! [`HttpIdentityClient`] is one implementation, test fakes are another.

mod client;
mod errors;
mod provider;
mod token;
mod types;

pub use client::{HttpIdentityClient, IdentityClient, SUBJECT_TOKEN_HEADER};
pub use errors::{IdentityError, IdentityResult};
pub use provider::CredentialProvider;
pub use token::Token;
pub use types::{Credentials, ProjectId, Role, RoleId, ServiceRecord, UserId};
