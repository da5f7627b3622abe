//! Shared types for the canispect client crates: principals and the error
//! taxonomy surfaced by every remote-facing operation.

pub mod error;
pub mod principal;

pub use {
    error::{BoxError, Error, Result},
    principal::{ANONYMOUS_PRINCIPAL, Principal, PrincipalError},
};
