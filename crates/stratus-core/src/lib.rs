//! # Stratus Core
//!
//! The domain layer of the Stratus resilience layer: the error taxonomy,
//! domain records and the ports infrastructure must implement.
//! This crate contains no infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{DomainError, ErrorCode, FailureKind, IntegrationError, RepoError, UpstreamError};
