//! # Stratus Shared
//!
//! Serializable request/response types of the HTTP API, shared with clients.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
