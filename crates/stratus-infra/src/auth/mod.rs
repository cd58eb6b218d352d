//! Caller identity for authenticated billing routes.

mod jwt;

pub use jwt::{JwtConfig, JwtTokenService};
