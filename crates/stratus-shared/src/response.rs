//! Response bodies: a success envelope and RFC 7807 problem details.

use serde::{Deserialize, Serialize};

/// `{"success": true, "data": ...}` envelope for 2xx bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// Problem details body (RFC 7807) for every non-2xx answer, extended with
/// `code` and `resetAt` so billing clients can branch without parsing `title`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,

    pub title: String,

    pub status: u16,

    /// Occurrence-specific explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Machine-readable error code, e.g. `CIRCUIT_BREAKER_OPEN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// When a rate-limited caller may retry, in epoch milliseconds.
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<i64>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            code: None,
            reset_at: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_reset_at(mut self, reset_at_ms: i64) -> Self {
        self.reset_at = Some(reset_at_ms);
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_detail(detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    pub fn too_many_requests(reset_at_ms: i64) -> Self {
        Self::new(429, "Too Many Requests")
            .with_code("TOO_MANY_REQUESTS")
            .with_reset_at(reset_at_ms)
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_problem_shape() {
        let json = serde_json::to_value(ErrorResponse::too_many_requests(1_700_000_000_000)).unwrap();

        assert_eq!(json["status"], 429);
        assert_eq!(json["code"], "TOO_MANY_REQUESTS");
        assert_eq!(json["resetAt"], 1_700_000_000_000i64);
        assert_eq!(json["type"], "about:blank");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_value(ErrorResponse::bad_request("missing id")).unwrap();

        assert!(json.get("code").is_none());
        assert!(json.get("resetAt").is_none());
        assert_eq!(json["detail"], "missing id");
    }
}
