use reqwest::StatusCode;
use thiserror::Error;

/// Every way a gated operation can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("No active session - please log in")]
    SessionInvalid,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("{message}")]
    PermissionDenied { permission: String, message: String },

    #[error("Request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl GateError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status from a protected endpoint.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => GateError::SessionExpired,
            _ => GateError::Upstream {
                status: status.as_u16(),
                body: Self::truncate_body(body),
            },
        }
    }

    pub fn permission_denied(permission: &str) -> Self {
        GateError::PermissionDenied {
            permission: permission.to_string(),
            message: format!(
                "Access denied. Required permission: {}",
                permission
            ),
        }
    }

    /// True when the caller should route the user back to the login entry point.
    pub fn is_session_error(&self) -> bool {
        matches!(self, GateError::SessionInvalid | GateError::SessionExpired)
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        GateError::Storage(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::NetworkFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unauthorized_is_session_expired() {
        let err = GateError::from_status(StatusCode::UNAUTHORIZED, "nope");
        assert_eq!(err, GateError::SessionExpired);
        assert!(err.is_session_error());
    }

    #[test]
    fn test_from_status_passes_other_statuses_through() {
        let err = GateError::from_status(StatusCode::FORBIDDEN, "{\"error\":\"forbidden\"}");
        assert_eq!(
            err,
            GateError::Upstream {
                status: 403,
                body: "{\"error\":\"forbidden\"}".to_string()
            }
        );
        assert!(!err.is_session_error());
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = GateError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 520 total bytes)"));

        // Multi-byte characters straddling the limit must not panic
        let accented = "é".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(GateError::truncate_body(&accented).contains("truncated"));
    }

    #[test]
    fn test_permission_denied_names_permission() {
        let err = GateError::permission_denied("MANAGE_ROLES");
        assert!(err.to_string().contains("MANAGE_ROLES"));
        assert!(!err.is_session_error());
    }
}
