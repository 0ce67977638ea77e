//! The generic result abstraction consumed by the retry engine.

use serde::{Deserialize, Serialize};

/// A response exposing a status code and a textual body.
///
/// The retry engine judges produced results through this trait only; it has
/// no knowledge of any particular transport or client backend.
pub trait ServiceResponse {
    /// The numeric status code of the response.
    fn status_code(&self) -> u16;

    /// The response body as text.
    fn body_text(&self) -> &str;
}

/// A plain owned response value.
///
/// Collaborator wrappers convert their backend-specific responses into this
/// type (or implement [`ServiceResponse`] directly on their own types).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResponse {
    /// The status code.
    pub status: u16,
    /// The body text.
    pub body: String,
}

impl CallResponse {
    /// Creates a response from a status code and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a successful (200) response.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// True for status codes in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl ServiceResponse for CallResponse {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn body_text(&self) -> &str {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_response_accessors() {
        let response = CallResponse::new(404, "not found");
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body_text(), "not found");
        assert!(!response.is_success());
    }

    #[test]
    fn test_ok_is_success() {
        assert!(CallResponse::ok("{}").is_success());
    }
}
