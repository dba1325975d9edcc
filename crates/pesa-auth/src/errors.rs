//! Auth error types.

/// Errors that can occur while obtaining a gateway token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token endpoint answered with a non-success status.
    #[error("OAuth error ({status}): {message}")]
    OAuth {
        /// HTTP status code.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// The token endpoint answered 200 without a usable token.
    #[error("token endpoint returned no access token")]
    EmptyToken,

    /// Consumer key or secret is missing.
    #[error("gateway credentials not configured: {0}")]
    NotConfigured(String),
}

impl AuthError {
    /// Whether the gateway rejected the consumer credentials.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::OAuth { status: 400 | 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_display() {
        let err = AuthError::OAuth {
            status: 401,
            message: "invalid_client".to_string(),
        };
        assert_eq!(err.to_string(), "OAuth error (401): invalid_client");
        assert!(err.is_rejection());
    }

    #[test]
    fn server_error_is_not_rejection() {
        let err = AuthError::OAuth {
            status: 503,
            message: String::new(),
        };
        assert!(!err.is_rejection());
    }

    #[test]
    fn not_configured_display() {
        let err = AuthError::NotConfigured("consumer key".to_string());
        assert_eq!(
            err.to_string(),
            "gateway credentials not configured: consumer key"
        );
    }
}
