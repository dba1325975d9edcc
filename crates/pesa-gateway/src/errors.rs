//! Gateway error types.

use pesa_auth::AuthError;

/// Errors from gateway calls and request preparation.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Could not obtain an access token.
    #[error("failed to get access token: {0}")]
    Auth(#[from] AuthError),

    /// The gateway answered with a non-success status.
    #[error("gateway API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Phone number does not normalize to `254XXXXXXXXX`.
    #[error("invalid phone number format: {0}. Expected format: 254XXXXXXXXX")]
    InvalidPhone(String),

    /// A configured credential needed for this call is empty.
    #[error("missing gateway credential: {0}")]
    MissingCredential(&'static str),

    /// The gateway certificate file could not be read.
    #[error("failed to read certificate {path}: {source}")]
    CertificateRead {
        /// Configured certificate path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The initiator password could not be encrypted with the certificate.
    #[error("security credential: {0}")]
    SecurityCredential(String),

    /// A request field failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl GatewayError {
    /// The gateway's JSON error body, when it sent one.
    pub fn api_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Api { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// The gateway's `errorCode`, when it sent one.
    pub fn api_error_code(&self) -> Option<String> {
        let details = self.api_details()?;
        details
            .get("errorCode")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_code_from_json_body() {
        let err = GatewayError::Api {
            status: 400,
            body: r#"{"requestId":"1","errorCode":"400.002.02","errorMessage":"Bad Request"}"#
                .into(),
        };
        assert_eq!(err.api_error_code().as_deref(), Some("400.002.02"));
        assert_eq!(err.api_details().unwrap()["errorMessage"], "Bad Request");
    }

    #[test]
    fn api_details_absent_for_plain_body() {
        let err = GatewayError::Api {
            status: 502,
            body: "Bad Gateway".into(),
        };
        assert!(err.api_details().is_none());
        assert!(err.api_error_code().is_none());
    }

    #[test]
    fn invalid_phone_display() {
        let err = GatewayError::InvalidPhone("12".into());
        assert_eq!(
            err.to_string(),
            "invalid phone number format: 12. Expected format: 254XXXXXXXXX"
        );
    }
}
