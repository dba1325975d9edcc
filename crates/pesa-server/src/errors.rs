//! HTTP error and success bodies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use pesa_auth::AuthError;
use pesa_gateway::GatewayError;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::hub::HubError;

/// JSON body for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Extra context, usually the gateway's own error body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
}

/// JSON body for successful payment-initiation responses.
#[derive(Debug, Serialize)]
pub struct SuccessBody<T> {
    /// Human-readable message.
    pub message: String,
    /// Operation result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> SuccessBody<T> {
    /// Wrap `data` with a message and the current time.
    pub fn new(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The client sent something unusable.
    #[error("{message}")]
    BadRequest {
        /// Message for the client.
        message: String,
        /// Machine-readable code.
        code: &'static str,
    },
    /// A gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The broadcast hub is not running.
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ApiError {
    /// Shorthand for an `INVALID_REQUEST` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: "INVALID_REQUEST",
        }
    }

    /// HTTP status, error code and details for this error.
    fn parts(&self) -> (StatusCode, &'static str, Option<Value>) {
        match self {
            Self::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code, None),
            Self::Hub(_) => (StatusCode::SERVICE_UNAVAILABLE, "HUB_UNAVAILABLE", None),
            Self::Gateway(err) => gateway_parts(err),
        }
    }
}

fn gateway_parts(err: &GatewayError) -> (StatusCode, &'static str, Option<Value>) {
    match err {
        GatewayError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", None),
        GatewayError::InvalidPhone(_) => (StatusCode::BAD_REQUEST, "INVALID_PHONE", None),
        GatewayError::MissingCredential(_)
        | GatewayError::CertificateRead { .. }
        | GatewayError::SecurityCredential(_)
        | GatewayError::Auth(AuthError::NotConfigured(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_NOT_CONFIGURED", None)
        }
        GatewayError::Auth(_) => (StatusCode::BAD_GATEWAY, "AUTH_FAILED", None),
        GatewayError::Api { status, .. } => {
            // 401/403 here mean our token was rejected, not the caller's input.
            let code = match StatusCode::from_u16(*status) {
                Ok(s) if s.is_client_error() && !matches!(*status, 401 | 403) => s,
                _ => StatusCode::BAD_GATEWAY,
            };
            (code, "PAYMENT_FAILED", err.api_details())
        }
        GatewayError::Http(_) | GatewayError::Json(_) => {
            (StatusCode::BAD_GATEWAY, "PAYMENT_FAILED", None)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error_code = code, error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            error_code: Some(code.to_owned()),
            details,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> (StatusCode, &'static str) {
        let (status, code, _) = err.parts();
        (status, code)
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::from(GatewayError::Validation("amount must be greater than 0".into()));
        assert_eq!(status_of(err), (StatusCode::BAD_REQUEST, "INVALID_REQUEST"));
    }

    #[test]
    fn invalid_phone_has_own_code() {
        let err = ApiError::from(GatewayError::InvalidPhone("12".into()));
        assert_eq!(status_of(err), (StatusCode::BAD_REQUEST, "INVALID_PHONE"));
    }

    #[test]
    fn gateway_client_error_passes_through_with_details() {
        let err = ApiError::from(GatewayError::Api {
            status: 400,
            body: r#"{"errorCode":"400.002.02","errorMessage":"Bad Request"}"#.into(),
        });
        let (status, code, details) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "PAYMENT_FAILED");
        assert_eq!(details.unwrap()["errorCode"], "400.002.02");
    }

    #[test]
    fn gateway_rejection_and_faults_are_bad_gateway() {
        for status in [401, 403, 500, 503] {
            let err = ApiError::from(GatewayError::Api {
                status,
                body: String::new(),
            });
            assert_eq!(status_of(err).0, StatusCode::BAD_GATEWAY, "status {status}");
        }
    }

    #[test]
    fn missing_configuration_is_unavailable() {
        let err = ApiError::from(GatewayError::MissingCredential("passkey"));
        assert_eq!(
            status_of(err),
            (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_NOT_CONFIGURED")
        );
        let err = ApiError::from(GatewayError::Auth(AuthError::NotConfigured(
            "consumer key".into(),
        )));
        assert_eq!(status_of(err).0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unusable_certificate_is_unavailable() {
        let err = ApiError::from(GatewayError::SecurityCredential(
            "certificate key is not RSA".into(),
        ));
        assert_eq!(
            status_of(err),
            (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_NOT_CONFIGURED")
        );
        let err = ApiError::from(GatewayError::CertificateRead {
            path: "/etc/pesa/gateway.cer".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(status_of(err).0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn auth_failure_is_bad_gateway() {
        let err = ApiError::from(GatewayError::Auth(AuthError::EmptyToken));
        assert_eq!(status_of(err), (StatusCode::BAD_GATEWAY, "AUTH_FAILED"));
    }

    #[tokio::test]
    async fn response_body_shape() {
        let resp = ApiError::invalid_request("missing field").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "missing field");
        assert_eq!(body["error_code"], "INVALID_REQUEST");
        assert!(body.get("details").is_none());
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn success_body_omits_empty_data() {
        let body = SuccessBody::<Value>::new("ok", None);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "ok");
        assert!(json.get("data").is_none());
    }
}
