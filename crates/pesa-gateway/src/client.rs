//! Authenticated Daraja API calls.

use std::sync::Arc;

use metrics::counter;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use pesa_auth::TokenProvider;
use pesa_settings::GatewaySettings;

use crate::errors::{GatewayError, Result};
use crate::password::{stk_password, timestamp};
use crate::phone::format_phone_number;
use crate::security::encrypt_with_certificate_file;
use crate::types::{
    B2cGatewayResponse, B2cPayload, B2cPaymentRequest, B2cPaymentResponse, StkPushPayload,
    StkPushRequest, StkPushResponse,
};

const STK_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Daraja API client.
///
/// Every call takes a bearer token from the shared [`TokenProvider`]. When
/// the gateway answers 401 or 403 the cached token is dropped and the call
/// is retried exactly once with a freshly fetched token.
pub struct DarajaClient {
    http: reqwest::Client,
    settings: GatewaySettings,
    tokens: Arc<TokenProvider>,
}

impl std::fmt::Debug for DarajaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarajaClient")
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

impl DarajaClient {
    /// Create a client for the gateway described by `settings`.
    pub fn new(
        http: reqwest::Client,
        settings: GatewaySettings,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        Self {
            http,
            settings,
            tokens,
        }
    }

    /// Prompt a customer's phone for payment.
    #[tracing::instrument(skip_all, fields(account_reference = %request.account_reference))]
    pub async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushResponse> {
        request.validate()?;
        if self.settings.passkey.is_empty() {
            return Err(GatewayError::MissingCredential("passkey"));
        }
        let phone = format_phone_number(&request.phone_number)?;
        let timestamp = timestamp();
        let short_code = &self.settings.business_short_code;

        let payload = StkPushPayload {
            business_short_code: short_code.clone(),
            password: stk_password(short_code, &self.settings.passkey, &timestamp),
            timestamp,
            transaction_type: STK_TRANSACTION_TYPE,
            amount: request.amount,
            party_a: phone.clone(),
            party_b: short_code.clone(),
            phone_number: phone,
            callback_url: self.settings.stk_callback_url.clone(),
            account_reference: request.account_reference.clone(),
            transaction_desc: request.transaction_desc.clone(),
        };

        let response: StkPushResponse = self
            .post_authorized("stk_push", &self.settings.stk_push_url(), &payload)
            .await?;
        info!(
            checkout_request_id = %response.checkout_request_id,
            merchant_request_id = %response.merchant_request_id,
            "STK push accepted"
        );
        Ok(response)
    }

    /// Send a B2C payout. `request` should already be
    /// [normalized](B2cPaymentRequest::normalized).
    #[tracing::instrument(skip_all, fields(originator_conversation_id = %request.originator_conversation_id))]
    pub async fn b2c_payment(&self, request: &B2cPaymentRequest) -> Result<B2cPaymentResponse> {
        request.validate()?;
        if self.settings.initiator_name.is_empty() {
            return Err(GatewayError::MissingCredential("initiator name"));
        }
        let security_credential = self.security_credential().await?;

        let payload = B2cPayload {
            originator_conversation_id: request.originator_conversation_id.clone(),
            initiator_name: self.settings.initiator_name.clone(),
            security_credential,
            command_id: request.command_id.unwrap_or_default(),
            amount: request.amount,
            party_a: self.settings.business_short_code.clone(),
            party_b: format_phone_number(&request.phone_number)?,
            remarks: request.remarks.clone(),
            queue_timeout_url: self.settings.b2c_timeout_url.clone(),
            result_url: self.settings.b2c_result_url.clone(),
            occasion: request.occasion.clone(),
        };

        let response: B2cGatewayResponse = self
            .post_authorized("b2c_payment", &self.settings.b2c_url(), &payload)
            .await?;
        info!(
            conversation_id = %response.conversation_id,
            response_code = %response.response_code,
            "B2C payment accepted"
        );
        Ok(response.into())
    }

    /// The configured pre-encrypted credential, or the initiator password
    /// encrypted with the configured certificate.
    async fn security_credential(&self) -> Result<String> {
        let settings = &self.settings;
        if !settings.security_credential.is_empty() {
            return Ok(settings.security_credential.clone());
        }
        if settings.initiator_password.is_empty() || settings.certificate_path.is_empty() {
            return Err(GatewayError::MissingCredential("security credential"));
        }
        encrypt_with_certificate_file(&settings.initiator_password, &settings.certificate_path)
            .await
    }

    async fn post_authorized<B, R>(&self, operation: &'static str, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        counter!("gateway_requests_total", "operation" => operation).increment(1);

        let token = self.tokens.access_token(false).await?;
        let mut resp = self.send(url, &token, body).await?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(
                operation,
                status = resp.status().as_u16(),
                "gateway rejected token, refreshing and retrying once"
            );
            self.tokens.invalidate();
            let token = self.tokens.access_token(true).await?;
            resp = self.send(url, &token, body).await?;
        }

        let status = resp.status();
        let text = resp.text().await?;
        debug!(operation, status = status.as_u16(), body = %text, "gateway response");

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        url: &str,
        token: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        Ok(self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pesa_auth::CredentialCache;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::security::tests as security_tests;
    use crate::types::CommandId;

    fn settings(server: &MockServer) -> GatewaySettings {
        GatewaySettings {
            base_url: server.uri(),
            consumer_key: "key".into(),
            consumer_secret: "secret".into(),
            business_short_code: "174379".into(),
            passkey: "passkey".into(),
            initiator_name: "testapi".into(),
            security_credential: "encrypted".into(),
            stk_callback_url: "https://relay.example/api/v1/stk/callback".into(),
            b2c_result_url: "https://relay.example/api/v1/b2c/result".into(),
            b2c_timeout_url: "https://relay.example/api/v1/b2c/timeout".into(),
            ..GatewaySettings::default()
        }
    }

    fn client(server: &MockServer) -> DarajaClient {
        let settings = settings(server);
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            settings.oauth_url(),
            settings.consumer_key.clone(),
            settings.consumer_secret.clone(),
            Arc::new(CredentialCache::new()),
        ));
        DarajaClient::new(http, settings, tokens)
    }

    async fn mount_oauth(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "expires_in": "3599",
            })))
            .mount(server)
            .await;
    }

    fn stk_request() -> StkPushRequest {
        StkPushRequest {
            phone_number: "0712345678".into(),
            amount: 1,
            account_reference: "INV001".into(),
            transaction_desc: "Test".into(),
        }
    }

    fn b2c_request() -> B2cPaymentRequest {
        B2cPaymentRequest {
            phone_number: "0712345678".into(),
            amount: 100,
            ..B2cPaymentRequest::default()
        }
        .normalized()
        .unwrap()
    }

    #[tokio::test]
    async fn stk_push_success() {
        let server = MockServer::start().await;
        mount_oauth(&server, "tok").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "BusinessShortCode": "174379",
                "TransactionType": "CustomerPayBillOnline",
                "PartyA": "254712345678",
                "PhoneNumber": "254712345678",
                "PartyB": "174379",
                "Amount": 1,
                "AccountReference": "INV001",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).stk_push(&stk_request()).await.unwrap();
        assert_eq!(response.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(response.response_code, "0");
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_retried_once() {
        let server = MockServer::start().await;
        mount_oauth(&server, "fresh").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Access Token"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "CheckoutRequestID": "ws_CO_2",
                "ResponseCode": "0",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.tokens.cache().set("stale", 3600);
        let response = client.stk_push(&stk_request()).await.unwrap();
        assert_eq!(response.checkout_request_id, "ws_CO_2");
        assert_eq!(client.tokens.cache().get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn second_rejection_surfaces_api_error() {
        let server = MockServer::start().await;
        mount_oauth(&server, "tok").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/b2c/v3/paymentrequest"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).b2c_payment(&b2c_request()).await.unwrap_err();
        match err {
            GatewayError::Api { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "Forbidden");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_error_keeps_gateway_body() {
        let server = MockServer::start().await;
        mount_oauth(&server, "tok").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "requestId": "r-1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber",
            })))
            .mount(&server)
            .await;

        let err = client(&server).stk_push(&stk_request()).await.unwrap_err();
        assert_eq!(err.api_error_code().as_deref(), Some("400.002.02"));
    }

    #[tokio::test]
    async fn b2c_payment_success() {
        let server = MockServer::start().await;
        mount_oauth(&server, "tok").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/b2c/v3/paymentrequest"))
            .and(body_partial_json(json!({
                "InitiatorName": "testapi",
                "SecurityCredential": "encrypted",
                "CommandID": "BusinessPayment",
                "PartyA": "174379",
                "PartyB": "254712345678",
                "Remarks": "Payment",
                "QueueTimeOutURL": "https://relay.example/api/v1/b2c/timeout",
                "ResultURL": "https://relay.example/api/v1/b2c/result",
                "Occassion": "",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ConversationID": "AG_20191219_00005797af5d7d75f652",
                "OriginatorConversationID": "16740-34861180-1",
                "ResponseCode": "0",
                "ResponseDescription": "Accept the service request successfully.",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).b2c_payment(&b2c_request()).await.unwrap();
        assert_eq!(response.conversation_id, "AG_20191219_00005797af5d7d75f652");
        assert_eq!(response.response_code, "0");
    }

    #[tokio::test]
    async fn b2c_requires_security_credential() {
        let server = MockServer::start().await;
        let mut settings = settings(&server);
        settings.security_credential = String::new();
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            settings.oauth_url(),
            "key",
            "secret",
            Arc::new(CredentialCache::new()),
        ));
        let client = DarajaClient::new(http, settings, tokens);

        let mut request = b2c_request();
        request.command_id = Some(CommandId::SalaryPayment);
        let err = client.b2c_payment(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn b2c_encrypts_initiator_password_when_credential_unset() {
        let server = MockServer::start().await;
        mount_oauth(&server, "tok").await;
        Mock::given(method("POST"))
            .and(path("/mpesa/b2c/v3/paymentrequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ConversationID": "AG_1",
                "OriginatorConversationID": "16740-34861180-1",
                "ResponseCode": "0",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("gateway.cer");
        std::fs::write(&cert_path, security_tests::CERT).unwrap();

        let mut settings = settings(&server);
        settings.security_credential = String::new();
        settings.initiator_password = "Safaricom999!".into();
        settings.certificate_path = cert_path.to_str().unwrap().into();
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            settings.oauth_url(),
            "key",
            "secret",
            Arc::new(CredentialCache::new()),
        ));
        let client = DarajaClient::new(http, settings, tokens);

        let _ = client.b2c_payment(&b2c_request()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let b2c = requests
            .iter()
            .find(|r| r.url.path() == "/mpesa/b2c/v3/paymentrequest")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&b2c.body).unwrap();
        let credential = body["SecurityCredential"].as_str().unwrap();
        assert_eq!(security_tests::decrypt(credential), "Safaricom999!");
    }

    #[tokio::test]
    async fn b2c_unreadable_certificate_is_reported() {
        let server = MockServer::start().await;
        let mut settings = settings(&server);
        settings.security_credential = String::new();
        settings.initiator_password = "pw".into();
        settings.certificate_path = "/nonexistent/gateway.cer".into();
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            settings.oauth_url(),
            "key",
            "secret",
            Arc::new(CredentialCache::new()),
        ));
        let client = DarajaClient::new(http, settings, tokens);

        let err = client.b2c_payment(&b2c_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::CertificateRead { .. }));
    }

    #[tokio::test]
    async fn invalid_request_never_hits_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut request = stk_request();
        request.phone_number = "12345".into();
        let err = client(&server).stk_push(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPhone(_)));
    }

    #[tokio::test]
    async fn token_failure_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let err = client(&server).stk_push(&stk_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }
}
