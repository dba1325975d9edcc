use std::fmt;

use serde::{Deserialize, Serialize};

use super::require;
use crate::errors::{Result, SettingsError};

/// Daraja sandbox base URL.
pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Payment gateway credentials and endpoints.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Gateway base URL, without a trailing slash.
    pub base_url: String,
    /// OAuth consumer key.
    pub consumer_key: String,
    /// OAuth consumer secret.
    pub consumer_secret: String,
    /// Paybill / till number.
    pub business_short_code: String,
    /// Lipa Na M-Pesa passkey used to derive STK passwords.
    pub passkey: String,
    /// B2C initiator username.
    pub initiator_name: String,
    /// B2C initiator password, already encrypted with the gateway certificate.
    /// Takes precedence over `initiator_password`.
    pub security_credential: String,
    /// Plain B2C initiator password, encrypted per request with the
    /// certificate at `certificate_path` when `security_credential` is empty.
    pub initiator_password: String,
    /// PEM certificate holding the gateway's RSA public key.
    pub certificate_path: String,
    /// Where the gateway posts STK push results.
    pub stk_callback_url: String,
    /// Where the gateway posts B2C results.
    pub b2c_result_url: String,
    /// Where the gateway posts B2C queue timeouts.
    pub b2c_timeout_url: String,
    /// Outbound request timeout.
    pub api_timeout_secs: u64,
    /// Tokens are treated as expired this many seconds early.
    pub token_expiry_margin_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: SANDBOX_BASE_URL.to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            business_short_code: String::new(),
            passkey: String::new(),
            initiator_name: String::new(),
            security_credential: String::new(),
            initiator_password: String::new(),
            certificate_path: String::new(),
            stk_callback_url: String::new(),
            b2c_result_url: String::new(),
            b2c_timeout_url: String::new(),
            api_timeout_secs: 30,
            token_expiry_margin_secs: 60,
        }
    }
}

impl GatewaySettings {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// OAuth client-credentials endpoint.
    pub fn oauth_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.base()
        )
    }

    /// STK push endpoint.
    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.base())
    }

    /// B2C payment endpoint.
    pub fn b2c_url(&self) -> String {
        format!("{}/mpesa/b2c/v3/paymentrequest", self.base())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require("consumerKey", &self.consumer_key)?;
        require("consumerSecret", &self.consumer_secret)?;
        require("businessShortCode", &self.business_short_code)?;
        if !self.business_short_code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SettingsError::InvalidValue(format!(
                "businessShortCode must be numeric, got {:?}",
                self.business_short_code
            )));
        }
        require("passkey", &self.passkey)?;
        if self.api_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "apiTimeoutSecs must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "***" }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("base_url", &self.base_url)
            .field("consumer_key", &redact(&self.consumer_key))
            .field("consumer_secret", &redact(&self.consumer_secret))
            .field("business_short_code", &self.business_short_code)
            .field("passkey", &redact(&self.passkey))
            .field("initiator_name", &self.initiator_name)
            .field("security_credential", &redact(&self.security_credential))
            .field("initiator_password", &redact(&self.initiator_password))
            .field("certificate_path", &self.certificate_path)
            .field("stk_callback_url", &self.stk_callback_url)
            .field("b2c_result_url", &self.b2c_result_url)
            .field("b2c_timeout_url", &self.b2c_timeout_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("token_expiry_margin_secs", &self.token_expiry_margin_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls() {
        let settings = GatewaySettings {
            base_url: "http://localhost:1234/".into(),
            ..GatewaySettings::default()
        };
        assert_eq!(
            settings.oauth_url(),
            "http://localhost:1234/oauth/v1/generate?grant_type=client_credentials"
        );
        assert_eq!(
            settings.stk_push_url(),
            "http://localhost:1234/mpesa/stkpush/v1/processrequest"
        );
        assert_eq!(
            settings.b2c_url(),
            "http://localhost:1234/mpesa/b2c/v3/paymentrequest"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = GatewaySettings {
            consumer_secret: "hunter2".into(),
            passkey: "bfb279f9".into(),
            initiator_password: "Safaricom999!".into(),
            ..GatewaySettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("Safaricom999!"));
        assert!(!debug.contains("bfb279f9"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn non_numeric_short_code_rejected() {
        let settings = GatewaySettings {
            consumer_key: "k".into(),
            consumer_secret: "s".into(),
            business_short_code: "17a379".into(),
            passkey: "p".into(),
            ..GatewaySettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("numeric"));
    }
}
