//! B2C security credential derivation.
//!
//! Daraja expects the initiator password encrypted with the RSA public key
//! from the gateway certificate (PKCS#1 v1.5 padding), base64 encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use x509_cert::Certificate;
use x509_cert::der::{DecodePem, Encode};

use crate::errors::{GatewayError, Result};

/// Encrypt `password` with the RSA key in the PEM certificate `cert_pem`.
///
/// PKCS#1 v1.5 padding is randomized, so two calls never return the same
/// ciphertext.
pub fn encrypt_initiator_password(password: &str, cert_pem: &str) -> Result<String> {
    let key = certificate_public_key(cert_pem)?;
    let encrypted = key
        .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, password.as_bytes())
        .map_err(|e| GatewayError::SecurityCredential(format!("encryption failed: {e}")))?;
    Ok(STANDARD.encode(encrypted))
}

/// Read the certificate at `path` and encrypt `password` with it.
pub async fn encrypt_with_certificate_file(password: &str, path: &str) -> Result<String> {
    let pem = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| GatewayError::CertificateRead {
            path: path.to_owned(),
            source,
        })?;
    encrypt_initiator_password(password, &pem)
}

fn certificate_public_key(cert_pem: &str) -> Result<RsaPublicKey> {
    let cert = Certificate::from_pem(cert_pem.as_bytes())
        .map_err(|e| GatewayError::SecurityCredential(format!("invalid certificate: {e}")))?;
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| GatewayError::SecurityCredential(format!("invalid public key: {e}")))?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| GatewayError::SecurityCredential(format!("certificate key is not RSA: {e}")))
}
