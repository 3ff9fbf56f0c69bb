//! Binance request signing.
//!
//! Binance supports two signing methods:
//!
//! 1. **HMAC-SHA256**: the standard method. The signature is the lowercase
//!    hex HMAC of the query string, keyed by the API secret.
//! 2. **Ed25519**: the private key is loaded from a PKCS#8 PEM file and the
//!    signature is the Base64 encoding of the raw 64-byte signature.
//!
//! Both produce a `signature` parameter appended to the URL-encoded query.

use anyhow::{Context, Result};
use base64::Engine;
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::config::BinanceConfig;
use crate::error::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

/// Signs Binance `SIGNED` endpoint requests.
pub enum RequestSigner {
    Hmac { secret: String },
    Ed25519(Box<SigningKey>),
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hmac { .. } => f.write_str("RequestSigner::Hmac"),
            Self::Ed25519(_) => f.write_str("RequestSigner::Ed25519"),
        }
    }
}

impl RequestSigner {
    /// Ed25519 when a key path is configured, otherwise HMAC with the secret.
    pub fn from_config(config: &BinanceConfig) -> Result<Self> {
        match config.ed25519_key_path {
            Some(ref path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read Ed25519 key {}", path.display()))?;
                Ok(Self::Ed25519(Box::new(parse_ed25519_pem(&pem)?)))
            }
            None => Ok(Self::Hmac { secret: config.secret_key.clone() }),
        }
    }

    /// Signature of `payload` in the encoding Binance expects for this method.
    pub fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        match self {
            Self::Hmac { secret } => hmac_sha256_sign(secret, payload),
            Self::Ed25519(key) => Ok(ed25519_sign(key, payload)),
        }
    }

    /// URL-encode `params`, sign the result and append `&signature=...`.
    pub fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let query = encode_query(params);
        let signature = self.sign(&query)?;
        Ok(format!("{query}&signature={}", urlencoding::encode(&signature)))
    }
}

/// Join `(key, value)` pairs into a URL-encoded query string.
pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 of `message` as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> Result<String, ExchangeError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parse a PKCS#8 PEM Ed25519 private key.
pub fn parse_ed25519_pem(pem: &str) -> Result<SigningKey> {
    use ed25519_dalek::pkcs8::DecodePrivateKey;
    SigningKey::from_pkcs8_pem(pem).context("failed to parse Ed25519 private key from PEM")
}

/// Ed25519 signature of `message`, Base64-encoded.
pub fn ed25519_sign(key: &SigningKey, message: &str) -> String {
    use ed25519_dalek::Signer;
    base64::engine::general_purpose::STANDARD.encode(key.sign(message.as_bytes()).to_bytes())
}
