//! Binance spot adapter configuration.
//!
//! Read from the `binance` section of the application config. Only
//! `api_key` and `secret_key` are required; URLs and timings default to
//! production values.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration for the Binance spot adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    /// Binance API key (sent as `X-MBX-APIKEY`).
    pub api_key: String,

    /// Binance API secret (HMAC-SHA256 signing).
    #[serde(default)]
    pub secret_key: String,

    /// Optional path to a PEM-encoded Ed25519 private key. When set, requests
    /// are signed with Ed25519 instead of HMAC.
    #[serde(default)]
    pub ed25519_key_path: Option<PathBuf>,

    /// Spot REST API base URL.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// `recvWindow` for signed requests (milliseconds).
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    /// Per-request timeout (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            ed25519_key_path: None,
            rest_url: default_rest_url(),
            recv_window: default_recv_window(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BinanceConfig {
    /// Extract the `binance` section of a raw application config document.
    pub fn from_app_value(value: &serde_json::Value) -> Result<Self> {
        let section = value.get("binance").context("config has no `binance` section")?;
        let config: Self = serde_json::from_value(section.clone()).context("invalid `binance` config section")?;
        anyhow::ensure!(!config.api_key.is_empty(), "binance.api_key is empty");
        anyhow::ensure!(
            !config.secret_key.is_empty() || config.ed25519_key_path.is_some(),
            "binance needs secret_key or ed25519_key_path"
        );
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://api.binance.com".into()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
