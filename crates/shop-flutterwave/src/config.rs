//! # Flutterwave Configuration
//!
//! Configuration for the Flutterwave v3 integration.
//! All secrets are loaded from environment variables.

use shop_core::ShopError;
use std::env;

const DEFAULT_API_BASE_URL: &str = "https://api.flutterwave.com";

/// Flutterwave API configuration
#[derive(Clone)]
pub struct FlutterwaveConfig {
    /// Public key handed to the inline widget (FLWPUBK...)
    pub public_key: String,

    /// Secret API key (FLWSECK...)
    pub secret_key: String,

    /// Shared secret echoed in the `verif-hash` webhook header
    pub secret_hash: String,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,
}

impl FlutterwaveConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `FLW_PUBLIC_KEY`
    /// - `FLW_SECRET_KEY`
    /// - `FLW_SECRET_HASH`
    ///
    /// Optional: `FLW_API_BASE_URL`
    pub fn from_env() -> Result<Self, ShopError> {
        dotenvy::dotenv().ok();

        let public_key = required("FLW_PUBLIC_KEY")?;
        let secret_key = required("FLW_SECRET_KEY")?;
        let secret_hash = required("FLW_SECRET_HASH")?;

        if !public_key.starts_with("FLWPUBK") {
            return Err(ShopError::Configuration(
                "FLW_PUBLIC_KEY must start with FLWPUBK".to_string(),
            ));
        }
        if !secret_key.starts_with("FLWSECK") {
            return Err(ShopError::Configuration(
                "FLW_SECRET_KEY must start with FLWSECK".to_string(),
            ));
        }

        let api_base_url =
            env::var("FLW_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        Ok(Self {
            public_key,
            secret_key,
            secret_hash,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            secret_hash: secret_hash.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Sandbox keys carry a `_TEST` marker
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.contains("_TEST")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for FlutterwaveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlutterwaveConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("secret_hash", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn required(name: &str) -> Result<String, ShopError> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ShopError::Configuration(format!("{name} not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_mode() {
        let config = FlutterwaveConfig::new(
            "FLWPUBK_TEST-abc-X",
            "FLWSECK_TEST-xyz-X",
            "hash",
        );
        assert!(config.is_test_mode());

        let config = FlutterwaveConfig::new("FLWPUBK-abc-X", "FLWSECK-xyz-X", "hash");
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_auth_header() {
        let config = FlutterwaveConfig::new("FLWPUBK-abc", "FLWSECK-xyz", "hash");
        assert_eq!(config.auth_header(), "Bearer FLWSECK-xyz");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = FlutterwaveConfig::new("FLWPUBK-abc", "FLWSECK-xyz", "hash")
            .with_api_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = FlutterwaveConfig::new("FLWPUBK-abc", "FLWSECK-xyz", "hash-123");
        let shown = format!("{config:?}");
        assert!(!shown.contains("FLWSECK-xyz"));
        assert!(!shown.contains("hash-123"));
    }

    #[test]
    fn test_from_env_missing_key() {
        env::remove_var("FLW_SECRET_HASH");

        let result = FlutterwaveConfig::from_env();
        assert!(result.is_err());
    }
}
