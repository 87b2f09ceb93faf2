//! Firebase project configuration

use crate::error::{FirebaseError, Result};
use std::fmt;
use std::time::Duration;

/// Environment variable holding the Web API key of the Firebase project.
pub const API_KEY_ENV: &str = "FIREBASE_API_KEY";

/// Environment variable pointing at a local Auth emulator (`host:port`).
pub const EMULATOR_HOST_ENV: &str = "FIREBASE_AUTH_EMULATOR_HOST";

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the Firebase Auth REST API.
#[derive(Clone)]
pub struct FirebaseConfig {
    api_key: String,
    identity_toolkit_url: String,
    secure_token_url: String,
    pub request_timeout: Duration,
}

impl FirebaseConfig {
    /// Configuration for the production Firebase endpoints.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = Self {
            api_key: api_key.into(),
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads `FIREBASE_API_KEY`, and `FIREBASE_AUTH_EMULATOR_HOST` when set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| FirebaseError::Config(format!("{} is not set", API_KEY_ENV)))?;
        let config = Self::new(api_key)?;

        match std::env::var(EMULATOR_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => Ok(config.with_emulator(host.trim())),
            _ => Ok(config),
        }
    }

    /// Routes all calls to an Auth emulator listening on `host` (`localhost:9099`).
    pub fn with_emulator(mut self, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        self.identity_toolkit_url = format!("http://{}/identitytoolkit.googleapis.com/v1/", host);
        self.secure_token_url = format!("http://{}/securetoken.googleapis.com/v1/", host);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `accounts:<method>` endpoint of the Identity Toolkit API.
    pub fn accounts_url(&self, method: &str) -> String {
        format!(
            "{}accounts:{}?key={}",
            self.identity_toolkit_url, method, self.api_key
        )
    }

    /// Token exchange endpoint of the Secure Token API.
    pub fn token_url(&self) -> String {
        format!("{}token?key={}", self.secure_token_url, self.api_key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(FirebaseError::Config("API key cannot be empty".to_string()));
        }
        // The key is placed in the query string verbatim.
        if !self
            .api_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FirebaseError::Config(
                "API key contains invalid characters".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(FirebaseError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("identity_toolkit_url", &self.identity_toolkit_url)
            .field("secure_token_url", &self.secure_token_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_endpoints() {
        let config = FirebaseConfig::new("AIzaKey_1").unwrap();

        assert_eq!(
            config.accounts_url("signInWithPassword"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=AIzaKey_1"
        );
        assert_eq!(
            config.token_url(),
            "https://securetoken.googleapis.com/v1/token?key=AIzaKey_1"
        );
    }

    #[test]
    fn test_emulator_endpoints() {
        let config = FirebaseConfig::new("fake-key")
            .unwrap()
            .with_emulator("localhost:9099/");

        assert_eq!(
            config.accounts_url("signUp"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp?key=fake-key"
        );
        assert_eq!(
            config.token_url(),
            "http://localhost:9099/securetoken.googleapis.com/v1/token?key=fake-key"
        );
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(matches!(
            FirebaseConfig::new(""),
            Err(FirebaseError::Config(_))
        ));
        assert!(matches!(
            FirebaseConfig::new("key&other=1"),
            Err(FirebaseError::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let config = FirebaseConfig::new("super-secret-key").unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
