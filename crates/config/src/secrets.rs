// Secrets management
//
// Tokens are looked up in:
// 1. System keychain (preferred)
// 2. Environment variables (fallback for CI/headless)
//
// Tokens are NEVER stored in settings.toml

use std::env;

use thiserror::Error;

/// Service name for keychain storage
const KEYCHAIN_SERVICE: &str = "floorbook";

const FEED: &str = "feed";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("keychain error: {0}")]
    Keychain(String),
    #[error("keychain support not enabled; set {0} instead")]
    Unsupported(String),
}

/// Source of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of a secret lookup
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

/// `FLOORBOOK_<NAME>_TOKEN`
fn env_var_name(name: &str) -> String {
    format!("FLOORBOOK_{}_TOKEN", name.to_uppercase())
}

fn keychain_account(name: &str) -> String {
    format!("token/{}", name.to_lowercase())
}

/// Look up the secret called `name`: keychain first, then environment.
pub fn get_secret(name: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(name)) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup {
                    key: Some(key),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    if let Ok(key) = env::var(env_var_name(name)) {
        if !key.is_empty() {
            return KeyLookup {
                key: Some(key),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

/// Access token for the order feed (`FLOORBOOK_FEED_TOKEN`).
pub fn get_feed_token() -> KeyLookup {
    get_secret(FEED)
}

pub fn set_feed_token(key: &str) -> Result<(), SecretError> {
    set_secret(FEED, key)
}

pub fn delete_feed_token() -> Result<(), SecretError> {
    delete_secret(FEED)
}

/// Name of the environment variable consulted after the keychain.
pub fn feed_token_env_var() -> String {
    env_var_name(FEED)
}

#[cfg(feature = "keychain")]
pub fn set_secret(name: &str, key: &str) -> Result<(), SecretError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(name))
        .map_err(|e| SecretError::Keychain(format!("cannot create entry: {e}")))?;
    entry
        .set_password(key)
        .map_err(|e| SecretError::Keychain(format!("cannot store token: {e}")))
}

#[cfg(not(feature = "keychain"))]
pub fn set_secret(name: &str, _key: &str) -> Result<(), SecretError> {
    Err(SecretError::Unsupported(env_var_name(name)))
}

#[cfg(feature = "keychain")]
pub fn delete_secret(name: &str) -> Result<(), SecretError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(name))
        .map_err(|e| SecretError::Keychain(format!("cannot access entry: {e}")))?;
    entry
        .delete_credential()
        .map_err(|e| SecretError::Keychain(format!("cannot delete token: {e}")))
}

#[cfg(not(feature = "keychain"))]
pub fn delete_secret(name: &str) -> Result<(), SecretError> {
    Err(SecretError::Unsupported(env_var_name(name)))
}

pub fn keychain_available() -> bool {
    #[cfg(feature = "keychain")]
    {
        keyring::Entry::new(KEYCHAIN_SERVICE, "test").is_ok()
    }
    #[cfg(not(feature = "keychain"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("feed"), "FLOORBOOK_FEED_TOKEN");
        assert_eq!(env_var_name("Feed"), "FLOORBOOK_FEED_TOKEN");
    }

    #[test]
    fn test_feed_token_env_var() {
        assert_eq!(feed_token_env_var(), "FLOORBOOK_FEED_TOKEN");
    }

    #[test]
    fn test_keychain_account() {
        assert_eq!(keychain_account("feed"), "token/feed");
        assert_eq!(keychain_account("FEED"), "token/feed");
    }

    #[test]
    fn test_lookup_from_env() {
        env::set_var("FLOORBOOK_TESTSECRET_TOKEN", "tok-123");

        let lookup = get_secret("testsecret");
        assert_eq!(lookup.source, KeySource::Environment);
        assert_eq!(lookup.key, Some("tok-123".to_string()));

        env::remove_var("FLOORBOOK_TESTSECRET_TOKEN");
    }

    #[test]
    fn test_lookup_missing() {
        let lookup = get_secret("nonexistent_secret_xyz");
        assert_eq!(lookup.source, KeySource::None);
        assert!(lookup.key.is_none());
    }
}
