use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use tracing::debug;

use crate::config::{Config, API_KEY_ENV};

const DEFAULT_SERVICE: &str = "showroom";

/// API keys in the OS keychain, one entry per backend.
///
/// Entries live under a keychain service name with the normalised backend
/// URL as the account, so `https://x.example/` and `https://X.example`
/// share a key.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    /// Use a different keychain service name (separate profiles, tests).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Keychain account name for a backend URL.
    pub fn account_for(backend_url: &str) -> String {
        backend_url.trim().trim_end_matches('/').to_lowercase()
    }

    fn entry(&self, backend_url: &str) -> Result<Entry> {
        let account = Self::account_for(backend_url);
        if account.is_empty() {
            return Err(anyhow!("Cannot store credentials for an empty backend URL"));
        }
        Entry::new(&self.service, &account)
            .with_context(|| format!("Failed to open keychain entry for {}", account))
    }

    pub fn save(&self, backend_url: &str, api_key: &str) -> Result<()> {
        self.entry(backend_url)?
            .set_password(api_key)
            .context("Failed to store API key in keychain")?;
        debug!(account = %Self::account_for(backend_url), "API key saved");
        Ok(())
    }

    /// The saved key, or `None` when this backend has none.
    pub fn load(&self, backend_url: &str) -> Result<Option<String>> {
        match self.entry(backend_url)?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err).context("Failed to read API key from keychain"),
        }
    }

    /// Remove the saved key. Returns whether there was one.
    pub fn forget(&self, backend_url: &str) -> Result<bool> {
        match self.entry(backend_url)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err).context("Failed to delete API key from keychain"),
        }
    }
}

/// The API key to use: the config file or environment first, then the
/// keychain entry for the configured backend.
pub fn resolve_api_key(config: &Config, store: &CredentialStore) -> Result<String> {
    if let Some(key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    let url = config.backend_url()?;
    store.load(url)?.ok_or_else(|| {
        anyhow!(
            "No API key found for {} (run `showroom login` or set {})",
            url,
            API_KEY_ENV
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_is_normalised() {
        assert_eq!(
            CredentialStore::account_for(" https://Shop.Example.com/ "),
            "https://shop.example.com"
        );
        assert_eq!(
            CredentialStore::account_for("https://shop.example.com"),
            CredentialStore::account_for("HTTPS://SHOP.EXAMPLE.COM//")
        );
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let store = CredentialStore::with_service("showroom-test");
        assert!(store.load("  /").is_err());
        assert!(store.save("", "secret").is_err());
    }

    #[test]
    fn test_config_key_wins() {
        let config = Config {
            backend_url: Some("https://shop.example.com".to_string()),
            api_key: Some("  anon-key ".to_string()),
            ..Default::default()
        };
        let key = resolve_api_key(&config, &CredentialStore::with_service("showroom-test")).unwrap();
        assert_eq!(key, "anon-key");
    }

    #[test]
    fn test_missing_url_is_reported_before_keychain() {
        let config = Config {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        let err = resolve_api_key(&config, &CredentialStore::new()).unwrap_err();
        assert!(err.to_string().contains("Backend URL not configured"), "{}", err);
    }

    #[test]
    fn test_default_service() {
        assert_eq!(CredentialStore::default().service(), "showroom");
    }
}
