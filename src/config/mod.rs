//! Configuration and credential storage

mod store;

pub use store::{FileStore, KeyValueStore};
#[cfg(test)]
pub use store::MemoryStore;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::AuthConfig;

const DEFAULT_TOKEN_URL: &str = "https://unsplash.com/oauth/token";
const DEFAULT_AUTHORIZE_URL: &str = "https://unsplash.com/oauth/authorize";
const DEFAULT_SCOPE: &str = "public+read_user+write_likes";

const ENV_CLIENT_ID: &str = "IMAGEFEED_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "IMAGEFEED_CLIENT_SECRET";
const ENV_REDIRECT_URI: &str = "IMAGEFEED_REDIRECT_URI";

/// Application configuration (OAuth client registration)
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Access key issued when the application was registered
    pub client_id: Option<String>,
    /// Secret key paired with `client_id`
    pub client_secret: Option<String>,
    /// Redirect URI registered for the application
    pub redirect_uri: Option<String>,
    /// Token endpoint (authorization code exchange)
    pub token_url: Option<String>,
    /// Consent page that issues authorization codes
    pub authorize_url: Option<String>,
    /// Scopes requested on the consent page
    pub scope: Option<String>,
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "imagefeed", "imagefeed")
            .context("Could not determine config directory")
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Default path of the credentials file backing the token store
    pub fn credentials_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().join("credentials.toml"))
    }

    /// Load configuration from disk, then apply environment overrides.
    ///
    /// A missing file is not an error by itself; required values may come
    /// from the environment instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&content)?
        } else {
            tracing::debug!("No config file at {}", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Override client registration values from `lookup` (the environment
    /// in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(v);
        }
        if let Some(v) = lookup(ENV_CLIENT_SECRET) {
            self.client_secret = Some(v);
        }
        if let Some(v) = lookup(ENV_REDIRECT_URI) {
            self.redirect_uri = Some(v);
        }
    }

    /// Build the process-wide client configuration.
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push("client_id");
        }
        if self.client_secret.is_none() {
            missing.push("client_secret");
        }
        if self.redirect_uri.is_none() {
            missing.push("redirect_uri");
        }
        if !missing.is_empty() {
            bail!(
                "Missing OAuth settings: {}. Set them in config.toml or via {}, {}, {}.",
                missing.join(", "),
                ENV_CLIENT_ID,
                ENV_CLIENT_SECRET,
                ENV_REDIRECT_URI
            );
        }

        Ok(AuthConfig {
            client_id: self.client_id.clone().unwrap_or_default(),
            client_secret: self.client_secret.clone().unwrap_or_default(),
            redirect_uri: self.redirect_uri.clone().unwrap_or_default(),
            token_url: self
                .token_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            authorize_url: self
                .authorize_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            scope: self
                .scope
                .clone()
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_endpoints() {
        let config = Config::parse(
            r#"
client_id = "id"
client_secret = "secret"
redirect_uri = "urn:ietf:wg:oauth:2.0:oob"
"#,
        )
        .unwrap();

        let auth = config.auth_config().unwrap();
        assert_eq!(auth.client_id, "id");
        assert_eq!(auth.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(auth.authorize_url, DEFAULT_AUTHORIZE_URL);
        assert_eq!(auth.scope, DEFAULT_SCOPE);
    }

    #[test]
    fn test_missing_settings_are_named() {
        let config = Config::parse(r#"client_id = "id""#).unwrap();
        let err = config.auth_config().unwrap_err().to_string();
        assert!(err.contains("client_secret"));
        assert!(err.contains("redirect_uri"));
        assert!(!err.contains("client_id,"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = Config::parse(
            r#"
client_id = "from-file"
token_url = "http://localhost:9999/oauth/token"
"#,
        )
        .unwrap();

        config.apply_overrides(|key| match key {
            ENV_CLIENT_ID => Some("from-env".to_string()),
            ENV_CLIENT_SECRET => Some("s".to_string()),
            ENV_REDIRECT_URI => Some("app://callback".to_string()),
            _ => None,
        });

        let auth = config.auth_config().unwrap();
        assert_eq!(auth.client_id, "from-env");
        assert_eq!(auth.client_secret, "s");
        assert_eq!(auth.redirect_uri, "app://callback");
        assert_eq!(auth.token_url, "http://localhost:9999/oauth/token");
    }

    #[test]
    fn test_load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scope = \"public\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scope.as_deref(), Some("public"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Config::parse("client_id = [").is_err());
    }
}
