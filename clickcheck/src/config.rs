//! Configuration shared by `clicksend` and `clickserve`.
//!
//! Values come from an optional TOML file, overridden by environment
//! variables prefixed with `CLICKCHECK_` (e.g. `CLICKCHECK_PASSWORD`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "CLICKCHECK_";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "clickcheck.toml";

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL template for tracking links
    #[serde(default)]
    pub url: String,

    /// Default recipient
    #[serde(default)]
    pub to: String,

    /// Default 822.From
    #[serde(default)]
    pub from: String,

    /// Directory holding `<name>.tpl` message templates
    #[serde(default = "default_templates")]
    pub templates: PathBuf,

    /// Mail relay as `host:port`
    #[serde(default)]
    pub smarthost: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Directory holding tracking images
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// File holding the last issued tracking identifier
    #[serde(default = "default_counter")]
    pub counter: PathBuf,

    /// Address the receiver listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Host name prefix the receiver accepts
    #[serde(default = "default_host_prefix")]
    pub host_prefix: String,

    #[serde(default)]
    pub cert: Option<PathBuf>,

    #[serde(default)]
    pub key: Option<PathBuf>,
}

fn default_templates() -> PathBuf {
    PathBuf::from("templates")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_counter() -> PathBuf {
    PathBuf::from("clickcheck.seq")
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_host_prefix() -> String {
    "click".to_string()
}

impl Config {
    /// Load configuration from `path` (if it exists) and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut figment = Figment::new();

        if path.exists() {
            info!(config_path = %path.display(), "config_file_loading");
            figment = figment.merge(Toml::file(path));
        } else {
            debug!(config_path = %path.display(), "config_file_not_found");
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load configuration from a TOML string. Environment variables are not
    /// consulted.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Toml::string(source)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// The base URL template, which the sender cannot do without.
    pub fn url_template(&self) -> Result<&str, ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        Ok(&self.url)
    }

    /// Recipient and sender for one message. A flag that is absent or blank
    /// falls back to the configured default; both must end up non-empty.
    pub fn addresses(
        &self,
        to: Option<&str>,
        from: Option<&str>,
    ) -> Result<(String, String), ConfigError> {
        let to = pick(to, &self.to).ok_or(ConfigError::Missing("to"))?;
        let from = pick(from, &self.from).ok_or(ConfigError::Missing("from"))?;
        Ok((to, from))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|source| ConfigError::Listen {
            value: self.listen.clone(),
            source,
        })
    }

    /// Whether a TLS certificate was configured for the listener.
    pub fn tls_configured(&self) -> bool {
        self.cert.is_some() || self.key.is_some()
    }
}

fn pick(flag: Option<&str>, default: &str) -> Option<String> {
    flag.map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| Some(default.trim()).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.templates, PathBuf::from("templates"));
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.host_prefix, "click");
        assert_eq!(config.counter, PathBuf::from("clickcheck.seq"));
        assert!(!config.tls_configured());
        assert!(matches!(config.url_template(), Err(ConfigError::Missing("url"))));
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            url = "https://click.example.com/t/{{ .Token }}"
            to = "rcpt@example.net"
            from = "sender@example.com"
            smarthost = "smtp.example.com:587"
            listen = "127.0.0.1:9000"
            cert = "/etc/ssl/click.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.url_template().unwrap(), "https://click.example.com/t/{{ .Token }}");
        assert_eq!(config.smarthost, "smtp.example.com:587");
        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert!(config.tls_configured());
    }

    #[test]
    fn test_addresses_fall_back_to_config() {
        let config = Config::from_toml(
            r#"
            to = "rcpt@example.net"
            from = "sender@example.com"
            "#,
        )
        .unwrap();

        let (to, from) = config.addresses(None, None).unwrap();
        assert_eq!(to, "rcpt@example.net");
        assert_eq!(from, "sender@example.com");

        let (to, from) = config.addresses(Some("other@example.org"), Some("")).unwrap();
        assert_eq!(to, "other@example.org");
        assert_eq!(from, "sender@example.com");
    }

    #[test]
    fn test_addresses_missing() {
        let config = Config::from_toml(r#"from = "sender@example.com""#).unwrap();
        assert!(matches!(config.addresses(None, None), Err(ConfigError::Missing("to"))));
        assert!(matches!(
            config.addresses(Some("  "), None),
            Err(ConfigError::Missing("to"))
        ));

        let config = Config::from_toml(r#"to = "rcpt@example.net""#).unwrap();
        assert!(matches!(config.addresses(None, None), Err(ConfigError::Missing("from"))));
        assert!(config.addresses(None, Some("cli@example.com")).is_ok());
    }

    #[test]
    fn test_invalid_listen() {
        let config = Config::from_toml(r#"listen = "nowhere""#).unwrap();
        assert!(matches!(config.listen_addr(), Err(ConfigError::Listen { .. })));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            Config::from_toml("url = "),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_load_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("clickcheck.toml", r#"to = "file@example.net""#)?;
            jail.set_env("CLICKCHECK_FROM", "env@example.com");

            let config = Config::load("clickcheck.toml").expect("config loads");
            assert_eq!(config.to, "file@example.net");
            assert_eq!(config.from, "env@example.com");
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file() {
        figment::Jail::expect_with(|_| {
            let config = Config::load("absent.toml").expect("config loads");
            assert!(config.to.is_empty());
            Ok(())
        });
    }
}
