//! # ib-config
//!
//! Layered runtime settings: built-in defaults, then `config/default.toml`,
//! then `config/local.toml`, then `IB__SECTION__KEY` environment variables.
//! A `.env` file is read first so its variables take part in the last layer.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "IB";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid setting `{0}`: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory uploads are written under.
    pub root: String,
    /// Public URL path the directory is served from.
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// HS256 key for verifying bearer tokens.
    pub jwt_secret: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// One JSON object per line instead of human-readable output.
    pub json: bool,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Settings {
    /// Defaults plus every file and environment layer, ready for overrides.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite:interview_board.db")?
            .set_default("database.max_connections", 5)?
            .set_default("storage.root", "./data/uploads")?
            .set_default("storage.url_prefix", "/uploads")?
            .set_default("storage.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("mail.host", "localhost")?
            .set_default("mail.port", 1025)?
            .set_default("mail.from", "Interview Board <noreply@interview-board.local>")?
            .set_default("log.json", false)?
            .set_default("log.level", "info")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Ok(builder)
    }

    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_builder(Self::builder()?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.auth.jwt_secret.expose_secret().trim().is_empty() {
            return Err(SettingsError::Invalid("auth.jwt_secret", "must not be empty".into()));
        }
        if !self.storage.url_prefix.starts_with('/') {
            return Err(SettingsError::Invalid(
                "storage.url_prefix",
                format!("'{}' must start with '/'", self.storage.url_prefix),
            ));
        }
        if self.storage.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid("storage.max_upload_bytes", "must be positive".into()));
        }
        if self.mail.username.is_some() != self.mail.password.is_some() {
            return Err(SettingsError::Invalid(
                "mail.username",
                "username and password must be set together".into(),
            ));
        }
        Ok(())
    }
}
