/// Server configuration
use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tuneshare_catalog::AutoCommitConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_auth")]
    pub auth: AuthSettings,

    #[serde(default = "default_catalog")]
    pub catalog: CatalogSettings,

    #[serde(default = "default_auto_commit")]
    pub auto_commit: AutoCommitSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name announced in server-info and the `DAAP-Server` header
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum simultaneous control connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub scheme: AuthScheme,

    /// Required user name; any user name is accepted when unset
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_realm")]
    pub realm: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    None,
    Basic,
    Digest,
}

impl AuthScheme {
    /// Value of `dmap.authenticationmethod`
    pub fn wire_id(self) -> u8 {
        match self {
            AuthScheme::None => 0,
            AuthScheme::Basic => 1,
            AuthScheme::Digest => 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogSettings {
    #[serde(default = "default_library_name")]
    pub library_name: String,

    /// TOML manifest listing databases, playlists and songs
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    /// Reload the manifest when it changes on disk
    #[serde(default = "default_watch")]
    pub watch: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoCommitSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

impl ServerConfig {
    /// Load configuration from `config.toml` (or `path`) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let config_path = PathBuf::from("config.toml");
                if config_path.exists() {
                    settings = settings.add_source(config::File::from(config_path));
                }
            }
        }

        // Override with environment variables (prefixed with TUNESHARE_)
        settings = settings.add_source(
            config::Environment::with_prefix("TUNESHARE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(ServerError::Config(
                "server.max_connections must be at least 1".to_string(),
            ));
        }

        if self.server.idle_timeout_secs == 0 {
            return Err(ServerError::Config(
                "server.idle_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.auth.scheme != AuthScheme::None && self.auth.password.is_empty() {
            return Err(ServerError::Config(
                "auth.password is required when authentication is enabled (set TUNESHARE_AUTH__PASSWORD)"
                    .to_string(),
            ));
        }

        if self.auto_commit.interval_ms == 0 || self.auto_commit.threshold == 0 {
            return Err(ServerError::Config(
                "auto_commit.interval_ms and auto_commit.threshold must be positive".to_string(),
            ));
        }

        if let Some(manifest) = &self.catalog.manifest {
            if !manifest.exists() {
                return Err(ServerError::Config(format!(
                    "Catalog manifest not found at {:?}",
                    manifest
                )));
            }
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    pub fn auto_commit(&self) -> AutoCommitConfig {
        AutoCommitConfig {
            interval: Duration::from_millis(self.auto_commit.interval_ms),
            threshold: self.auto_commit.threshold,
        }
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        host: default_host(),
        port: default_port(),
        name: default_name(),
        max_connections: default_max_connections(),
        idle_timeout_secs: default_idle_timeout_secs(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3689
}

fn default_name() -> String {
    "Tuneshare".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_auth() -> AuthSettings {
    AuthSettings {
        scheme: AuthScheme::None,
        username: None,
        password: String::new(),
        realm: default_realm(),
    }
}

fn default_realm() -> String {
    "Tuneshare".to_string()
}

fn default_catalog() -> CatalogSettings {
    CatalogSettings {
        library_name: default_library_name(),
        manifest: None,
        watch: default_watch(),
    }
}

fn default_watch() -> bool {
    true
}

fn default_library_name() -> String {
    "Tuneshare Library".to_string()
}

fn default_auto_commit() -> AutoCommitSettings {
    AutoCommitSettings {
        interval_ms: default_interval_ms(),
        threshold: default_threshold(),
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_threshold() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            auth: default_auth(),
            catalog: default_catalog(),
            auto_commit: default_auto_commit(),
        }
    }
}
