/// Shared application state
use crate::config::ServerConfig;
use crate::protocol::ServerInfo;
use crate::services::{AuthService, SongSource};
use crate::session::ConnectionPool;
use http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tuneshare_catalog::Library;

/// Application state shared across all connections
#[derive(Clone)]
pub struct AppState {
    pub library: Library,
    pub pool: Arc<ConnectionPool>,
    pub auth: Arc<AuthService>,
    pub songs: Arc<dyn SongSource>,
    pub info: ServerInfo,
    pub idle_timeout: Duration,
    /// Value of the `DAAP-Server` header
    pub server_header: HeaderValue,
}

impl AppState {
    pub fn new(config: &ServerConfig, library: Library, songs: Arc<dyn SongSource>) -> Self {
        let server_header = HeaderValue::from_str(&format!(
            "{}/{}",
            config.server.name,
            env!("CARGO_PKG_VERSION")
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("Tuneshare"));

        Self {
            library,
            pool: Arc::new(ConnectionPool::new(config.server.max_connections)),
            auth: Arc::new(AuthService::from_settings(&config.auth)),
            songs,
            info: ServerInfo {
                name: config.server.name.clone(),
                auth: config.auth.scheme,
                timeout_secs: u32::try_from(config.server.idle_timeout_secs).unwrap_or(u32::MAX),
            },
            idle_timeout: config.idle_timeout(),
            server_header,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("library", &self.library)
            .field("pool", &self.pool)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
