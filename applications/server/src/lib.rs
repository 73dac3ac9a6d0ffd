//! Tuneshare Server Library
//!
//! DAAP media catalog sharing server: serves a revisioned catalog to many
//! clients over DMAP-over-HTTP, with long-poll updates and ranged audio.
//!
//! This library exposes the core components for testing purposes.

pub mod audio;
pub mod config;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod server;
pub mod services;
pub mod session;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{AuthScheme, ServerConfig};
pub use error::{Result, ServerError};
pub use manifest::Manifest;
pub use server::Server;
pub use services::{AuthService, CatalogWatcher, FileSongSource, SongSource};
pub use session::ConnectionPool;
pub use state::AppState;
