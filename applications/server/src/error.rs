/// Server error types
use std::io;
use thiserror::Error;
use tuneshare_catalog::CatalogError;
use tuneshare_dmap::DmapError;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection limit reached ({0} control connections)")]
    Capacity(usize),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Manifest watcher error: {0}")]
    Watcher(String),

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] DmapError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl ServerError {
    /// Whether the error is the peer going away rather than a fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
