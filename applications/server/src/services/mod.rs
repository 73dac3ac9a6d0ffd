/// Server services
pub mod auth;
pub mod catalog_watcher;
pub mod song_source;

pub use auth::{AuthOutcome, AuthService, CredentialCheck, StaticCredentials};
pub use catalog_watcher::CatalogWatcher;
pub use song_source::{FileSongSource, SongSource, SongStream};
