//! Error types for catalog operations

use crate::ids::{DatabaseId, PlaylistId};
use crate::song::SongField;
use crate::transaction::TransactionState;
use thiserror::Error;
use tuneshare_dmap::DmapError;

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Commit, rollback or staging on a transaction that already finished
    #[error("Transaction is {0:?}")]
    TransactionClosed(TransactionState),

    /// Operation targets a database that is not in the library
    #[error("Database not found: {0}")]
    UnknownDatabase(DatabaseId),

    /// Operation targets a playlist that is not in the database
    #[error("Playlist {playlist} not found in database {database}")]
    UnknownPlaylist {
        database: DatabaseId,
        playlist: PlaylistId,
    },

    /// The master playlist is removed only together with its database
    #[error("Master playlist {0} cannot be removed")]
    MasterPlaylist(PlaylistId),

    /// Auto-commit timers need a running tokio runtime
    #[error("Auto-commit requires a tokio runtime")]
    NoRuntime,

    /// Attribute value rejected by the content-code registry
    #[error("Invalid value for {field:?}: {source}")]
    Attribute {
        field: SongField,
        #[source]
        source: DmapError,
    },
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
