//! Tuneshare catalog
//!
//! The revisioned, transactional media catalog: a [`Library`] holding
//! [`Database`]s, each with a master [`Playlist`], further playlists, and
//! [`Song`]s.
//!
//! # Architecture
//!
//! - **Snapshots**: readers get an immutable `Arc<Catalog>`; a reader never
//!   sees a partially applied commit
//! - **Operations**: every mutation is an [`Operation`] staged on a [`Mutate`]
//!   target
//! - **Targets**: [`Transaction`] (explicit commit/rollback), [`Immediate`]
//!   (one commit per operation) and [`AutoCommitTransaction`] (threshold and
//!   timer driven)
//! - **Revisions**: start at 1 and advance exactly once per commit that
//!   changed something; published on a `tokio::sync::watch` channel
//!
//! # Example
//!
//! ```rust
//! use tuneshare_catalog::{Database, Library, Mutate, Song};
//!
//! let library = Library::new("Home");
//! let mut tx = library.transaction();
//! let db = tx.add_database(Database::new("Music"))?;
//! tx.add_song(db, Song::new("Blue in Green"))?;
//! tx.commit()?;
//!
//! let snapshot = library.snapshot();
//! assert_eq!(snapshot.revision(), 2);
//! assert_eq!(snapshot.database(db).map(|d| d.song_count()), Some(1));
//! # Ok::<(), tuneshare_catalog::CatalogError>(())
//! ```

#![forbid(unsafe_code)]

pub mod auto_commit;
pub mod catalog;
pub mod database;
pub mod error;
pub mod ids;
pub mod library;
pub mod operation;
pub mod playlist;
pub mod song;
pub mod transaction;

pub use auto_commit::{AutoCommitConfig, AutoCommitTransaction};
pub use catalog::Catalog;
pub use database::{Database, SongEntry};
pub use error::{CatalogError, Result};
pub use ids::{DatabaseId, PlaylistId, SongId};
pub use library::Library;
pub use operation::{Mutate, Operation};
pub use playlist::{Playlist, PlaylistEntry, PlaylistFlag, PlaylistFlags};
pub use song::{Song, SongField};
pub use transaction::{CommitOutcome, Immediate, Transaction, TransactionState};
