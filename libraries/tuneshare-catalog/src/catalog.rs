//! Committed catalog state
//!
//! A [`Catalog`] is an immutable snapshot once published by the library.
//! Commits work on a copy-on-write clone: databases and playlists sit behind
//! `Arc`s so only the paths an operation touches are copied.

use crate::database::Database;
use crate::error::{CatalogError, Result};
use crate::ids::{DatabaseId, SongId};
use crate::operation::Operation;
use crate::song::{self, Song, SongField};
use std::collections::BTreeMap;
use std::sync::Arc;
use tuneshare_dmap::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    name: String,
    revision: u32,
    databases: Vec<Arc<Database>>,
    deleted_databases: BTreeMap<DatabaseId, u32>,
}

impl Catalog {
    /// Initial revision of every library
    pub const INITIAL_REVISION: u32 = 1;

    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: Self::INITIAL_REVISION,
            databases: Vec::new(),
            deleted_databases: BTreeMap::new(),
        }
    }

    /// Library name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Databases in insertion order
    pub fn databases(&self) -> impl Iterator<Item = &Database> + '_ {
        self.databases.iter().map(|d| d.as_ref())
    }

    pub fn database(&self, id: DatabaseId) -> Option<&Database> {
        self.databases().find(|d| d.id() == id)
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn contains_database(&self, id: DatabaseId) -> bool {
        self.database(id).is_some()
    }

    /// Databases changed after `revision`
    pub fn databases_since(&self, revision: u32) -> impl Iterator<Item = &Database> + '_ {
        self.databases().filter(move |d| d.revision() > revision)
    }

    pub fn deleted_databases_since(&self, revision: u32) -> impl Iterator<Item = DatabaseId> + '_ {
        self.deleted_databases
            .iter()
            .filter(move |(_, r)| **r > revision)
            .map(|(id, _)| *id)
    }

    /// Find a song's data in any database
    pub fn find_song(&self, id: SongId) -> Option<&Arc<Song>> {
        self.databases().find_map(|d| d.song(id))
    }

    // ===== Commit =====

    /// Apply operations in order, stamping changes with the next revision.
    ///
    /// Returns how many operations had an effect. The revision advances only
    /// when that count is non-zero. On error `self` is left partially
    /// modified; callers discard it.
    pub(crate) fn apply_all(&mut self, ops: Vec<Operation>) -> Result<usize> {
        let next = self.revision + 1;
        let mut applied = 0;
        for op in ops {
            if self.apply(op, next)? {
                applied += 1;
            }
        }
        if applied > 0 {
            self.revision = next;
        }
        Ok(applied)
    }

    fn apply(&mut self, op: Operation, rev: u32) -> Result<bool> {
        let changed = match op {
            Operation::SetLibraryName { name } => {
                if self.name == name {
                    false
                } else {
                    self.name = name;
                    true
                }
            }
            Operation::AddDatabase { mut database } => {
                if self.contains_database(database.id()) {
                    false
                } else {
                    database.stamp(rev);
                    self.deleted_databases.remove(&database.id());
                    self.databases.push(Arc::new(database));
                    true
                }
            }
            Operation::RemoveDatabase { database } => {
                let index = self.index_of(database)?;
                self.databases.remove(index);
                self.deleted_databases.insert(database, rev);
                true
            }
            Operation::SetDatabaseName { database, name } => {
                self.database_mut(database)?.set_name(&name, rev)
            }
            Operation::AddPlaylist { database, playlist } => {
                self.database_mut(database)?.add_playlist(playlist, rev)
            }
            Operation::RemovePlaylist { database, playlist } => {
                let db = self.database_mut(database)?;
                if db.master_id() == playlist {
                    return Err(CatalogError::MasterPlaylist(playlist));
                }
                if db.playlist(playlist).is_none() {
                    return Err(CatalogError::UnknownPlaylist { database, playlist });
                }
                db.remove_playlist(playlist, rev)
            }
            Operation::SetPlaylistName {
                database,
                playlist,
                name,
            } => {
                let db = self.database_mut(database)?;
                let changed = db
                    .playlist_mut(playlist)
                    .ok_or(CatalogError::UnknownPlaylist { database, playlist })?
                    .set_name(&name, rev);
                if changed {
                    db.touch(rev);
                }
                changed
            }
            Operation::SetPlaylistFlag {
                database,
                playlist,
                flag,
                value,
            } => {
                let db = self.database_mut(database)?;
                let changed = db
                    .playlist_mut(playlist)
                    .ok_or(CatalogError::UnknownPlaylist { database, playlist })?
                    .set_flag(flag, value, rev);
                if changed {
                    db.touch(rev);
                }
                changed
            }
            Operation::AddSong { database, song } => {
                self.database_mut(database)?.add_song(song, rev)
            }
            Operation::RemoveSong { database, song } => {
                self.database_mut(database)?.remove_song(song, rev)
            }
            Operation::AddSongToPlaylist {
                database,
                playlist,
                song,
            } => {
                let db = self.database_mut(database)?;
                let target = db
                    .playlist(playlist)
                    .ok_or(CatalogError::UnknownPlaylist { database, playlist })?;
                if target.is_master() {
                    db.add_song(song, rev)
                } else {
                    let mirror = target.flags().notify_master_on_add;
                    let mirrored = mirror && db.add_song(song.clone(), rev);
                    db.add_song_to_playlist(playlist, song, rev) || mirrored
                }
            }
            Operation::RemoveSongFromPlaylist {
                database,
                playlist,
                song,
            } => {
                let db = self.database_mut(database)?;
                let target = db
                    .playlist(playlist)
                    .ok_or(CatalogError::UnknownPlaylist { database, playlist })?;
                if target.is_master() || (target.flags().notify_master_on_remove && target.contains(song)) {
                    db.remove_song(song, rev)
                } else {
                    db.remove_song_from_playlist(playlist, song, rev)
                }
            }
            Operation::UpdateSong { song, field, value } => self.update_song(song, field, value, rev)?,
        };

        tracing::trace!(revision = rev, changed, "Applied catalog operation");
        Ok(changed)
    }

    fn update_song(
        &mut self,
        id: SongId,
        field: SongField,
        value: Option<Value>,
        rev: u32,
    ) -> Result<bool> {
        let value = value.map(|v| song::validate(field, v)).transpose()?;
        let mut changed = false;
        for database in &mut self.databases {
            if database.song(id).is_none() {
                continue;
            }
            changed |= Arc::make_mut(database).update_song(
                id,
                |song| match &value {
                    // already validated
                    Some(v) => song.set(field, v.clone()).unwrap_or(false),
                    None => song.clear(field),
                },
                rev,
            );
        }
        Ok(changed)
    }

    fn index_of(&self, id: DatabaseId) -> Result<usize> {
        self.databases
            .iter()
            .position(|d| d.id() == id)
            .ok_or(CatalogError::UnknownDatabase(id))
    }

    fn database_mut(&mut self, id: DatabaseId) -> Result<&mut Database> {
        let index = self.index_of(id)?;
        Ok(Arc::make_mut(&mut self.databases[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{Playlist, PlaylistFlag};

    // ===== Helpers =====

    fn catalog_with_db() -> (Catalog, DatabaseId) {
        let mut catalog = Catalog::new("Home");
        let db = Database::new("Music");
        let id = db.id();
        catalog
            .apply_all(vec![Operation::AddDatabase { database: db }])
            .unwrap();
        (catalog, id)
    }

    // ===== Tests =====

    #[test]
    fn starts_at_initial_revision() {
        let catalog = Catalog::new("Home");
        assert_eq!(catalog.revision(), 1);
        assert_eq!(catalog.name(), "Home");
    }

    #[test]
    fn noop_batch_keeps_revision() {
        let mut catalog = Catalog::new("Home");
        let applied = catalog
            .apply_all(vec![Operation::SetLibraryName {
                name: "Home".into(),
            }])
            .unwrap();
        assert_eq!(applied, 0);
        assert_eq!(catalog.revision(), 1);
    }

    #[test]
    fn batch_advances_revision_once() {
        let (mut catalog, db) = catalog_with_db();
        assert_eq!(catalog.revision(), 2);

        let applied = catalog
            .apply_all(vec![
                Operation::AddSong {
                    database: db,
                    song: Song::new("A"),
                },
                Operation::AddSong {
                    database: db,
                    song: Song::new("B"),
                },
            ])
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(catalog.revision(), 3);
        assert_eq!(catalog.database(db).unwrap().song_count(), 2);
    }

    #[test]
    fn unknown_database_is_an_error() {
        let mut catalog = Catalog::new("Home");
        let missing = DatabaseId::new(u32::MAX);
        let err = catalog
            .apply_all(vec![Operation::RemoveDatabase { database: missing }])
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownDatabase(id) if id == missing));
    }

    #[test]
    fn master_playlist_cannot_be_removed() {
        let (mut catalog, db) = catalog_with_db();
        let master = catalog.database(db).unwrap().master_id();
        let err = catalog
            .apply_all(vec![Operation::RemovePlaylist {
                database: db,
                playlist: master,
            }])
            .unwrap_err();
        assert!(matches!(err, CatalogError::MasterPlaylist(_)));
    }

    #[test]
    fn notify_on_add_mirrors_into_database() {
        let (mut catalog, db) = catalog_with_db();
        let playlist = Playlist::new("Mix");
        let pid = playlist.id();
        let quiet = Playlist::new("Quiet").with_flag(PlaylistFlag::NotifyMasterOnAdd, false);
        let qid = quiet.id();
        let mirrored = Song::new("Mirrored");
        let kept_out = Song::new("Kept out");
        let (mirrored_id, kept_out_id) = (mirrored.id(), kept_out.id());

        catalog
            .apply_all(vec![
                Operation::AddPlaylist {
                    database: db,
                    playlist,
                },
                Operation::AddPlaylist {
                    database: db,
                    playlist: quiet,
                },
                Operation::AddSongToPlaylist {
                    database: db,
                    playlist: pid,
                    song: mirrored,
                },
                Operation::AddSongToPlaylist {
                    database: db,
                    playlist: qid,
                    song: kept_out,
                },
            ])
            .unwrap();

        let database = catalog.database(db).unwrap();
        assert!(database.contains_song(mirrored_id));
        assert!(!database.contains_song(kept_out_id));
        assert!(database.playlist(qid).unwrap().contains(kept_out_id));
    }

    #[test]
    fn notify_on_remove_removes_from_database() {
        let (mut catalog, db) = catalog_with_db();
        let playlist = Playlist::new("Mix").with_flag(PlaylistFlag::NotifyMasterOnRemove, true);
        let pid = playlist.id();
        let song = Song::new("Gone");
        let sid = song.id();

        catalog
            .apply_all(vec![
                Operation::AddPlaylist {
                    database: db,
                    playlist,
                },
                Operation::AddSongToPlaylist {
                    database: db,
                    playlist: pid,
                    song,
                },
            ])
            .unwrap();
        catalog
            .apply_all(vec![Operation::RemoveSongFromPlaylist {
                database: db,
                playlist: pid,
                song: sid,
            }])
            .unwrap();

        let database = catalog.database(db).unwrap();
        assert!(!database.contains_song(sid));
        assert!(database.song(sid).is_none());
    }

    #[test]
    fn update_song_touches_every_database() {
        let mut catalog = Catalog::new("Home");
        let first = Database::new("One");
        let second = Database::new("Two");
        let (a, b) = (first.id(), second.id());
        let song = Song::new("Shared");
        let sid = song.id();

        catalog
            .apply_all(vec![
                Operation::AddDatabase { database: first },
                Operation::AddDatabase { database: second },
                Operation::AddSong {
                    database: a,
                    song: song.clone(),
                },
                Operation::AddSong { database: b, song },
            ])
            .unwrap();
        catalog
            .apply_all(vec![Operation::UpdateSong {
                song: sid,
                field: SongField::Artist,
                value: Some("Someone".into()),
            }])
            .unwrap();

        for id in [a, b] {
            let song = catalog.database(id).unwrap().song(sid).unwrap();
            assert_eq!(song.artist(), Some("Someone"));
        }
    }

    #[test]
    fn update_unknown_song_is_noop() {
        let (mut catalog, _) = catalog_with_db();
        let applied = catalog
            .apply_all(vec![Operation::UpdateSong {
                song: SongId::new(u32::MAX),
                field: SongField::Album,
                value: Some("x".into()),
            }])
            .unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn update_with_wrong_type_is_an_error() {
        let (mut catalog, _) = catalog_with_db();
        let err = catalog
            .apply_all(vec![Operation::UpdateSong {
                song: SongId::new(1),
                field: SongField::Year,
                value: Some("1999".into()),
            }])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Attribute { field: SongField::Year, .. }));
    }

    #[test]
    fn removed_database_leaves_tombstone() {
        let (mut catalog, db) = catalog_with_db();
        catalog
            .apply_all(vec![Operation::RemoveDatabase { database: db }])
            .unwrap();
        assert_eq!(catalog.revision(), 3);
        assert_eq!(catalog.deleted_databases_since(2).collect::<Vec<_>>(), vec![db]);
        assert!(catalog.deleted_databases_since(3).next().is_none());
    }
}
