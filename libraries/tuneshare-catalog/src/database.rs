//! Database entity
//!
//! A database owns its playlists and the data of every song they reference.
//! The master playlist is created with the database, always listed first,
//! and defines which songs the database itself contains.

use crate::ids::{persistent_id, DatabaseId, PlaylistId, SongId};
use crate::playlist::Playlist;
use crate::song::Song;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Song data held by a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongEntry {
    pub song: Arc<Song>,
    /// Revision that last added or modified the song
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    id: DatabaseId,
    persistent_id: u64,
    name: String,
    revision: u32,
    playlists: Vec<Arc<Playlist>>,
    songs: BTreeMap<SongId, SongEntry>,
    deleted_songs: BTreeMap<SongId, u32>,
    deleted_playlists: BTreeMap<PlaylistId, u32>,
}

impl Database {
    /// Create an empty database with its master playlist
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: DatabaseId::generate(),
            persistent_id: persistent_id(),
            playlists: vec![Arc::new(Playlist::master(name.clone()))],
            name,
            revision: 0,
            songs: BTreeMap::new(),
            deleted_songs: BTreeMap::new(),
            deleted_playlists: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DatabaseId {
        self.id
    }

    pub fn persistent_id(&self) -> u64 {
        self.persistent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Revision of the last change anywhere in this database
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn master(&self) -> &Playlist {
        &self.playlists[0]
    }

    pub fn master_id(&self) -> PlaylistId {
        self.master().id()
    }

    /// Playlists, master first
    pub fn playlists(&self) -> impl Iterator<Item = &Playlist> + '_ {
        self.playlists.iter().map(|p| p.as_ref())
    }

    pub fn playlist(&self, id: PlaylistId) -> Option<&Playlist> {
        self.playlists().find(|p| p.id() == id)
    }

    pub fn playlist_count(&self) -> usize {
        self.playlists.len()
    }

    /// Whether the song belongs to the database (its master playlist)
    pub fn contains_song(&self, id: SongId) -> bool {
        self.master().contains(id)
    }

    /// Song data, for any song referenced by one of the playlists
    pub fn song(&self, id: SongId) -> Option<&Arc<Song>> {
        self.songs.get(&id).map(|e| &e.song)
    }

    pub fn song_entry(&self, id: SongId) -> Option<&SongEntry> {
        self.songs.get(&id)
    }

    /// The database's songs in master playlist order
    pub fn songs(&self) -> impl Iterator<Item = &SongEntry> + '_ {
        self.master()
            .song_ids()
            .filter_map(|id| self.songs.get(&id))
    }

    pub fn song_count(&self) -> usize {
        self.master().len()
    }

    /// Songs added or modified after `revision`
    pub fn songs_since(&self, revision: u32) -> impl Iterator<Item = &SongEntry> + '_ {
        self.songs().filter(move |e| e.revision > revision)
    }

    /// Songs removed from the database after `revision`
    pub fn deleted_songs_since(&self, revision: u32) -> impl Iterator<Item = SongId> + '_ {
        since(&self.deleted_songs, revision)
    }

    /// Playlists changed after `revision`, master first
    pub fn playlists_since(&self, revision: u32) -> impl Iterator<Item = &Playlist> + '_ {
        self.playlists().filter(move |p| p.revision() > revision)
    }

    pub fn deleted_playlists_since(&self, revision: u32) -> impl Iterator<Item = PlaylistId> + '_ {
        since(&self.deleted_playlists, revision)
    }

    // ===== Mutation (commit path only) =====

    pub(crate) fn stamp(&mut self, revision: u32) {
        self.revision = revision;
        Arc::make_mut(&mut self.playlists[0]).stamp(revision);
    }

    pub(crate) fn touch(&mut self, revision: u32) {
        self.revision = revision;
    }

    pub(crate) fn set_name(&mut self, name: &str, revision: u32) -> bool {
        if self.name == name {
            return false;
        }
        name.clone_into(&mut self.name);
        self.revision = revision;
        true
    }

    pub(crate) fn playlist_mut(&mut self, id: PlaylistId) -> Option<&mut Playlist> {
        self.playlists
            .iter_mut()
            .find(|p| p.id() == id)
            .map(Arc::make_mut)
    }

    pub(crate) fn add_playlist(&mut self, mut playlist: Playlist, revision: u32) -> bool {
        if self.playlist(playlist.id()).is_some() {
            return false;
        }
        playlist.stamp(revision);
        self.deleted_playlists.remove(&playlist.id());
        self.playlists.push(Arc::new(playlist));
        self.revision = revision;
        true
    }

    /// Remove a non-master playlist; the caller rejects the master
    pub(crate) fn remove_playlist(&mut self, id: PlaylistId, revision: u32) -> bool {
        let Some(index) = self.playlists.iter().position(|p| p.id() == id) else {
            return false;
        };
        let removed = self.playlists.remove(index);
        self.deleted_playlists.insert(id, revision);
        for song in removed.song_ids() {
            self.collect(song);
        }
        self.revision = revision;
        true
    }

    /// Store or refresh song data; returns whether it changed
    pub(crate) fn store_song(&mut self, song: Song, revision: u32) -> bool {
        match self.songs.get_mut(&song.id()) {
            Some(entry) if *entry.song == song => false,
            Some(entry) => {
                entry.song = Arc::new(song);
                entry.revision = revision;
                self.revision = revision;
                true
            }
            None => {
                self.songs.insert(
                    song.id(),
                    SongEntry {
                        song: Arc::new(song),
                        revision,
                    },
                );
                true
            }
        }
    }

    /// Add a song to the database and its master playlist
    pub(crate) fn add_song(&mut self, song: Song, revision: u32) -> bool {
        let id = song.id();
        let stored = self.store_song(song, revision);
        let master = Arc::make_mut(&mut self.playlists[0]);
        let added = master.insert(id, revision);
        if added {
            self.deleted_songs.remove(&id);
            if let Some(entry) = self.songs.get_mut(&id) {
                entry.revision = revision;
            }
        }
        if stored || added {
            self.revision = revision;
        }
        stored || added
    }

    /// Add a song to a non-master playlist, storing its data
    pub(crate) fn add_song_to_playlist(
        &mut self,
        playlist: PlaylistId,
        song: Song,
        revision: u32,
    ) -> bool {
        let id = song.id();
        let stored = self.store_song(song, revision);
        let inserted = self
            .playlist_mut(playlist)
            .is_some_and(|p| p.insert(id, revision));
        if !inserted {
            // data for a song no playlist references is not kept
            self.collect(id);
        }
        if stored || inserted {
            self.revision = revision;
        }
        stored || inserted
    }

    /// Remove a song from every playlist and drop its data
    pub(crate) fn remove_song(&mut self, id: SongId, revision: u32) -> bool {
        // only songs the database listed leave a tombstone
        let listed = self.contains_song(id);
        let mut changed = false;
        for playlist in &mut self.playlists {
            if playlist.contains(id) {
                changed |= Arc::make_mut(playlist).remove(id, revision);
            }
        }
        if self.songs.remove(&id).is_some() {
            changed = true;
        }
        if listed {
            self.deleted_songs.insert(id, revision);
        }
        if changed {
            self.revision = revision;
        }
        changed
    }

    /// Remove a song from one playlist, dropping its data if unreferenced
    pub(crate) fn remove_song_from_playlist(
        &mut self,
        playlist: PlaylistId,
        id: SongId,
        revision: u32,
    ) -> bool {
        let removed = self
            .playlist_mut(playlist)
            .is_some_and(|p| p.remove(id, revision));
        if removed {
            self.collect(id);
            self.revision = revision;
        }
        removed
    }

    /// Apply an attribute change; returns whether the song changed
    pub(crate) fn update_song(
        &mut self,
        id: SongId,
        update: impl FnOnce(&mut Song) -> bool,
        revision: u32,
    ) -> bool {
        let Some(entry) = self.songs.get_mut(&id) else {
            return false;
        };
        let mut song = (*entry.song).clone();
        if !update(&mut song) {
            return false;
        }
        entry.song = Arc::new(song);
        entry.revision = revision;
        self.revision = revision;
        true
    }

    fn collect(&mut self, id: SongId) {
        if !self.playlists.iter().any(|p| p.contains(id)) {
            self.songs.remove(&id);
        }
    }
}

fn since<K: Copy + Ord>(tombstones: &BTreeMap<K, u32>, revision: u32) -> impl Iterator<Item = K> + '_ {
    tombstones
        .iter()
        .filter(move |(_, r)| **r > revision)
        .map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_database_has_master_first() {
        let db = Database::new("Music");
        assert_eq!(db.playlist_count(), 1);
        assert!(db.master().is_master());
        assert_eq!(db.master().name(), "Music");
        assert_eq!(db.song_count(), 0);
    }

    #[test]
    fn add_song_mirrors_into_master() {
        let mut db = Database::new("Music");
        let song = Song::new("One");
        let id = song.id();

        assert!(db.add_song(song.clone(), 2));
        assert!(db.contains_song(id));
        assert_eq!(db.song(id).map(|s| s.name()), Some(Some("One")));
        assert!(!db.add_song(song, 3));
        assert_eq!(db.revision(), 2);
    }

    #[test]
    fn playlist_removal_collects_unreferenced_songs() {
        let mut db = Database::new("Music");
        let playlist = Playlist::new("Mix");
        let pid = playlist.id();
        db.add_playlist(playlist, 2);

        let song = Song::new("Loose");
        let sid = song.id();
        assert!(db.add_song_to_playlist(pid, song, 3));
        assert!(db.song(sid).is_some());
        assert!(!db.contains_song(sid));

        assert!(db.remove_playlist(pid, 4));
        assert!(db.song(sid).is_none());
        assert_eq!(db.deleted_playlists_since(3).collect::<Vec<_>>(), vec![pid]);
    }

    #[test]
    fn remove_song_clears_every_playlist() {
        let mut db = Database::new("Music");
        let playlist = Playlist::new("Mix");
        let pid = playlist.id();
        db.add_playlist(playlist, 2);

        let song = Song::new("Both");
        let sid = song.id();
        db.add_song(song.clone(), 3);
        db.add_song_to_playlist(pid, song, 3);

        assert!(db.remove_song(sid, 4));
        assert!(!db.contains_song(sid));
        assert!(!db.playlist(pid).unwrap().contains(sid));
        assert_eq!(db.deleted_songs_since(3).collect::<Vec<_>>(), vec![sid]);
        assert!(!db.remove_song(sid, 5));
    }

    #[test]
    fn removing_playlist_only_song_leaves_no_tombstone() {
        let mut db = Database::new("Music");
        let playlist = Playlist::new("Mix");
        let pid = playlist.id();
        db.add_playlist(playlist, 2);

        let song = Song::new("Loose");
        let sid = song.id();
        db.add_song_to_playlist(pid, song, 3);

        assert!(db.remove_song(sid, 4));
        assert!(db.song(sid).is_none());
        assert!(!db.playlist(pid).unwrap().contains(sid));
        assert_eq!(db.deleted_songs_since(3).count(), 0);
        assert_eq!(db.playlist(pid).unwrap().removed_since(3).collect::<Vec<_>>(), vec![sid]);
    }

    #[test]
    fn songs_since_reports_recent_changes() {
        let mut db = Database::new("Music");
        let old = Song::new("Old");
        let new = Song::new("New");
        let new_id = new.id();
        db.add_song(old, 2);
        db.add_song(new, 3);

        let recent: Vec<_> = db.songs_since(2).map(|e| e.song.id()).collect();
        assert_eq!(recent, vec![new_id]);
    }
}
