//! Playlist entity

use crate::ids::{persistent_id, PlaylistId, SongId};
use std::collections::BTreeMap;

/// Boolean playlist properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistFlag {
    Smart,
    Podcast,
    /// Songs added to this playlist are also added to the database
    NotifyMasterOnAdd,
    /// Songs removed from this playlist are also removed from the database
    NotifyMasterOnRemove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistFlags {
    pub smart: bool,
    pub podcast: bool,
    pub notify_master_on_add: bool,
    pub notify_master_on_remove: bool,
}

impl Default for PlaylistFlags {
    fn default() -> Self {
        Self {
            smart: false,
            podcast: false,
            notify_master_on_add: true,
            notify_master_on_remove: false,
        }
    }
}

impl PlaylistFlags {
    pub fn get(&self, flag: PlaylistFlag) -> bool {
        match flag {
            PlaylistFlag::Smart => self.smart,
            PlaylistFlag::Podcast => self.podcast,
            PlaylistFlag::NotifyMasterOnAdd => self.notify_master_on_add,
            PlaylistFlag::NotifyMasterOnRemove => self.notify_master_on_remove,
        }
    }

    fn slot(&mut self, flag: PlaylistFlag) -> &mut bool {
        match flag {
            PlaylistFlag::Smart => &mut self.smart,
            PlaylistFlag::Podcast => &mut self.podcast,
            PlaylistFlag::NotifyMasterOnAdd => &mut self.notify_master_on_add,
            PlaylistFlag::NotifyMasterOnRemove => &mut self.notify_master_on_remove,
        }
    }
}

/// A song's membership in a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub song: SongId,
    /// Revision that added the song
    pub revision: u32,
}

/// An ordered list of song references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    id: PlaylistId,
    persistent_id: u64,
    name: String,
    flags: PlaylistFlags,
    master: bool,
    revision: u32,
    entries: Vec<PlaylistEntry>,
    removed: BTreeMap<SongId, u32>,
}

impl Playlist {
    /// Create an empty playlist with default flags
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PlaylistId::generate(),
            persistent_id: persistent_id(),
            name: name.into(),
            flags: PlaylistFlags::default(),
            master: false,
            revision: 0,
            entries: Vec::new(),
            removed: BTreeMap::new(),
        }
    }

    pub(crate) fn master(name: impl Into<String>) -> Self {
        Self {
            master: true,
            ..Self::new(name)
        }
    }

    /// Builder-style flag setter, for playlists not yet added
    pub fn with_flag(mut self, flag: PlaylistFlag, value: bool) -> Self {
        *self.flags.slot(flag) = value;
        self
    }

    pub fn id(&self) -> PlaylistId {
        self.id
    }

    pub fn persistent_id(&self) -> u64 {
        self.persistent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> PlaylistFlags {
        self.flags
    }

    pub fn flag(&self, flag: PlaylistFlag) -> bool {
        self.flags.get(flag)
    }

    /// Whether this is its database's master playlist
    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Revision of the last change to this playlist
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn song_ids(&self) -> impl Iterator<Item = SongId> + '_ {
        self.entries.iter().map(|e| e.song)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, song: SongId) -> bool {
        self.entries.iter().any(|e| e.song == song)
    }

    /// Entries added after `revision`
    pub fn entries_since(&self, revision: u32) -> impl Iterator<Item = &PlaylistEntry> + '_ {
        self.entries.iter().filter(move |e| e.revision > revision)
    }

    /// Songs removed after `revision` and not added back
    pub fn removed_since(&self, revision: u32) -> impl Iterator<Item = SongId> + '_ {
        self.removed
            .iter()
            .filter(move |(_, r)| **r > revision)
            .map(|(id, _)| *id)
    }

    // ===== Mutation (commit path only) =====

    pub(crate) fn stamp(&mut self, revision: u32) {
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

    pub(crate) fn set_flag(&mut self, flag: PlaylistFlag, value: bool, revision: u32) -> bool {
        let slot = self.flags.slot(flag);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.revision = revision;
        true
    }

    pub(crate) fn insert(&mut self, song: SongId, revision: u32) -> bool {
        if self.contains(song) {
            return false;
        }
        self.entries.push(PlaylistEntry { song, revision });
        self.removed.remove(&song);
        self.revision = revision;
        true
    }

    pub(crate) fn remove(&mut self, song: SongId, revision: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.song != song);
        if self.entries.len() == before {
            return false;
        }
        self.removed.insert(song, revision);
        self.revision = revision;
        true
    }
}
