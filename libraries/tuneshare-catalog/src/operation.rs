//! Staged catalog operations
//!
//! Every mutation is expressed as an [`Operation`] and staged on a
//! [`Mutate`] target. The provided methods on [`Mutate`] are the catalog's
//! public mutators; implementors only decide what staging means.

use crate::database::Database;
use crate::error::Result;
use crate::ids::{DatabaseId, PlaylistId, SongId};
use crate::playlist::{Playlist, PlaylistFlag};
use crate::song::{Song, SongField};
use tuneshare_dmap::Value;

/// One staged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SetLibraryName {
        name: String,
    },
    AddDatabase {
        database: Database,
    },
    RemoveDatabase {
        database: DatabaseId,
    },
    SetDatabaseName {
        database: DatabaseId,
        name: String,
    },
    AddPlaylist {
        database: DatabaseId,
        playlist: Playlist,
    },
    /// Fails the commit when aimed at the master playlist
    RemovePlaylist {
        database: DatabaseId,
        playlist: PlaylistId,
    },
    SetPlaylistName {
        database: DatabaseId,
        playlist: PlaylistId,
        name: String,
    },
    SetPlaylistFlag {
        database: DatabaseId,
        playlist: PlaylistId,
        flag: PlaylistFlag,
        value: bool,
    },
    /// Add to the database, and so to its master playlist
    AddSong {
        database: DatabaseId,
        song: Song,
    },
    /// Remove from the database and every playlist in it
    RemoveSong {
        database: DatabaseId,
        song: SongId,
    },
    AddSongToPlaylist {
        database: DatabaseId,
        playlist: PlaylistId,
        song: Song,
    },
    RemoveSongFromPlaylist {
        database: DatabaseId,
        playlist: PlaylistId,
        song: SongId,
    },
    /// Set (`Some`) or clear (`None`) one attribute wherever the song is held
    UpdateSong {
        song: SongId,
        field: SongField,
        value: Option<Value>,
    },
}

/// A staging target for catalog mutations
pub trait Mutate {
    /// Stage one operation
    fn stage(&mut self, op: Operation) -> Result<()>;

    fn set_library_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.stage(Operation::SetLibraryName { name: name.into() })
    }

    /// Add a database; returns its id
    fn add_database(&mut self, database: Database) -> Result<DatabaseId> {
        let id = database.id();
        self.stage(Operation::AddDatabase { database })?;
        Ok(id)
    }

    fn remove_database(&mut self, database: DatabaseId) -> Result<()> {
        self.stage(Operation::RemoveDatabase { database })
    }

    fn set_database_name(&mut self, database: DatabaseId, name: impl Into<String>) -> Result<()> {
        self.stage(Operation::SetDatabaseName {
            database,
            name: name.into(),
        })
    }

    /// Add a playlist; returns its id
    fn add_playlist(&mut self, database: DatabaseId, playlist: Playlist) -> Result<PlaylistId> {
        let id = playlist.id();
        self.stage(Operation::AddPlaylist { database, playlist })?;
        Ok(id)
    }

    fn remove_playlist(&mut self, database: DatabaseId, playlist: PlaylistId) -> Result<()> {
        self.stage(Operation::RemovePlaylist { database, playlist })
    }

    fn set_playlist_name(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        name: impl Into<String>,
    ) -> Result<()> {
        self.stage(Operation::SetPlaylistName {
            database,
            playlist,
            name: name.into(),
        })
    }

    fn set_playlist_flag(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        flag: PlaylistFlag,
        value: bool,
    ) -> Result<()> {
        self.stage(Operation::SetPlaylistFlag {
            database,
            playlist,
            flag,
            value,
        })
    }

    fn set_smart_playlist(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        value: bool,
    ) -> Result<()> {
        self.set_playlist_flag(database, playlist, PlaylistFlag::Smart, value)
    }

    fn set_podcast_playlist(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        value: bool,
    ) -> Result<()> {
        self.set_playlist_flag(database, playlist, PlaylistFlag::Podcast, value)
    }

    /// Add a song to a database; returns its id
    fn add_song(&mut self, database: DatabaseId, song: Song) -> Result<SongId> {
        let id = song.id();
        self.stage(Operation::AddSong { database, song })?;
        Ok(id)
    }

    fn remove_song(&mut self, database: DatabaseId, song: SongId) -> Result<()> {
        self.stage(Operation::RemoveSong { database, song })
    }

    fn add_song_to_playlist(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        song: Song,
    ) -> Result<SongId> {
        let id = song.id();
        self.stage(Operation::AddSongToPlaylist {
            database,
            playlist,
            song,
        })?;
        Ok(id)
    }

    fn remove_song_from_playlist(
        &mut self,
        database: DatabaseId,
        playlist: PlaylistId,
        song: SongId,
    ) -> Result<()> {
        self.stage(Operation::RemoveSongFromPlaylist {
            database,
            playlist,
            song,
        })
    }

    fn set_song_attribute(
        &mut self,
        song: SongId,
        field: SongField,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.stage(Operation::UpdateSong {
            song,
            field,
            value: Some(value.into()),
        })
    }

    fn clear_song_attribute(&mut self, song: SongId, field: SongField) -> Result<()> {
        self.stage(Operation::UpdateSong {
            song,
            field,
            value: None,
        })
    }

    fn set_song_name(&mut self, song: SongId, name: impl Into<String>) -> Result<()> {
        self.set_song_attribute(song, SongField::Name, name.into())
    }

    fn set_song_artist(&mut self, song: SongId, artist: impl Into<String>) -> Result<()> {
        self.set_song_attribute(song, SongField::Artist, artist.into())
    }

    fn set_song_album(&mut self, song: SongId, album: impl Into<String>) -> Result<()> {
        self.set_song_attribute(song, SongField::Album, album.into())
    }

    fn set_song_genre(&mut self, song: SongId, genre: impl Into<String>) -> Result<()> {
        self.set_song_attribute(song, SongField::Genre, genre.into())
    }

    fn set_song_year(&mut self, song: SongId, year: u16) -> Result<()> {
        self.set_song_attribute(song, SongField::Year, year)
    }

    fn set_song_track_number(&mut self, song: SongId, track: u16) -> Result<()> {
        self.set_song_attribute(song, SongField::TrackNumber, track)
    }

    /// Rating on the 0-100 scale
    fn set_song_rating(&mut self, song: SongId, rating: u8) -> Result<()> {
        self.set_song_attribute(song, SongField::UserRating, rating)
    }

    fn set_song_disabled(&mut self, song: SongId, disabled: bool) -> Result<()> {
        self.set_song_attribute(song, SongField::Disabled, disabled)
    }
}
