/// Catalog manifest - the TOML file describing what the server shares
use crate::error::{Result, ServerError};
use crate::services::FileSongSource;
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tuneshare_catalog::{Database, Library, Mutate, Playlist, PlaylistFlag, Song, SongField};

/// ```toml
/// [[databases]]
/// name = "Music"
///
/// [[databases.songs]]
/// key = "blue"
/// path = "jazz/blue-in-green.mp3"
/// name = "Blue in Green"
/// artist = "Miles Davis"
///
/// [[databases.playlists]]
/// name = "Late Night"
/// songs = ["blue"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,

    /// Directory relative song paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,

    #[serde(default)]
    pub songs: Vec<SongEntry>,

    #[serde(default)]
    pub playlists: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongEntry {
    /// Handle used by playlists; defaults to the path
    pub key: Option<String>,
    pub path: PathBuf,
    /// Defaults to the file stem
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u16>,
    pub track_number: Option<u16>,
    pub track_count: Option<u16>,
    pub disc_number: Option<u16>,
    pub disc_count: Option<u16>,
    /// Duration in milliseconds
    pub time: Option<u32>,
    pub bitrate: Option<u16>,
    pub sample_rate: Option<u32>,
    pub rating: Option<u8>,
    #[serde(default)]
    pub compilation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    pub name: String,

    #[serde(default)]
    pub smart: bool,

    #[serde(default)]
    pub podcast: bool,

    /// Song keys in playlist order
    #[serde(default)]
    pub songs: Vec<String>,
}

/// Counts of what a manifest load or reload changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    /// Databases added
    pub databases: usize,
    /// Playlists added
    pub playlists: usize,
    /// Songs added
    pub songs: usize,
    /// Known songs whose attributes changed
    pub updated: usize,
    /// Songs dropped from the catalog
    pub removed: usize,
    /// Listed files that could not be read
    pub skipped: usize,
}

impl Manifest {
    /// Read and parse a manifest file
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut manifest = Self::parse(&text)?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ServerError::Manifest(e.to_string()))
    }

    /// Add everything in the manifest to `library` in one transaction and
    /// register song files with `songs`
    pub async fn apply(&self, library: &Library, songs: &FileSongSource) -> Result<ManifestSummary> {
        let mut tx = library.transaction();
        let summary = self.sync(library, songs, &mut tx).await?;
        let outcome = tx.commit()?;

        tracing::info!(
            revision = outcome.revision,
            databases = summary.databases,
            playlists = summary.playlists,
            songs = summary.songs,
            skipped = summary.skipped,
            "Catalog manifest loaded"
        );
        Ok(summary)
    }

    /// Stage whatever brings `library` in line with the manifest
    ///
    /// Databases and playlists are matched by name, songs by file path, so a
    /// song keeps its id across reloads. Files of new songs are registered
    /// with `songs` before the songs are staged; files of removed songs are
    /// forgotten once everything is staged.
    pub async fn sync<M>(
        &self,
        library: &Library,
        songs: &FileSongSource,
        target: &mut M,
    ) -> Result<ManifestSummary>
    where
        M: Mutate + Send,
    {
        let snapshot = library.snapshot();
        let mut summary = ManifestSummary::default();
        let mut stale = Vec::new();

        for db_entry in &self.databases {
            let existing = snapshot.databases().find(|d| d.name() == db_entry.name);
            let database = match existing {
                Some(db) => db.id(),
                None => {
                    summary.databases += 1;
                    target.add_database(Database::new(db_entry.name.clone()))?
                }
            };

            let mut known: HashMap<PathBuf, Arc<Song>> = existing
                .map(|db| {
                    db.songs()
                        .filter_map(|e| songs.path(e.song.id()).map(|p| (p, e.song.clone())))
                        .collect()
                })
                .unwrap_or_default();

            let mut keys: HashMap<String, Song> = HashMap::new();
            for song_entry in &db_entry.songs {
                let path = self.resolve(&song_entry.path);
                let size = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Skipping song: {}", e);
                        summary.skipped += 1;
                        continue;
                    }
                };

                let fresh = song_entry.to_song(&path, size)?;
                let song = match known.remove(&path) {
                    Some(current) => {
                        let merged = refresh(&current, &fresh)?;
                        if merged != *current {
                            summary.updated += 1;
                        }
                        merged
                    }
                    None => {
                        songs.insert(fresh.id(), path);
                        summary.songs += 1;
                        fresh
                    }
                };

                let key = song_entry
                    .key
                    .clone()
                    .unwrap_or_else(|| song_entry.path.to_string_lossy().into_owned());
                target.add_song(database, song.clone())?;
                keys.insert(key, song);
            }

            for song in known.into_values() {
                target.remove_song(database, song.id())?;
                stale.push(song.id());
                summary.removed += 1;
            }

            let mut listed = HashSet::new();
            for pl_entry in &db_entry.playlists {
                listed.insert(pl_entry.name.as_str());
                let current = existing.and_then(|db| {
                    db.playlists()
                        .find(|p| !p.is_master() && p.name() == pl_entry.name)
                });

                let playlist = match current {
                    Some(p) => {
                        target.set_smart_playlist(database, p.id(), pl_entry.smart)?;
                        target.set_podcast_playlist(database, p.id(), pl_entry.podcast)?;
                        p.id()
                    }
                    None => {
                        summary.playlists += 1;
                        let playlist = Playlist::new(pl_entry.name.clone())
                            .with_flag(PlaylistFlag::Smart, pl_entry.smart)
                            .with_flag(PlaylistFlag::Podcast, pl_entry.podcast);
                        target.add_playlist(database, playlist)?
                    }
                };

                let mut members = HashSet::new();
                for key in &pl_entry.songs {
                    match keys.get(key) {
                        Some(song) => {
                            members.insert(song.id());
                            target.add_song_to_playlist(database, playlist, song.clone())?;
                        }
                        None => {
                            tracing::warn!(playlist = %pl_entry.name, key = %key, "Unknown song key");
                        }
                    }
                }

                if let Some(p) = current {
                    for id in p.song_ids().filter(|id| !members.contains(id)) {
                        target.remove_song_from_playlist(database, playlist, id)?;
                    }
                }
            }

            if let Some(db) = existing {
                for p in db
                    .playlists()
                    .filter(|p| !p.is_master() && !listed.contains(p.name()))
                {
                    target.remove_playlist(database, p.id())?;
                }
            }
        }

        let wanted: HashSet<&str> = self.databases.iter().map(|d| d.name.as_str()).collect();
        for db in snapshot.databases().filter(|d| !wanted.contains(d.name())) {
            target.remove_database(db.id())?;
            stale.extend(db.songs().map(|e| e.song.id()));
            summary.removed += db.song_count();
        }

        for id in stale {
            songs.remove(id);
        }

        Ok(summary)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// `current` carrying the manifest's attributes, keeping its identity and
/// the date it was first added
fn refresh(current: &Song, fresh: &Song) -> Result<Song> {
    let mut merged = current.clone();
    let dropped: Vec<SongField> = current
        .attributes()
        .map(|(field, _)| field)
        .filter(|&field| field != SongField::DateAdded && fresh.get(field).is_none())
        .collect();
    for field in dropped {
        merged.clear(field);
    }
    for (field, value) in fresh.attributes() {
        if field != SongField::DateAdded {
            merged.set(field, value.clone())?;
        }
    }
    Ok(merged)
}

impl SongEntry {
    fn to_song(&self, path: &Path, size: u64) -> Result<Song> {
        let name = self.name.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let mut song = Song::new(name)
            .with(SongField::Size, u32::try_from(size).unwrap_or(u32::MAX))?
            .with(SongField::DateAdded, Utc::now())?
            .with(SongField::DataKind, 0u8)?;

        if let Some(format) = path.extension().and_then(|e| e.to_str()) {
            song.set(SongField::Format, format.to_ascii_lowercase())?;
        }

        let text_fields = [
            (SongField::Artist, &self.artist),
            (SongField::Album, &self.album),
            (SongField::AlbumArtist, &self.album_artist),
            (SongField::Composer, &self.composer),
            (SongField::Genre, &self.genre),
        ];
        for (field, value) in text_fields {
            if let Some(value) = value {
                song.set(field, value.as_str())?;
            }
        }

        let short_fields = [
            (SongField::Year, self.year),
            (SongField::TrackNumber, self.track_number),
            (SongField::TrackCount, self.track_count),
            (SongField::DiscNumber, self.disc_number),
            (SongField::DiscCount, self.disc_count),
            (SongField::Bitrate, self.bitrate),
        ];
        for (field, value) in short_fields {
            if let Some(value) = value {
                song.set(field, value)?;
            }
        }

        if let Some(time) = self.time {
            song.set(SongField::Time, time)?;
        }
        if let Some(rate) = self.sample_rate {
            song.set(SongField::SampleRate, rate)?;
        }
        if let Some(rating) = self.rating {
            song.set(SongField::UserRating, rating)?;
        }
        if self.compilation {
            song.set(SongField::Compilation, true)?;
        }

        Ok(song)
    }
}
