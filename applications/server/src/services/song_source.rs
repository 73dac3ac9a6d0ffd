/// Song source - opens the audio bytes behind catalog songs
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt};
use tuneshare_catalog::{Song, SongId};

/// An open song positioned at the requested offset
pub struct SongStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Full length of the song in bytes
    pub total: u64,
    pub content_type: String,
}

impl std::fmt::Debug for SongStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongStream")
            .field("total", &self.total)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SongSource: Send + Sync {
    /// Open a song's bytes starting at `offset`; offsets past the end yield
    /// an exhausted reader
    async fn open(&self, song: &Song, offset: u64) -> Result<SongStream>;
}

/// Songs backed by files on disk
#[derive(Debug, Default)]
pub struct FileSongSource {
    paths: RwLock<HashMap<SongId, PathBuf>>,
}

impl FileSongSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, song: SongId, path: impl Into<PathBuf>) {
        self.paths.write().insert(song, path.into());
    }

    pub fn remove(&self, song: SongId) -> Option<PathBuf> {
        self.paths.write().remove(&song)
    }

    pub fn path(&self, song: SongId) -> Option<PathBuf> {
        self.paths.read().get(&song).cloned()
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}

#[async_trait]
impl SongSource for FileSongSource {
    async fn open(&self, song: &Song, offset: u64) -> Result<SongStream> {
        let path = self
            .path(song.id())
            .ok_or_else(|| ServerError::NotFound(format!("no file for song {}", song.id())))?;

        let mut file = File::open(&path).await?;
        let total = file.metadata().await?.len();
        if offset > 0 && offset < total {
            file.seek(SeekFrom::Start(offset)).await?;
        } else if offset >= total {
            file.seek(SeekFrom::End(0)).await?;
        }

        Ok(SongStream {
            reader: Box::new(file),
            total,
            content_type: content_type(&path, song),
        })
    }
}

fn content_type(path: &Path, song: &Song) -> String {
    mime_guess::from_path(path)
        .first()
        .or_else(|| song.format().and_then(|f| mime_guess::from_ext(f).first()))
        .map_or_else(|| "application/octet-stream".to_string(), |m| m.to_string())
}
