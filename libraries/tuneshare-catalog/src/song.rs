//! Song entity
//!
//! A song is a fixed identity plus a set of attributes. Each attribute is a
//! [`SongField`] bound to one registered content code, and its value must match
//! that code's registered type.

use crate::error::{CatalogError, Result};
use crate::ids::{persistent_id, SongId};
use std::collections::BTreeMap;
use tuneshare_dmap::{codes, registry, Chunk, ContentCode, Value, ValueType};

/// Song attributes, each carried on the wire under its own content code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SongField {
    Name,
    Artist,
    Album,
    AlbumArtist,
    Composer,
    Genre,
    Grouping,
    Comment,
    Description,
    LongDescription,
    Category,
    Keywords,
    Format,
    CodecType,
    Bitrate,
    SampleRate,
    /// Duration in milliseconds
    Time,
    /// File size in bytes
    Size,
    StartTime,
    StopTime,
    TrackNumber,
    TrackCount,
    DiscNumber,
    DiscCount,
    Year,
    UserRating,
    BeatsPerMinute,
    Compilation,
    Disabled,
    RelativeVolume,
    EqPreset,
    DateAdded,
    DateModified,
    DataKind,
    DataUrl,
    ContentRating,
    MediaKind,
    Podcast,
    HasVideo,
    NormVolume,
    ItmsSongId,
    ItmsArtistId,
    ItmsPlaylistId,
    ItmsComposerId,
    ItmsGenreId,
    ItmsStorefrontId,
}

impl SongField {
    /// Every field, in wire order
    pub const ALL: [SongField; 46] = [
        SongField::Name,
        SongField::Artist,
        SongField::Album,
        SongField::AlbumArtist,
        SongField::Composer,
        SongField::Genre,
        SongField::Grouping,
        SongField::Comment,
        SongField::Description,
        SongField::LongDescription,
        SongField::Category,
        SongField::Keywords,
        SongField::Format,
        SongField::CodecType,
        SongField::Bitrate,
        SongField::SampleRate,
        SongField::Time,
        SongField::Size,
        SongField::StartTime,
        SongField::StopTime,
        SongField::TrackNumber,
        SongField::TrackCount,
        SongField::DiscNumber,
        SongField::DiscCount,
        SongField::Year,
        SongField::UserRating,
        SongField::BeatsPerMinute,
        SongField::Compilation,
        SongField::Disabled,
        SongField::RelativeVolume,
        SongField::EqPreset,
        SongField::DateAdded,
        SongField::DateModified,
        SongField::DataKind,
        SongField::DataUrl,
        SongField::ContentRating,
        SongField::MediaKind,
        SongField::Podcast,
        SongField::HasVideo,
        SongField::NormVolume,
        SongField::ItmsSongId,
        SongField::ItmsArtistId,
        SongField::ItmsPlaylistId,
        SongField::ItmsComposerId,
        SongField::ItmsGenreId,
        SongField::ItmsStorefrontId,
    ];

    /// Content code this field is serialized under
    pub const fn code(self) -> ContentCode {
        match self {
            SongField::Name => codes::MINM,
            SongField::Artist => codes::ASAR,
            SongField::Album => codes::ASAL,
            SongField::AlbumArtist => codes::ASAA,
            SongField::Composer => codes::ASCP,
            SongField::Genre => codes::ASGN,
            SongField::Grouping => codes::ASGR,
            SongField::Comment => codes::ASCM,
            SongField::Description => codes::ASDT,
            SongField::LongDescription => codes::ASLC,
            SongField::Category => codes::ASCT,
            SongField::Keywords => codes::ASKY,
            SongField::Format => codes::ASFM,
            SongField::CodecType => codes::ASCD,
            SongField::Bitrate => codes::ASBR,
            SongField::SampleRate => codes::ASSR,
            SongField::Time => codes::ASTM,
            SongField::Size => codes::ASSZ,
            SongField::StartTime => codes::ASST,
            SongField::StopTime => codes::ASSP,
            SongField::TrackNumber => codes::ASTN,
            SongField::TrackCount => codes::ASTC,
            SongField::DiscNumber => codes::ASDN,
            SongField::DiscCount => codes::ASDC,
            SongField::Year => codes::ASYR,
            SongField::UserRating => codes::ASUR,
            SongField::BeatsPerMinute => codes::ASBT,
            SongField::Compilation => codes::ASCO,
            SongField::Disabled => codes::ASDB,
            SongField::RelativeVolume => codes::ASRV,
            SongField::EqPreset => codes::ASEQ,
            SongField::DateAdded => codes::ASDA,
            SongField::DateModified => codes::ASDM,
            SongField::DataKind => codes::ASDK,
            SongField::DataUrl => codes::ASUL,
            SongField::ContentRating => codes::ASCR,
            SongField::MediaKind => codes::AEMK,
            SongField::Podcast => codes::AEPC,
            SongField::HasVideo => codes::AEHV,
            SongField::NormVolume => codes::AENV,
            SongField::ItmsSongId => codes::AESI,
            SongField::ItmsArtistId => codes::AEAI,
            SongField::ItmsPlaylistId => codes::AEPI,
            SongField::ItmsComposerId => codes::AECI,
            SongField::ItmsGenreId => codes::AEGI,
            SongField::ItmsStorefrontId => codes::AESF,
        }
    }

    /// Field serialized under a content code, if any
    pub fn from_code(code: ContentCode) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    /// Registered value type for this field
    pub fn value_type(self) -> Option<ValueType> {
        registry().get(self.code()).map(|e| e.value_type)
    }
}

/// A song: identity plus attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    id: SongId,
    persistent_id: u64,
    attributes: BTreeMap<SongField, Value>,
}

impl Song {
    /// Create a song with a fresh identity and a name
    pub fn new(name: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(SongField::Name, Value::String(name.into()));
        Self {
            id: SongId::generate(),
            persistent_id: persistent_id(),
            attributes,
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, field: SongField, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    pub fn id(&self) -> SongId {
        self.id
    }

    pub fn persistent_id(&self) -> u64 {
        self.persistent_id
    }

    pub fn get(&self, field: SongField) -> Option<&Value> {
        self.attributes.get(&field)
    }

    /// Attributes in field order
    pub fn attributes(&self) -> impl Iterator<Item = (SongField, &Value)> {
        self.attributes.iter().map(|(f, v)| (*f, v))
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(SongField::Name)
    }

    pub fn artist(&self) -> Option<&str> {
        self.get_str(SongField::Artist)
    }

    pub fn album(&self) -> Option<&str> {
        self.get_str(SongField::Album)
    }

    pub fn genre(&self) -> Option<&str> {
        self.get_str(SongField::Genre)
    }

    /// File extension / format (`mp3`, `m4a`)
    pub fn format(&self) -> Option<&str> {
        self.get_str(SongField::Format)
    }

    /// Size in bytes
    pub fn size(&self) -> Option<u64> {
        self.get(SongField::Size).and_then(Value::as_u64)
    }

    /// Duration in milliseconds
    pub fn time(&self) -> Option<u64> {
        self.get(SongField::Time).and_then(Value::as_u64)
    }

    pub fn has_video(&self) -> bool {
        self.get(SongField::HasVideo)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn get_str(&self, field: SongField) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Set an attribute; returns whether the stored value changed
    pub fn set(&mut self, field: SongField, value: impl Into<Value>) -> Result<bool> {
        let value = validate(field, value.into())?;
        if self.attributes.get(&field) == Some(&value) {
            return Ok(false);
        }
        self.attributes.insert(field, value);
        Ok(true)
    }

    /// Remove an attribute; returns whether it was present
    pub fn clear(&mut self, field: SongField) -> bool {
        self.attributes.remove(&field).is_some()
    }

    /// Chunk for one attribute, if set
    pub fn chunk(&self, field: SongField) -> Option<tuneshare_dmap::Result<Chunk>> {
        self.get(field)
            .map(|value| Chunk::new(field.code(), value.clone()))
    }
}

/// Check a value against the registry and normalize it the way the wire will
pub(crate) fn validate(field: SongField, value: Value) -> Result<Value> {
    Chunk::new(field.code(), value)
        .map(Chunk::into_value)
        .map_err(|source| CatalogError::Attribute { field, source })
}
