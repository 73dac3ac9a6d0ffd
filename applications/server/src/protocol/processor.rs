//! Request processor
//!
//! Builds DMAP response trees from a catalog snapshot. Every function here is
//! pure over its inputs; session bookkeeping and long-poll parking live in
//! the connection handler.

use crate::config::AuthScheme;
use crate::error::{Result, ServerError};
use crate::protocol::request::{Meta, Query};
use tuneshare_catalog::{Catalog, Database, DatabaseId, Playlist, PlaylistFlag, PlaylistId, Song, SongField};
use tuneshare_dmap::{codes, registry, Chunk, ContentCode, Version};

pub const DMAP_VERSION: Version = Version::new(2, 0, 0);
pub const DAAP_VERSION: Version = Version::new(3, 0, 0);

const STATUS_OK: u32 = 200;

/// `dmap.itemkind` for audio items
const ITEM_KIND_AUDIO: u8 = 2;

/// `dmap.updatetype`
const UPDATE_FULL: u8 = 0;
const UPDATE_DELTA: u8 = 1;

/// What server-info announces about this server
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub auth: AuthScheme,
    pub timeout_secs: u32,
}

/// `msrv`
pub fn server_info(info: &ServerInfo, catalog: &Catalog) -> Result<Chunk> {
    let login_required = info.auth != AuthScheme::None;
    let children = vec![
        status()?,
        Chunk::new(codes::MPRO, DMAP_VERSION)?,
        Chunk::new(codes::APRO, DAAP_VERSION)?,
        Chunk::new(codes::MINM, info.name.as_str())?,
        Chunk::new(codes::MSLR, login_required)?,
        Chunk::new(codes::MSAU, info.auth.wire_id())?,
        Chunk::new(codes::MSTM, info.timeout_secs)?,
        Chunk::new(codes::MSAL, false)?,
        Chunk::new(codes::MSUP, true)?,
        Chunk::new(codes::MSPI, true)?,
        Chunk::new(codes::MSEX, true)?,
        Chunk::new(codes::MSBR, false)?,
        Chunk::new(codes::MSQY, false)?,
        Chunk::new(codes::MSIX, false)?,
        Chunk::new(codes::MSRS, false)?,
        Chunk::new(codes::MSDC, count(catalog.database_count()))?,
    ];
    Ok(Chunk::container(codes::MSRV, children)?)
}

/// `mccr`: the registry table
pub fn content_codes() -> Result<Chunk> {
    let mut children = vec![status()?];
    for entry in registry().entries() {
        children.push(Chunk::container(
            codes::MDCL,
            vec![
                Chunk::new(codes::MCNM, entry.code.as_u32())?,
                Chunk::new(codes::MCNA, entry.name)?,
                Chunk::new(codes::MCTY, entry.value_type.wire_id())?,
            ],
        )?);
    }
    Ok(Chunk::container(codes::MCCR, children)?)
}

/// `mlog`
pub fn login(session_id: u32) -> Result<Chunk> {
    Ok(Chunk::container(
        codes::MLOG,
        vec![status()?, Chunk::new(codes::MLID, session_id)?],
    )?)
}

/// `mupd`
pub fn update(revision: u32) -> Result<Chunk> {
    Ok(Chunk::container(
        codes::MUPD,
        vec![status()?, Chunk::new(codes::MUSR, revision)?],
    )?)
}

/// `avdb`: the library's databases
pub fn databases(catalog: &Catalog, query: &Query) -> Result<Chunk> {
    let base = delta_base(catalog, query);

    let items = match base {
        Some(base) => catalog.databases_since(base).collect::<Vec<_>>(),
        None => catalog.databases().collect(),
    };
    let listed = items
        .into_iter()
        .map(database_item)
        .collect::<Result<Vec<_>>>()?;

    let deleted = base.map(|base| {
        catalog
            .deleted_databases_since(base)
            .map(|id| id.get())
            .collect::<Vec<_>>()
    });

    listing(codes::AVDB, base, catalog.database_count(), listed, deleted)
}

fn database_item(database: &Database) -> Result<Chunk> {
    Ok(Chunk::container(
        codes::MLIT,
        vec![
            Chunk::new(codes::MIID, database.id().get())?,
            Chunk::new(codes::MPER, database.persistent_id())?,
            Chunk::new(codes::MINM, database.name())?,
            Chunk::new(codes::MIMC, count(database.song_count()))?,
            Chunk::new(codes::MCTC, count(database.playlist_count()))?,
        ],
    )?)
}

/// `adbs`: songs of one database
pub fn database_items(catalog: &Catalog, database: DatabaseId, query: &Query) -> Result<Chunk> {
    let db = find_database(catalog, database)?;
    let base = delta_base(catalog, query);

    let listed = match base {
        Some(base) => db
            .songs_since(base)
            .map(|e| song_item(&e.song, None, &query.meta))
            .collect::<Result<Vec<_>>>()?,
        None => db
            .songs()
            .map(|e| song_item(&e.song, None, &query.meta))
            .collect::<Result<Vec<_>>>()?,
    };

    let deleted = base.map(|base| {
        db.deleted_songs_since(base)
            .map(|id| id.get())
            .collect::<Vec<_>>()
    });

    listing(codes::ADBS, base, db.song_count(), listed, deleted)
}

/// `aply`: playlists of one database, master first
pub fn containers(catalog: &Catalog, database: DatabaseId, query: &Query) -> Result<Chunk> {
    let db = find_database(catalog, database)?;
    let base = delta_base(catalog, query);

    let items = match base {
        Some(base) => db.playlists_since(base).collect::<Vec<_>>(),
        None => db.playlists().collect(),
    };
    let listed = items
        .into_iter()
        .map(|p| playlist_item(db, p))
        .collect::<Result<Vec<_>>>()?;

    let deleted = base.map(|base| {
        db.deleted_playlists_since(base)
            .map(|id| id.get())
            .collect::<Vec<_>>()
    });

    listing(codes::APLY, base, db.playlist_count(), listed, deleted)
}

fn playlist_item(database: &Database, playlist: &Playlist) -> Result<Chunk> {
    let mut children = vec![
        Chunk::new(codes::MIID, playlist.id().get())?,
        Chunk::new(codes::MPER, playlist.persistent_id())?,
        Chunk::new(codes::MINM, playlist.name())?,
        Chunk::new(codes::MIMC, count(playlist.len()))?,
    ];
    if playlist.is_master() {
        children.push(Chunk::new(codes::ABPL, true)?);
    } else {
        children.push(Chunk::new(codes::MPCO, database.master_id().get())?);
    }
    if playlist.flag(PlaylistFlag::Smart) {
        children.push(Chunk::new(codes::AESP, true)?);
    }
    if playlist.flag(PlaylistFlag::Podcast) {
        children.push(Chunk::new(codes::AEPP, true)?);
    }
    Ok(Chunk::container(codes::MLIT, children)?)
}

/// `apso`: songs of one playlist
pub fn container_items(
    catalog: &Catalog,
    database: DatabaseId,
    playlist: PlaylistId,
    query: &Query,
) -> Result<Chunk> {
    let db = find_database(catalog, database)?;
    let pl = db.playlist(playlist).ok_or_else(|| {
        ServerError::NotFound(format!("playlist {} in database {}", playlist, database))
    })?;
    let base = delta_base(catalog, query);

    let mut listed = Vec::new();
    for entry in pl.entries() {
        let Some(song) = db.song_entry(entry.song) else {
            continue;
        };
        let changed = match base {
            Some(base) => entry.revision > base || song.revision > base,
            None => true,
        };
        if changed {
            listed.push(song_item(&song.song, Some(entry.song.get()), &query.meta)?);
        }
    }

    let deleted = base.map(|base| pl.removed_since(base).map(|id| id.get()).collect::<Vec<_>>());

    listing(codes::APSO, base, pl.len(), listed, deleted)
}

fn song_item(song: &Song, container_item: Option<u32>, meta: &Meta) -> Result<Chunk> {
    let mut children = vec![
        Chunk::new(codes::MIKD, ITEM_KIND_AUDIO)?,
        Chunk::new(codes::MIID, song.id().get())?,
    ];
    if let Some(id) = container_item {
        children.push(Chunk::new(codes::MCTI, id)?);
    }
    if meta.includes(entry_name(codes::MPER)) {
        children.push(Chunk::new(codes::MPER, song.persistent_id())?);
    }
    for (field, value) in song.attributes() {
        if selected(meta, field) {
            children.push(Chunk::new(field.code(), value.clone())?);
        }
    }
    Ok(Chunk::container(codes::MLIT, children)?)
}

/// Attributes listed for a song; the name is always sent unless a meta list
/// leaves it out
fn selected(meta: &Meta, field: SongField) -> bool {
    match meta {
        Meta::Basic => field == SongField::Name,
        _ => meta.includes(entry_name(field.code())),
    }
}

fn entry_name(code: ContentCode) -> &'static str {
    registry().get(code).map_or("", |e| e.name)
}

/// Delta base for a request, when the client asked for one that can be served
fn delta_base(catalog: &Catalog, query: &Query) -> Option<u32> {
    query
        .delta
        .filter(|&delta| delta > 0 && delta <= catalog.revision())
}

fn listing(
    code: ContentCode,
    base: Option<u32>,
    total: usize,
    items: Vec<Chunk>,
    deleted: Option<Vec<u32>>,
) -> Result<Chunk> {
    let update_type = if base.is_some() {
        UPDATE_DELTA
    } else {
        UPDATE_FULL
    };

    let mut children = vec![
        status()?,
        Chunk::new(codes::MUTY, update_type)?,
        Chunk::new(codes::MTCO, count(total))?,
        Chunk::new(codes::MRCO, count(items.len()))?,
        Chunk::container(codes::MLCL, items)?,
    ];

    if let Some(deleted) = deleted {
        let ids = deleted
            .into_iter()
            .map(|id| Chunk::new(codes::MIID, id))
            .collect::<tuneshare_dmap::Result<Vec<_>>>()?;
        children.push(Chunk::container(codes::MUDL, ids)?);
    }

    Ok(Chunk::container(code, children)?)
}

fn find_database(catalog: &Catalog, id: DatabaseId) -> Result<&Database> {
    catalog
        .database(id)
        .ok_or_else(|| ServerError::NotFound(format!("database {}", id)))
}

fn status() -> Result<Chunk> {
    Ok(Chunk::new(codes::MSTT, STATUS_OK)?)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
