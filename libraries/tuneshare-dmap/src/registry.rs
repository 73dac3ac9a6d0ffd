//! Content-code registry
//!
//! The registry is a plain versioned table of `(code, semantic name, type)`.
//! Encoded bytes carry only the code and a length, so both the encoder and the
//! decoder consult this table. Adding a field means adding a row here.

use crate::code::{codes::*, ContentCode, ValueType};
use crate::error::{DmapError, Result};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One registry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCodeEntry {
    pub code: ContentCode,
    pub name: &'static str,
    pub value_type: ValueType,
}

const fn entry(code: ContentCode, name: &'static str, value_type: ValueType) -> ContentCodeEntry {
    ContentCodeEntry {
        code,
        name,
        value_type,
    }
}

/// Registry table version, bumped whenever rows are added or retyped
pub const REGISTRY_VERSION: u32 = 3;

use crate::code::ValueType::{Boolean, Container, Date, String as Str, Version, I8, U16, U32, U64, U8};

/// The registered content codes
pub static ENTRIES: &[ContentCodeEntry] = &[
    // dmap
    entry(MDCL, "dmap.dictionary", Container),
    entry(MSTT, "dmap.status", U32),
    entry(MIID, "dmap.itemid", U32),
    entry(MINM, "dmap.itemname", Str),
    entry(MIKD, "dmap.itemkind", U8),
    entry(MPER, "dmap.persistentid", U64),
    entry(MCON, "dmap.container", Container),
    entry(MCTI, "dmap.containeritemid", U32),
    entry(MPCO, "dmap.parentcontainerid", U32),
    entry(MSTS, "dmap.statusstring", Str),
    entry(MIMC, "dmap.itemcount", U32),
    entry(MCTC, "dmap.containercount", U32),
    entry(MRCO, "dmap.returnedcount", U32),
    entry(MTCO, "dmap.specifiedtotalcount", U32),
    entry(MLCL, "dmap.listing", Container),
    entry(MLIT, "dmap.listingitem", Container),
    entry(MBCL, "dmap.bag", Container),
    entry(MSRV, "dmap.serverinforesponse", Container),
    entry(MSAU, "dmap.authenticationmethod", U8),
    entry(MSLR, "dmap.loginrequired", Boolean),
    entry(MPRO, "dmap.protocolversion", Version),
    entry(MSAL, "dmap.supportsautologout", Boolean),
    entry(MSUP, "dmap.supportsupdate", Boolean),
    entry(MSPI, "dmap.supportspersistentids", Boolean),
    entry(MSEX, "dmap.supportsextensions", Boolean),
    entry(MSBR, "dmap.supportsbrowse", Boolean),
    entry(MSQY, "dmap.supportsquery", Boolean),
    entry(MSIX, "dmap.supportsindex", Boolean),
    entry(MSRS, "dmap.supportsresolve", Boolean),
    entry(MSTM, "dmap.timeoutinterval", U32),
    entry(MSDC, "dmap.databasescount", U32),
    entry(MCCR, "dmap.contentcodesresponse", Container),
    entry(MCNM, "dmap.contentcodesnumber", U32),
    entry(MCNA, "dmap.contentcodesname", Str),
    entry(MCTY, "dmap.contentcodestype", U16),
    entry(MLOG, "dmap.loginresponse", Container),
    entry(MLID, "dmap.sessionid", U32),
    entry(MUPD, "dmap.updateresponse", Container),
    entry(MUSR, "dmap.serverrevision", U32),
    entry(MUTY, "dmap.updatetype", U8),
    entry(MUDL, "dmap.deletedidlisting", Container),
    // daap
    entry(APRO, "daap.protocolversion", Version),
    entry(AVDB, "daap.serverdatabases", Container),
    entry(ADBS, "daap.databasesongs", Container),
    entry(ASAL, "daap.songalbum", Str),
    entry(ASAA, "daap.songalbumartist", Str),
    entry(ASAR, "daap.songartist", Str),
    entry(ASBT, "daap.songbeatsperminute", U16),
    entry(ASBR, "daap.songbitrate", U16),
    entry(ASCM, "daap.songcomment", Str),
    entry(ASCO, "daap.songcompilation", Boolean),
    entry(ASCP, "daap.songcomposer", Str),
    entry(ASDA, "daap.songdateadded", Date),
    entry(ASDM, "daap.songdatemodified", Date),
    entry(ASDC, "daap.songdisccount", U16),
    entry(ASDN, "daap.songdiscnumber", U16),
    entry(ASDB, "daap.songdisabled", Boolean),
    entry(ASEQ, "daap.songeqpreset", Str),
    entry(ASFM, "daap.songformat", Str),
    entry(ASGN, "daap.songgenre", Str),
    entry(ASDT, "daap.songdescription", Str),
    entry(ASRV, "daap.songrelativevolume", I8),
    entry(ASSR, "daap.songsamplerate", U32),
    entry(ASSZ, "daap.songsize", U32),
    entry(ASST, "daap.songstarttime", U32),
    entry(ASSP, "daap.songstoptime", U32),
    entry(ASTM, "daap.songtime", U32),
    entry(ASTC, "daap.songtrackcount", U16),
    entry(ASTN, "daap.songtracknumber", U16),
    entry(ASUR, "daap.songuserrating", U8),
    entry(ASYR, "daap.songyear", U16),
    entry(ASDK, "daap.songdatakind", U8),
    entry(ASUL, "daap.songdataurl", Str),
    entry(ASGR, "daap.songgrouping", Str),
    entry(ASCD, "daap.songcodectype", U32),
    entry(ASCT, "daap.songcategory", Str),
    entry(ASCN, "daap.songcontentdescription", Str),
    entry(ASCR, "daap.songcontentrating", U8),
    entry(ASKY, "daap.songkeywords", Str),
    entry(ASLC, "daap.songlongcontentdescription", Str),
    entry(APLY, "daap.databaseplaylists", Container),
    entry(ABPL, "daap.baseplaylist", Boolean),
    entry(APSO, "daap.playlistsongs", Container),
    // Apple extensions
    entry(AENV, "com.apple.itunes.norm-volume", U32),
    entry(AESP, "com.apple.itunes.smart-playlist", Boolean),
    entry(AEPP, "com.apple.itunes.is-podcast-playlist", Boolean),
    entry(AEPC, "com.apple.itunes.is-podcast", Boolean),
    entry(AEHV, "com.apple.itunes.has-video", Boolean),
    entry(AEMK, "com.apple.itunes.mediakind", U8),
    entry(AESI, "com.apple.itunes.itms-songid", U32),
    entry(AEAI, "com.apple.itunes.itms-artistid", U32),
    entry(AEPI, "com.apple.itunes.itms-playlistid", U32),
    entry(AECI, "com.apple.itunes.itms-composerid", U32),
    entry(AEGI, "com.apple.itunes.itms-genreid", U32),
    entry(AESF, "com.apple.itunes.itms-storefrontid", U32),
];

/// Lookup tables over a registry table
#[derive(Debug)]
pub struct Registry {
    entries: &'static [ContentCodeEntry],
    by_code: HashMap<ContentCode, &'static ContentCodeEntry>,
    by_name: HashMap<&'static str, &'static ContentCodeEntry>,
}

impl Registry {
    /// Build lookup tables, rejecting duplicate codes or names
    pub fn build(entries: &'static [ContentCodeEntry]) -> Result<Self> {
        let mut by_code = HashMap::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for entry in entries {
            if by_code.insert(entry.code, entry).is_some() {
                return Err(DmapError::Registry(format!(
                    "duplicate content code {}",
                    entry.code
                )));
            }
            if by_name.insert(entry.name, entry).is_some() {
                return Err(DmapError::Registry(format!(
                    "duplicate content name {}",
                    entry.name
                )));
            }
        }

        Ok(Self {
            entries,
            by_code,
            by_name,
        })
    }

    /// Look up a code
    pub fn get(&self, code: ContentCode) -> Option<&'static ContentCodeEntry> {
        self.by_code.get(&code).copied()
    }

    /// Look up a semantic name (`daap.songalbum`)
    pub fn by_name(&self, name: &str) -> Option<&'static ContentCodeEntry> {
        self.by_name.get(name).copied()
    }

    /// Look up a code, failing on unregistered codes
    pub fn require(&self, code: ContentCode) -> Result<&'static ContentCodeEntry> {
        self.get(code).ok_or(DmapError::UnknownCode(code))
    }

    /// All rows in table order
    pub fn entries(&self) -> &'static [ContentCodeEntry] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static REGISTRY: OnceLock<std::result::Result<Registry, DmapError>> = OnceLock::new();

fn built() -> &'static std::result::Result<Registry, DmapError> {
    REGISTRY.get_or_init(|| Registry::build(ENTRIES))
}

/// Validate the static table; call once at startup
pub fn validate() -> Result<()> {
    built().as_ref().map(|_| ()).map_err(Clone::clone)
}

/// The process-wide registry
///
/// The static table is covered by `validate` and by unit tests; should it ever
/// be inconsistent, lookups behave as if the table were empty so every
/// encode/decode fails with `UnknownCode` instead of panicking.
pub fn registry() -> &'static Registry {
    static EMPTY: OnceLock<Registry> = OnceLock::new();
    match built() {
        Ok(registry) => registry,
        Err(err) => {
            tracing::error!(error = %err, "content-code registry is invalid");
            EMPTY.get_or_init(|| Registry {
                entries: &[],
                by_code: HashMap::new(),
                by_name: HashMap::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_is_consistent() {
        assert!(validate().is_ok());
        assert_eq!(registry().len(), ENTRIES.len());
    }

    #[test]
    fn lookups_by_code_and_name_agree() {
        let reg = registry();
        let album = reg.by_name("daap.songalbum").unwrap();
        assert_eq!(album.code, ASAL);
        assert_eq!(reg.get(ASAL).unwrap().value_type, ValueType::String);
        assert!(reg.get(ContentCode::new(*b"zzzz")).is_none());
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        static DUPES: &[ContentCodeEntry] = &[
            entry(MSTT, "dmap.status", U32),
            entry(MSTT, "dmap.status2", U32),
        ];
        assert!(matches!(
            Registry::build(DUPES),
            Err(DmapError::Registry(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        static DUPES: &[ContentCodeEntry] = &[
            entry(MSTT, "dmap.status", U32),
            entry(MIID, "dmap.status", U32),
        ];
        assert!(Registry::build(DUPES).is_err());
    }
}
