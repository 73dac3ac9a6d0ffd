//! Identifiers for catalog entities
//!
//! Item ids are the 32-bit `dmap.itemid` values clients see; they are handed
//! out from process-wide counters so ids never collide across libraries.
//! Persistent ids are random 64-bit `dmap.persistentid` values.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! item_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        static $counter: AtomicU32 = AtomicU32::new(1);

        impl $name {
            /// Wrap a raw id (ids parsed from request paths)
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Allocate the next unused id
            pub fn generate() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

item_id!(
    /// Database identifier
    DatabaseId,
    NEXT_DATABASE_ID
);
item_id!(
    /// Playlist identifier
    PlaylistId,
    NEXT_PLAYLIST_ID
);
item_id!(
    /// Song identifier
    SongId,
    NEXT_SONG_ID
);

/// Random persistent id
pub(crate) fn persistent_id() -> u64 {
    rand::random()
}
