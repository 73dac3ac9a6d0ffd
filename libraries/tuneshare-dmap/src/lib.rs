//! Tuneshare DMAP codec
//!
//! Encoding and decoding of the DMAP tagged binary format used by DAAP.
//!
//! # Architecture
//!
//! - **Registry**: a static, versioned table mapping each 4-byte content code
//!   to its semantic name and value type
//! - **Chunk**: one generic value node (code + [`Value`]) validated against the
//!   registry on construction
//! - **Wire**: `encode`/`decode`, exact inverses for registered codes
//! - **Codec**: a `tokio_util` framing codec for streams of chunks
//!
//! # Example
//!
//! ```rust
//! use tuneshare_dmap::{codes, decode, encode, Chunk};
//!
//! let update = Chunk::container(
//!     codes::MUPD,
//!     vec![
//!         Chunk::new(codes::MSTT, 200u32)?,
//!         Chunk::new(codes::MUSR, 42u32)?,
//!     ],
//! )?;
//!
//! let bytes = encode(&update);
//! assert_eq!(decode(&bytes)?, update);
//! # Ok::<(), tuneshare_dmap::DmapError>(())
//! ```

#![forbid(unsafe_code)]

pub mod chunk;
pub mod code;
pub mod codec;
pub mod error;
pub mod registry;
pub mod value;
pub mod wire;

pub use chunk::Chunk;
pub use code::{codes, ContentCode, ValueType};
pub use codec::ChunkCodec;
pub use error::{DmapError, Result};
pub use registry::{registry, ContentCodeEntry, Registry};
pub use value::{Value, Version};
pub use wire::{decode, decode_prefix, encode, encode_into};
