//! Content codes and value types

use std::fmt;
use std::str::FromStr;

/// Four-byte identifier naming a protocol field (`mstt`, `minm`, ...)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentCode([u8; 4]);

impl ContentCode {
    /// Create a content code from its four ASCII bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Content code as packed big-endian integer (used by `mcnm`)
    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Content code from a packed big-endian integer
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Raw bytes
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ContentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ContentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentCode({})", self)
    }
}

impl FromStr for ContentCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("content code must be 4 bytes: {s:?}"))?;
        if !bytes.iter().all(u8::is_ascii) {
            return Err(format!("content code must be ASCII: {s:?}"));
        }
        Ok(Self(bytes))
    }
}

/// Value type bound to a content code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    String,
    /// POSIX seconds, 4 bytes
    Date,
    /// major.minor.patch, 3 bytes
    Version,
    /// 1 byte
    Boolean,
    Container,
}

impl ValueType {
    /// Payload width for fixed-width types, `None` for strings and containers
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::U8 | ValueType::I8 | ValueType::Boolean => Some(1),
            ValueType::U16 | ValueType::I16 => Some(2),
            ValueType::U32 | ValueType::I32 | ValueType::Date => Some(4),
            ValueType::U64 | ValueType::I64 => Some(8),
            ValueType::Version => Some(3),
            ValueType::String | ValueType::Container => None,
        }
    }

    /// Type number reported in the content-codes response (`mcty`)
    pub const fn wire_id(self) -> u16 {
        match self {
            ValueType::U8 | ValueType::Boolean => 1,
            ValueType::I8 => 2,
            ValueType::U16 => 3,
            ValueType::I16 => 4,
            ValueType::U32 => 5,
            ValueType::I32 => 6,
            ValueType::U64 => 7,
            ValueType::I64 => 8,
            ValueType::String => 9,
            ValueType::Date => 10,
            ValueType::Version => 11,
            ValueType::Container => 12,
        }
    }
}

/// Named constants for every registered content code
pub mod codes {
    use super::ContentCode;

    macro_rules! codes {
        ($($name:ident = $code:literal;)*) => {
            $(pub const $name: ContentCode = ContentCode::new(*$code);)*
        };
    }

    codes! {
        MDCL = b"mdcl";
        MSTT = b"mstt";
        MIID = b"miid";
        MINM = b"minm";
        MIKD = b"mikd";
        MPER = b"mper";
        MCON = b"mcon";
        MCTI = b"mcti";
        MPCO = b"mpco";
        MSTS = b"msts";
        MIMC = b"mimc";
        MCTC = b"mctc";
        MRCO = b"mrco";
        MTCO = b"mtco";
        MLCL = b"mlcl";
        MLIT = b"mlit";
        MBCL = b"mbcl";
        MSRV = b"msrv";
        MSAU = b"msau";
        MSLR = b"mslr";
        MPRO = b"mpro";
        MSAL = b"msal";
        MSUP = b"msup";
        MSPI = b"mspi";
        MSEX = b"msex";
        MSBR = b"msbr";
        MSQY = b"msqy";
        MSIX = b"msix";
        MSRS = b"msrs";
        MSTM = b"mstm";
        MSDC = b"msdc";
        MCCR = b"mccr";
        MCNM = b"mcnm";
        MCNA = b"mcna";
        MCTY = b"mcty";
        MLOG = b"mlog";
        MLID = b"mlid";
        MUPD = b"mupd";
        MUSR = b"musr";
        MUTY = b"muty";
        MUDL = b"mudl";

        APRO = b"apro";
        AVDB = b"avdb";
        ADBS = b"adbs";
        ASAL = b"asal";
        ASAA = b"asaa";
        ASAR = b"asar";
        ASBT = b"asbt";
        ASBR = b"asbr";
        ASCM = b"ascm";
        ASCO = b"asco";
        ASCP = b"ascp";
        ASDA = b"asda";
        ASDM = b"asdm";
        ASDC = b"asdc";
        ASDN = b"asdn";
        ASDB = b"asdb";
        ASEQ = b"aseq";
        ASFM = b"asfm";
        ASGN = b"asgn";
        ASDT = b"asdt";
        ASRV = b"asrv";
        ASSR = b"assr";
        ASSZ = b"assz";
        ASST = b"asst";
        ASSP = b"assp";
        ASTM = b"astm";
        ASTC = b"astc";
        ASTN = b"astn";
        ASUR = b"asur";
        ASYR = b"asyr";
        ASDK = b"asdk";
        ASUL = b"asul";
        ASGR = b"asgr";
        ASCD = b"ascd";
        ASCT = b"asct";
        ASCN = b"ascn";
        ASCR = b"ascr";
        ASKY = b"asky";
        ASLC = b"aslc";
        APLY = b"aply";
        ABPL = b"abpl";
        APSO = b"apso";
        AENV = b"aeNV";
        AESP = b"aeSP";
        AEPP = b"aePP";
        AEPC = b"aePC";
        AEHV = b"aeHV";
        AEMK = b"aeMK";
        AESI = b"aeSI";
        AEAI = b"aeAI";
        AEPI = b"aePI";
        AECI = b"aeCI";
        AEGI = b"aeGI";
        AESF = b"aeSF";
    }
}
