//! Request framing and classification
//!
//! `RequestCodec` frames HTTP/1.1 request heads off the socket into
//! `http::Request<()>` values; `DaapRequest` classifies one by path and
//! pulls out the query parameters and headers the protocol uses.

use crate::error::{Result, ServerError};
use bytes::BytesMut;
use http::{header, HeaderName, HeaderValue, Method, Request, Uri, Version as HttpVersion};
use tokio_util::codec::Decoder;
use tuneshare_catalog::{DatabaseId, PlaylistId, SongId};
use tuneshare_dmap::Version;

/// Largest accepted request head
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Protocol version assumed when a client sends no `Client-DAAP-Version`
pub const DEFAULT_CLIENT_VERSION: Version = Version::new(3, 0, 0);

const CLIENT_VERSION: &str = "client-daap-version";

/// Frames request heads; bodies are not supported (GET only)
#[derive(Debug, Default)]
pub struct RequestCodec;

impl Decoder for RequestCodec {
    type Item = Request<()>;
    type Error = ServerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(end) = find_head_end(src) else {
            if src.len() > MAX_HEAD_LEN {
                return Err(ServerError::Protocol(format!(
                    "Request head exceeds {} bytes",
                    MAX_HEAD_LEN
                )));
            }
            return Ok(None);
        };
        if end > MAX_HEAD_LEN {
            return Err(ServerError::Protocol(format!(
                "Request head exceeds {} bytes",
                MAX_HEAD_LEN
            )));
        }

        let head = src.split_to(end + 4);
        let text = std::str::from_utf8(&head[..end])
            .map_err(|_| ServerError::Protocol("Request head is not UTF-8".to_string()))?;
        parse_head(text).map(Some)
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(text: &str) -> Result<Request<()>> {
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ServerError::Protocol(format!(
            "Malformed request line: {:?}",
            request_line
        )));
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| ServerError::Protocol(format!("Invalid method: {}", method)))?;
    if method != Method::GET {
        return Err(ServerError::Protocol(format!("Unsupported method: {}", method)));
    }

    let version = match version {
        "HTTP/1.1" => HttpVersion::HTTP_11,
        "HTTP/1.0" => HttpVersion::HTTP_10,
        other => {
            return Err(ServerError::Protocol(format!("Unsupported version: {}", other)));
        }
    };

    let uri: Uri = target
        .parse()
        .map_err(|_| ServerError::Protocol(format!("Invalid request target: {}", target)))?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .version(version)
        .body(())
        .map_err(|e| ServerError::Protocol(e.to_string()))?;

    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ServerError::Protocol(format!("Malformed header: {:?}", line)))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| ServerError::Protocol(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| ServerError::Protocol(format!("Invalid value for header {}", name)))?;
        request.headers_mut().append(name, value);
    }

    Ok(request)
}

/// What a request asks for, by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    ServerInfo,
    ContentCodes,
    Login,
    Logout,
    Update,
    Databases,
    DatabaseItems {
        database: DatabaseId,
    },
    DatabaseContainers {
        database: DatabaseId,
    },
    ContainerItems {
        database: DatabaseId,
        playlist: PlaylistId,
    },
    SongData {
        database: DatabaseId,
        song: SongId,
        format: String,
    },
    Unknown,
}

impl RequestKind {
    pub fn from_path(path: &str) -> Self {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["server-info"] => RequestKind::ServerInfo,
            ["content-codes"] => RequestKind::ContentCodes,
            ["login"] => RequestKind::Login,
            ["logout"] => RequestKind::Logout,
            ["update"] => RequestKind::Update,
            ["databases"] => RequestKind::Databases,
            ["databases", db, "items"] => match parse_id(db) {
                Some(id) => RequestKind::DatabaseItems {
                    database: DatabaseId::new(id),
                },
                None => RequestKind::Unknown,
            },
            ["databases", db, "containers"] => match parse_id(db) {
                Some(id) => RequestKind::DatabaseContainers {
                    database: DatabaseId::new(id),
                },
                None => RequestKind::Unknown,
            },
            ["databases", db, "containers", pl, "items"] => match (parse_id(db), parse_id(pl)) {
                (Some(db), Some(pl)) => RequestKind::ContainerItems {
                    database: DatabaseId::new(db),
                    playlist: PlaylistId::new(pl),
                },
                _ => RequestKind::Unknown,
            },
            ["databases", db, "items", file] => {
                let Some((song, format)) = file.split_once('.') else {
                    return RequestKind::Unknown;
                };
                match (parse_id(db), parse_id(song)) {
                    (Some(db), Some(song)) => RequestKind::SongData {
                        database: DatabaseId::new(db),
                        song: SongId::new(song),
                        format: format.to_string(),
                    },
                    _ => RequestKind::Unknown,
                }
            }
            _ => RequestKind::Unknown,
        }
    }

    /// Requests allowed after login without the session's id
    pub fn is_session_exempt(&self) -> bool {
        matches!(self, RequestKind::ContentCodes | RequestKind::Login)
    }
}

fn parse_id(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Attribute selection from the `meta` parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Meta {
    /// Only identifying fields
    #[default]
    Basic,
    All,
    Names(Vec<String>),
}

impl Meta {
    fn parse(value: &str) -> Self {
        if value == "all" {
            return Meta::All;
        }
        Meta::Names(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether the attribute with this semantic name is selected
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Meta::Basic => false,
            Meta::All => true,
            Meta::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Query parameters the protocol uses; others are ignored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub session_id: Option<u32>,
    pub revision: Option<u32>,
    pub delta: Option<u32>,
    pub meta: Meta,
}

impl Query {
    pub fn parse(query: Option<&str>) -> Self {
        let mut parsed = Query::default();
        let Some(query) = query else {
            return parsed;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "session-id" => parsed.session_id = value.parse().ok(),
                "revision-number" => parsed.revision = value.parse().ok(),
                "delta" => parsed.delta = value.parse().ok(),
                "meta" => parsed.meta = Meta::parse(&value),
                _ => {}
            }
        }
        parsed
    }
}

/// A classified request
#[derive(Debug, Clone)]
pub struct DaapRequest {
    pub kind: RequestKind,
    pub query: Query,
    /// Path and query as sent, for digest verification
    pub target: String,
    pub client_version: Option<Version>,
    pub authorization: Option<String>,
    /// Start offset from `Range: bytes=N-`
    pub range: Option<ByteRange>,
}

impl DaapRequest {
    pub fn from_http(request: &Request<()>) -> Self {
        let uri = request.uri();
        let headers = request.headers();
        let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        Self {
            kind: RequestKind::from_path(uri.path()),
            query: Query::parse(uri.query()),
            target: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string()),
            client_version: header_str(CLIENT_VERSION).and_then(Version::parse),
            authorization: header_str(header::AUTHORIZATION.as_str()).map(str::to_string),
            range: header_str(header::RANGE.as_str()).and_then(ByteRange::parse),
        }
    }
}

/// Requested byte range; `end` is inclusive when present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse `bytes=start-` or `bytes=start-end`
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim().strip_prefix("bytes=")?;
        let (start, end) = range.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = match end.trim() {
            "" => None,
            end => Some(end.parse().ok()?),
        };
        match end {
            Some(end) if end < start => None,
            _ => Some(Self { start, end }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Request<()>> {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(request) = codec.decode(&mut buf).unwrap() {
            out.push(request);
        }
        out
    }

    #[test]
    fn decodes_pipelined_requests() {
        let requests = decode_all(
            b"GET /server-info HTTP/1.1\r\nHost: x\r\nClient-DAAP-Version: 3.0\r\n\r\n\
              GET /login HTTP/1.1\r\n\r\n",
        );
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].uri().path(), "/server-info");
        assert_eq!(requests[0].headers()["client-daap-version"], "3.0");
        assert_eq!(requests[1].uri().path(), "/login");
    }

    #[test]
    fn waits_for_complete_head() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&b"GET /login HTTP/1.1\r\nHost"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b": x\r\n\r\n");
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_other_methods() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&b"POST /login HTTP/1.1\r\n\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_oversized_heads() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&b"GET /login HTTP/1.1\r\n"[..]);
        buf.extend_from_slice(&vec![b'a'; MAX_HEAD_LEN]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn classifies_paths() {
        assert_eq!(RequestKind::from_path("/server-info"), RequestKind::ServerInfo);
        assert_eq!(RequestKind::from_path("/databases"), RequestKind::Databases);
        assert_eq!(
            RequestKind::from_path("/databases/3/items"),
            RequestKind::DatabaseItems {
                database: DatabaseId::new(3)
            }
        );
        assert_eq!(
            RequestKind::from_path("/databases/3/containers/9/items"),
            RequestKind::ContainerItems {
                database: DatabaseId::new(3),
                playlist: PlaylistId::new(9)
            }
        );
        assert_eq!(
            RequestKind::from_path("/databases/3/items/41.mp3"),
            RequestKind::SongData {
                database: DatabaseId::new(3),
                song: SongId::new(41),
                format: "mp3".to_string()
            }
        );
        assert_eq!(RequestKind::from_path("/databases/x/items"), RequestKind::Unknown);
        assert_eq!(RequestKind::from_path("/favicon.ico"), RequestKind::Unknown);
    }

    #[test]
    fn parses_query_parameters() {
        let query = Query::parse(Some(
            "session-id=77&revision-number=4&delta=2&meta=dmap.itemid%2Cdaap.songartist&type=music",
        ));
        assert_eq!(query.session_id, Some(77));
        assert_eq!(query.revision, Some(4));
        assert_eq!(query.delta, Some(2));
        assert!(query.meta.includes("daap.songartist"));
        assert!(!query.meta.includes("daap.songalbum"));

        assert_eq!(Query::parse(Some("meta=all")).meta, Meta::All);
        assert_eq!(Query::parse(None), Query::default());
    }

    #[test]
    fn extracts_headers() {
        let request = Request::builder()
            .uri("/databases/1/items/2.mp3?session-id=5")
            .header("Client-DAAP-Version", "3.0")
            .header("Range", "bytes=100-")
            .header("Authorization", "Basic eDp5")
            .body(())
            .unwrap();
        let parsed = DaapRequest::from_http(&request);
        assert_eq!(parsed.client_version, Some(Version::new(3, 0, 0)));
        assert_eq!(parsed.range, Some(ByteRange { start: 100, end: None }));
        assert_eq!(parsed.authorization.as_deref(), Some("Basic eDp5"));
        assert_eq!(parsed.target, "/databases/1/items/2.mp3?session-id=5");
        assert_eq!(parsed.query.session_id, Some(5));
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(
            ByteRange::parse("bytes=0-999"),
            Some(ByteRange { start: 0, end: Some(999) })
        );
        assert_eq!(
            ByteRange::parse("bytes=1000-"),
            Some(ByteRange { start: 1000, end: None })
        );
        assert_eq!(ByteRange::parse("bytes=10-5"), None);
        assert_eq!(ByteRange::parse("invalid"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_input_never_panics(input in proptest::collection::vec(any::<u8>(), 0..512)) {
                let mut codec = RequestCodec;
                let mut buf = BytesMut::from(&input[..]);
                let _ = codec.decode(&mut buf);
            }

            #[test]
            fn ranges_parse_their_bounds(start in 0u64..1 << 40, len in proptest::option::of(0u64..1 << 20)) {
                let header = match len {
                    Some(len) => format!("bytes={}-{}", start, start + len),
                    None => format!("bytes={}-", start),
                };
                let range = ByteRange::parse(&header).unwrap();
                prop_assert_eq!(range.start, start);
                prop_assert_eq!(range.end, len.map(|len| start + len));
            }
        }
    }
}
