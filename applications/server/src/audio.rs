//! Audio transfer
//!
//! Writes one song's bytes to an AUDIO connection, whole or from a range
//! start. Bytes go through the connection's buffered writer and are flushed
//! once at the end.

use crate::error::Result;
use crate::protocol::request::ByteRange;
use crate::protocol::response::write_head;
use crate::services::SongStream;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tuneshare_dmap::Version;

/// Clients below this version get 200 for ranged requests
pub const RANGE_VERSION: Version = Version::new(3, 0, 0);

/// Byte span selected for a transfer, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl Span {
    pub fn new(range: Option<ByteRange>, total: u64) -> Self {
        let start = range.map_or(0, |r| r.start);
        let end = range
            .and_then(|r| r.end)
            .map_or(total, |end| end.saturating_add(1).min(total));
        Self {
            start,
            end: end.max(start.min(total)),
            total,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the response is partial for a client speaking `version`
    pub fn is_partial(&self, version: Version) -> bool {
        self.start > 0 && version >= RANGE_VERSION
    }

    fn content_range(&self) -> String {
        if self.start >= self.total {
            format!("bytes */{}", self.total)
        } else {
            format!("bytes {}-{}/{}", self.start, self.end - 1, self.total)
        }
    }
}

/// Send a song opened at `span.start`; returns the number of body bytes written
pub async fn send_song<W>(
    writer: &mut W,
    stream: SongStream,
    span: Span,
    version: Version,
    server: &HeaderValue,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let partial = span.is_partial(version);
    let status = if partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&stream.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(span.len()));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if partial {
        if let Ok(value) = HeaderValue::from_str(&span.content_range()) {
            headers.insert(header::CONTENT_RANGE, value);
        }
    }
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    write_head(writer, status, &headers, server).await?;

    let mut body = stream.reader.take(span.len());
    let sent = tokio::io::copy(&mut body, writer).await?;
    writer.flush().await?;

    tracing::debug!(
        start = span.start,
        sent,
        total = span.total,
        partial,
        "Song transfer finished"
    );
    Ok(sent)
}
