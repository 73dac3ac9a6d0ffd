//! Response heads and bodies
//!
//! Responses are assembled as a status plus an `http::HeaderMap` and written
//! straight to the connection's buffered writer.

use bytes::Bytes;
use chrono::Utc;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tuneshare_dmap::{encode, Chunk};

pub const DMAP_CONTENT_TYPE: &str = "application/x-dmap-tagged";

const DAAP_SERVER: HeaderName = HeaderName::from_static("daap-server");

/// A complete response with an in-memory body
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// 200 with an encoded DMAP body
    pub fn dmap(chunk: &Chunk) -> Self {
        let body = encode(chunk);
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(DMAP_CONTENT_TYPE));
        Self {
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// 401 carrying an authentication challenge
    pub fn unauthorized(challenge: HeaderValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::WWW_AUTHENTICATE, challenge);
        Self {
            status: StatusCode::UNAUTHORIZED,
            headers,
            body: Bytes::new(),
        }
    }

    /// Mark the connection as ending after this response
    pub fn closing(mut self) -> Self {
        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        self
    }

    /// Write head and body; the caller flushes
    pub async fn write_to<W>(&self, writer: &mut W, server: &HeaderValue) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut headers = self.headers.clone();
        headers
            .entry(header::CONNECTION)
            .or_insert(HeaderValue::from_static("keep-alive"));
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(self.body.len() as u64),
        );
        write_head(writer, self.status, &headers, server).await?;
        writer.write_all(&self.body).await
    }
}

/// Write a status line and headers, adding `Date` and `DAAP-Server`
pub async fn write_head<W>(
    writer: &mut W,
    status: StatusCode,
    headers: &HeaderMap,
    server: &HeaderValue,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    head.push_str(&format!(
        "Date: {}\r\n",
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT")
    ));
    push_header(&mut head, DAAP_SERVER.as_str(), server);
    for (name, value) in headers {
        push_header(&mut head, name.as_str(), value);
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await
}

fn push_header(head: &mut String, name: &str, value: &HeaderValue) {
    if let Ok(value) = value.to_str() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneshare_dmap::codes;

    async fn render(response: &Response) -> String {
        let mut out = Vec::new();
        response
            .write_to(&mut out, &HeaderValue::from_static("Tuneshare/0.1"))
            .await
            .unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn dmap_response_head() {
        let chunk = Chunk::container(codes::MUPD, vec![Chunk::new(codes::MSTT, 200u32).unwrap()])
            .unwrap();
        let text = render(&Response::dmap(&chunk)).await;

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("daap-server: Tuneshare/0.1\r\n"));
        assert!(text.contains("content-type: application/x-dmap-tagged\r\n"));
        assert!(text.contains(&format!("content-length: {}\r\n", chunk.encoded_len())));
        assert!(text.contains("Date: "));
        assert!(text.contains("connection: keep-alive\r\n"));
    }

    #[tokio::test]
    async fn closing_response_says_close() {
        let text = render(&Response::no_content().closing()).await;
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(!text.contains("keep-alive"));
    }

    #[tokio::test]
    async fn unauthorized_carries_challenge() {
        let response = Response::unauthorized(HeaderValue::from_static("Basic realm=\"x\""));
        let text = render(&response).await;
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("www-authenticate: Basic realm=\"x\"\r\n"));
        assert!(text.ends_with("content-length: 0\r\n\r\n"));
    }
}
