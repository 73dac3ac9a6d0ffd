/// Authentication tests
/// Tests Basic and Digest challenges on live connections
mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::TestServer;
use md5::{Digest, Md5};
use tuneshare_dmap::codes;
use tuneshare_server::AuthScheme;

const PASSWORD: &str = "opensesame";

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn param<'a>(header: &'a str, key: &str) -> &'a str {
    let start = header.find(&format!("{key}=\"")).unwrap() + key.len() + 2;
    let len = header[start..].find('"').unwrap();
    &header[start..start + len]
}

/// Test server-info is open while login needs Basic credentials
#[tokio::test]
async fn test_basic_challenge_keeps_connection() {
    let server = TestServer::start_with(|c| {
        c.auth.scheme = AuthScheme::Basic;
        c.auth.password = PASSWORD.to_string();
    })
    .await;
    let mut client = server.client().await;

    let info = client.get("/server-info").await.unwrap();
    let chunk = info.chunk();
    assert_eq!(chunk.child_u64(codes::MSAU), Some(1));
    assert_eq!(chunk.child_u64(codes::MSLR), Some(1));

    let denied = client.get("/login").await.unwrap();
    assert_eq!(denied.status, 401);
    assert_eq!(denied.header("www-authenticate"), Some("Basic realm=\"Tuneshare\""));

    let credentials = format!("Basic {}", STANDARD.encode(format!("itunes:{PASSWORD}")));
    let login = client
        .request("/login", &[("Authorization", credentials.as_str())])
        .await
        .unwrap();
    assert_eq!(login.status, 200);
    assert!(login.chunk().child_u64(codes::MLID).is_some());
}

/// Test a wrong Basic password is challenged again
#[tokio::test]
async fn test_basic_wrong_password() {
    let server = TestServer::start_with(|c| {
        c.auth.scheme = AuthScheme::Basic;
        c.auth.password = PASSWORD.to_string();
    })
    .await;
    let mut client = server.client().await;
    client.get("/server-info").await.unwrap();

    let credentials = format!("Basic {}", STANDARD.encode("itunes:nope"));
    let denied = client
        .request("/login", &[("Authorization", credentials.as_str())])
        .await
        .unwrap();
    assert_eq!(denied.status, 401);
    assert_eq!(server.state.pool.control_count(), 1);
}

/// Test a Digest login answers the server's challenge
#[tokio::test]
async fn test_digest_login() {
    let server = TestServer::start_with(|c| {
        c.auth.scheme = AuthScheme::Digest;
        c.auth.password = PASSWORD.to_string();
        c.auth.realm = "Den".to_string();
    })
    .await;
    let mut client = server.client().await;

    let info = client.get("/server-info").await.unwrap();
    assert_eq!(info.chunk().child_u64(codes::MSAU), Some(2));

    let denied = client.get("/login").await.unwrap();
    assert_eq!(denied.status, 401);
    let challenge = denied.header("www-authenticate").unwrap().to_string();
    assert!(challenge.starts_with("Digest "));
    let nonce = param(&challenge, "nonce");

    let ha1 = md5_hex(&format!("itunes:Den:{PASSWORD}"));
    let ha2 = md5_hex("GET:/login");
    let response = md5_hex(&format!("{ha1}:{nonce}:00000001:0a4f113b:auth:{ha2}"));
    let authorization = format!(
        "Digest username=\"itunes\", realm=\"Den\", nonce=\"{nonce}\", uri=\"/login\", \
         qop=auth, nc=00000001, cnonce=\"0a4f113b\", response=\"{response}\""
    );

    let login = client
        .request("/login", &[("Authorization", authorization.as_str())])
        .await
        .unwrap();
    assert_eq!(login.status, 200);
}

/// Test audio requests need credentials too
#[tokio::test]
async fn test_audio_requires_credentials() {
    let server = TestServer::start_with(|c| {
        c.auth.scheme = AuthScheme::Basic;
        c.auth.password = PASSWORD.to_string();
    })
    .await;
    let credentials = format!("Basic {}", STANDARD.encode(format!("itunes:{PASSWORD}")));
    let mut control = server.client().await;
    control.get("/server-info").await.unwrap();
    let login = control
        .request("/login", &[("Authorization", credentials.as_str())])
        .await
        .unwrap();
    let session = login.chunk().child_u64(codes::MLID).unwrap();

    let db = server.fixtures.database;
    let song = server.fixtures.short_song;
    let target = format!("/databases/{db}/items/{song}.mp3?session-id={session}");

    let mut audio = server.client().await;
    let denied = audio.get(&target).await.unwrap();
    assert_eq!(denied.status, 401);

    let granted = audio
        .request(&target, &[("Authorization", credentials.as_str())])
        .await
        .unwrap();
    assert_eq!(granted.status, 200);
    assert_eq!(granted.body, common::SHORT_SONG);
}
