/// Update and delta tests
/// Tests long-poll parking, old-style polling and delta listings
mod common;

use common::{deleted_ids, listed_ids, TestServer};
use std::time::Duration;
use tuneshare_catalog::{Mutate, Song};
use tuneshare_dmap::codes;

/// Test an update from revision 0 is answered at once with the current revision
#[tokio::test]
async fn test_update_reports_current_revision() {
    let server = TestServer::start().await;
    let (mut client, session) = server.logged_in_client().await;

    let update = client
        .get(&format!("/update?session-id={session}&revision-number=0"))
        .await
        .unwrap();
    let chunk = update.chunk();
    assert_eq!(chunk.code(), codes::MUPD);
    assert_eq!(chunk.child_u64(codes::MUSR), Some(server.library.revision() as u64));
}

/// Test a long-poll update parks until a commit, answers exactly once, and the
/// following delta request lists only what changed
#[tokio::test]
async fn test_long_poll_deferred_until_commit() {
    let server = TestServer::start().await;
    let (mut client, session) = server.logged_in_client().await;
    let db = server.fixtures.database;
    let current = server.library.revision();

    client
        .send(&format!("/update?session-id={session}&revision-number={current}"), &[])
        .await;
    assert!(client.is_quiet().await, "Update should be parked");

    let mut tx = server.library.transaction();
    tx.set_song_name(server.fixtures.other_song, "Renamed").unwrap();
    let added = tx.add_song(db, Song::new("New")).unwrap();
    tx.remove_song(db, server.fixtures.long_song).unwrap();
    tx.commit().unwrap();

    let update = client.read_response().await.unwrap();
    assert_eq!(update.status, 200);
    assert_eq!(
        update.chunk().child_u64(codes::MUSR),
        Some(current as u64 + 1)
    );
    assert!(client.is_quiet().await, "Exactly one response per update");

    let delta = client
        .get(&format!(
            "/databases/{db}/items?session-id={session}&revision-number={}&delta={current}",
            current + 1
        ))
        .await
        .unwrap();
    let chunk = delta.chunk();
    assert_eq!(chunk.child_u64(codes::MUTY), Some(1));
    assert_eq!(
        listed_ids(&chunk),
        vec![server.fixtures.other_song.get(), added.get()]
    );
    assert_eq!(deleted_ids(&chunk), vec![server.fixtures.long_song.get()]);
}

/// Test a commit that changes nothing does not wake a parked update
#[tokio::test]
async fn test_noop_commit_keeps_update_parked() {
    let server = TestServer::start().await;
    let (mut client, session) = server.logged_in_client().await;
    let current = server.library.revision();

    client
        .send(&format!("/update?session-id={session}&revision-number={current}"), &[])
        .await;

    let mut tx = server.library.transaction();
    tx.set_song_name(server.fixtures.short_song, "Short").unwrap();
    tx.commit().unwrap();

    assert_eq!(server.library.revision(), current);
    assert!(client.is_quiet().await);
}

/// Test old-style clients get 204 at once when up to date
#[tokio::test]
async fn test_old_style_update_is_immediate() {
    let server = TestServer::start().await;
    let mut client = server.client().await;
    client
        .request("/server-info", &[("Client-DAAP-Version", "2.0")])
        .await
        .unwrap();
    let login = client.get("/login").await.unwrap();
    let session = login.chunk().child_u64(codes::MLID).unwrap();
    let current = server.library.revision();

    let update = client
        .get(&format!("/update?session-id={session}&revision-number={current}"))
        .await
        .unwrap();
    assert_eq!(update.status, 204);
}

/// Test a parked update answers 204 when the idle timeout elapses
#[tokio::test]
async fn test_parked_update_times_out() {
    let server = TestServer::start_with(|c| c.server.idle_timeout_secs = 1).await;
    let (mut client, session) = server.logged_in_client().await;
    let current = server.library.revision();

    client
        .send(&format!("/update?session-id={session}&revision-number={current}"), &[])
        .await;

    let update = tokio::time::timeout(Duration::from_secs(5), client.read_response())
        .await
        .expect("update should time out")
        .unwrap();
    assert_eq!(update.status, 204);
}

/// Test reported revisions never go backwards for a session
#[tokio::test]
async fn test_revisions_never_regress() {
    let server = TestServer::start().await;
    let (mut client, session) = server.logged_in_client().await;
    let db = server.fixtures.database;

    for name in ["One", "Two", "Three"] {
        let mut tx = server.library.transaction();
        tx.add_song(db, Song::new(name)).unwrap();
        tx.commit().unwrap();
    }

    let first = client
        .get(&format!("/update?session-id={session}&revision-number=1"))
        .await
        .unwrap();
    let reported = first.chunk().child_u64(codes::MUSR).unwrap();
    assert_eq!(reported, server.library.revision() as u64);

    let again = client
        .get(&format!("/update?session-id={session}&revision-number=1"))
        .await
        .unwrap();
    assert!(again.chunk().child_u64(codes::MUSR).unwrap() >= reported);
}

/// Test a container delta lists added members and removed ones
#[tokio::test]
async fn test_container_items_delta() {
    let server = TestServer::start().await;
    let (mut client, session) = server.logged_in_client().await;
    let db = server.fixtures.database;
    let master = server
        .library
        .snapshot()
        .database(db)
        .map(|d| d.master_id())
        .unwrap();
    let base = server.library.revision();

    let mut tx = server.library.transaction();
    tx.remove_song(db, server.fixtures.short_song).unwrap();
    let added = tx.add_song(db, Song::new("Fresh")).unwrap();
    tx.commit().unwrap();

    let delta = client
        .get(&format!(
            "/databases/{db}/containers/{master}/items?session-id={session}&delta={base}"
        ))
        .await
        .unwrap();
    let chunk = delta.chunk();
    assert_eq!(chunk.code(), codes::APSO);
    assert_eq!(listed_ids(&chunk), vec![added.get()]);
    assert_eq!(deleted_ids(&chunk), vec![server.fixtures.short_song.get()]);
}
