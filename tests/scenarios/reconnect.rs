//! Reconnect scenario tests
//!
//! Dropping out of a room, resuming the seat, and forfeiting when gone too long

use std::time::Duration;

use crate::harness::TestServer;

/// Test: a player who stays away past the grace period forfeits
#[tokio::test]
async fn test_disconnect_forfeits_after_grace() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    a.ready().await.expect("ready");
    b.ready().await.expect("ready");
    a.expect_state(|s| !s["turn"].is_null()).await.expect("started");

    b.close().await.expect("close");
    a.expect_log("Bob disconnected").await.expect("disconnect notice");
    let dropped = a
        .expect_state(|s| s["players"][1]["connected"] == false)
        .await
        .expect("state");
    assert!(dropped["winner"].is_null());

    let state = a
        .expect_state(|s| !s["winner"].is_null())
        .await
        .expect("forfeit");
    assert_eq!(state["winner"], a.player_id());
    assert_eq!(state["forfeit"], true);

    server
        .wait_for_no_rooms(Duration::from_secs(2))
        .await
        .expect("room released");
}

/// Test: reconnecting with the player id resumes the seat
#[tokio::test]
async fn test_resume_seat_with_player_id() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    let bob_id = b.player_id().to_string();

    b.close().await.expect("close");
    a.expect_log("Bob disconnected").await.expect("disconnect notice");

    let mut back = server
        .connect(&format!("?player_id={bob_id}"))
        .await
        .expect("reconnect");
    assert_eq!(back.player_id(), bob_id);
    a.expect_log("Bob reconnected").await.expect("reconnect notice");
    let state = back
        .expect_state(|s| s["players"][1]["connected"] == true)
        .await
        .expect("state after resume");
    assert_eq!(state["room"], serde_json::json!(a.room_id()));

    // outlast the grace period without a forfeit
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let rooms = server.get_json("/api/rooms").await.expect("rooms");
    assert_eq!(rooms.as_array().map(Vec::len), Some(1));
    assert!(rooms[0]["winner"].is_null());

    // the resumed seat can still play
    back.ready().await.expect("ready");
    a.ready().await.expect("ready");
    back.expect_state(|s| !s["turn"].is_null())
        .await
        .expect("started");
}

/// Test: a replaced connection can no longer act for the player
#[tokio::test]
async fn test_replaced_connection_commands_are_ignored() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    let bob_id = b.player_id().to_string();

    let mut back = server
        .connect(&format!("?player_id={bob_id}"))
        .await
        .expect("resume while the old socket is open");
    assert_eq!(back.player_id(), bob_id);

    // the old socket is still open but no longer speaks for Bob
    b.ready().await.expect("stale ready");
    let closed = async { while b.recv_json().await.is_ok() {} };
    tokio::time::timeout(Duration::from_secs(2), closed)
        .await
        .expect("old socket closed");

    a.ready().await.expect("ready");
    let state = a
        .expect_state(|s| s["players"][0]["ready"] == true)
        .await
        .expect("state");
    assert_eq!(state["players"][1]["ready"], false);
    assert!(state["turn"].is_null());

    back.ready().await.expect("ready");
    a.expect_state(|s| !s["turn"].is_null())
        .await
        .expect("started by the live connection");
}

/// Test: an unknown player id gets a fresh seat in the lobby
#[tokio::test]
async fn test_unknown_player_id_is_not_resumed() {
    let server = TestServer::start().await.expect("Failed to start server");
    let client = server
        .connect("?player_id=p-doesnotexist&name=Ghost")
        .await
        .expect("connect");
    assert_ne!(client.player_id(), "p-doesnotexist");
    assert!(client.player_id().starts_with("p-"));
    assert_eq!(server.get_json("/health").await.expect("health")["lobby"], 1);
}

/// Test: leaving the lobby removes the player from matchmaking
#[tokio::test]
async fn test_lobby_player_leaving_is_not_paired() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut gone = server.connect_named("Gone").await.expect("connect");
    gone.queue(false).await.expect("queue");
    gone.expect("status").await.expect("queued");
    gone.close().await.expect("close");

    // give the server a moment to notice
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (a, b) = server.pair("Alice", "Bob").await.expect("pair");
    assert_eq!(a.room_id(), b.room_id());
}
