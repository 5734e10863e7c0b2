//! Duel scenario tests
//!
//! Roll-off, turn order, save prompts and playing a duel to the end

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;

use crate::harness::{TestClient, TestServer};

/// Ready both players and wait for the first turn to be handed out
async fn start(a: &mut TestClient, b: &mut TestClient) -> Value {
    a.ready().await.expect("ready a");
    b.ready().await.expect("ready b");
    let state = a
        .expect_state(|s| !s["turn"].is_null())
        .await
        .expect("first turn");
    b.expect_state(|s| !s["turn"].is_null())
        .await
        .expect("first turn b");
    state
}

/// Test: readying up rolls off and announces who goes first
#[tokio::test]
async fn test_roll_off_on_ready() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");

    a.ready().await.expect("ready");
    let waiting = a
        .expect_state(|s| s["players"][0]["ready"] == true)
        .await
        .expect("state");
    assert_eq!(waiting["phase"], "lobby");

    b.ready().await.expect("ready");
    let rolls = a
        .expect_where("rolls", Duration::from_secs(5), |d| d["phase"] == "rolloff")
        .await
        .expect("roll-off dice");
    let dice = rolls["rolls"].as_array().expect("dice");
    assert!(dice.len() >= 2 && dice.len() % 2 == 0);

    let line = a.expect_log("Roll-off:").await.expect("roll-off line");
    assert!(line.contains("goes first"));
    let state = a
        .expect_state(|s| s["phase"] == "idle")
        .await
        .expect("idle");
    assert_eq!(state["players"][0]["wounds"], 10);
    assert_eq!(state["players"][1]["max_wounds"], 10);
}

/// Test: the player without the turn cannot attack
#[tokio::test]
async fn test_out_of_turn_attack_rejected() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    let state = start(&mut a, &mut b).await;

    let waiting = if state["turn"] == a.player_id() {
        &mut b
    } else {
        &mut a
    };
    waiting.attack().await.expect("attack");
    waiting
        .expect_log("it is not your turn")
        .await
        .expect("rejection");
}

/// Test: loadouts are frozen once the duel has started
#[tokio::test]
async fn test_choose_after_start_rejected() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    start(&mut a, &mut b).await;

    a.choose("Orks", "Boyz", &[]).await.expect("choose");
    a.expect_log("already started").await.expect("rejection");
}

/// Test: a loadout chosen in the room shows up in the state
#[tokio::test]
async fn test_choose_in_room_updates_state() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, _b) = server.pair("Alice", "Bob").await.expect("pair");

    a.choose("Orks", "Boyz", &["Bolter"]).await.expect("choose");
    let state = a
        .expect_state(|s| s["players"][0]["unit"] == "Boyz")
        .await
        .expect("state");
    assert_eq!(state["players"][0]["faction"], "Orks");
    assert_eq!(state["players"][0]["weapons"], serde_json::json!(["Bolter"]));
    assert_eq!(state["players"][0]["save"], 4);
}

/// Test: two humans play a duel to the end and agree on the winner
#[tokio::test]
async fn test_human_duel_plays_to_finish() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");
    a.ready().await.expect("ready a");
    b.ready().await.expect("ready b");

    let (end_a, end_b) = tokio::join!(a.play_out(), b.play_out());
    let (end_a, end_b) = (end_a.expect("duel a"), end_b.expect("duel b"));
    assert_eq!(end_a["winner"], end_b["winner"]);
    assert_eq!(end_a["phase"], "finished");
    assert_eq!(end_a["forfeit"], false);

    let loser = end_a["players"]
        .as_array()
        .expect("players")
        .iter()
        .find(|p| p["id"] != end_a["winner"])
        .cloned()
        .expect("loser");
    assert_eq!(loser["wounds"], 0);
}

/// Test: a bot duel streams every resolution phase to the human
#[tokio::test]
async fn test_bot_duel_streams_phases() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut solo = server.connect("?name=Solo&ai=1").await.expect("connect");
    solo.ready().await.expect("ready");
    solo.queue(true).await.expect("queue");
    solo.expect_match().await.expect("match");

    let me = solo.player_id().to_string();
    let mut phases = HashSet::new();
    let mut saw_save_prompt = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        assert!(tokio::time::Instant::now() < deadline, "duel did not finish");
        let msg = solo
            .recv_json_timeout(Duration::from_secs(10))
            .await
            .expect("message");
        match msg["type"].as_str() {
            Some("rolls") => {
                let phase = msg["data"]["phase"].as_str().unwrap_or_default();
                for die in msg["data"]["rolls"].as_array().expect("dice") {
                    let d = die.as_u64().expect("die");
                    assert!((1..=6).contains(&d), "die {d} out of range in {phase}");
                }
                phases.insert(phase.to_string());
            }
            Some("state") => {
                let state = &msg["data"];
                if !state["winner"].is_null() {
                    break;
                }
                if state["phase"] == "idle" && state["turn"] == me.as_str() {
                    solo.attack().await.expect("attack");
                }
                if state["pending_save"]["defender"] == me.as_str() {
                    saw_save_prompt = true;
                    solo.save_rolls(&[]).await.expect("saves");
                }
            }
            _ => {}
        }
    }

    for phase in ["rolloff", "hit", "wound", "save"] {
        assert!(phases.contains(phase), "never saw {phase} dice: {phases:?}");
    }
    assert!(saw_save_prompt);
}

/// Test: explicit save dice are used as given
#[tokio::test]
async fn test_submitted_save_dice_are_used() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut solo = server.connect("?name=Solo&ai=1").await.expect("connect");
    solo.ready().await.expect("ready");
    solo.queue(true).await.expect("queue");
    solo.expect_match().await.expect("match");

    let me = solo.player_id().to_string();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        assert!(tokio::time::Instant::now() < deadline, "no save prompt");
        let state = solo
            .expect_where("state", Duration::from_secs(10), |_| true)
            .await
            .expect("state");
        assert!(state["winner"].is_null(), "duel ended before a save prompt");
        if state["phase"] == "idle" && state["turn"] == me.as_str() {
            solo.attack().await.expect("attack");
        }
        if state["pending_save"]["defender"] == me.as_str() {
            let count = state["pending_save"]["count"].as_u64().expect("count") as usize;
            solo.save_rolls(&vec![6; count]).await.expect("saves");
            let rolls = solo
                .expect_where("rolls", Duration::from_secs(5), |d| d["phase"] == "save")
                .await
                .expect("save dice");
            assert_eq!(rolls["rolls"], serde_json::json!(vec![6; count]));
            solo.expect_log_multi("takes 0 damage").await.expect("no damage");
            break;
        }
    }
}
