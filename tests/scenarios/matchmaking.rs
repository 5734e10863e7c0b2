//! Matchmaking scenario tests
//!
//! Pairing humans, bot opponents and queueing while seated

use std::time::Duration;

use dueld::catalog::{CatalogUnit, FactionRef, MemoryFaction};
use dueld::combat::{UnitSnapshot, WeaponCategory, WeaponProfile};

use crate::harness::TestServer;

/// Test: two queued humans end up in the same room
#[tokio::test]
async fn test_two_humans_are_paired() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, mut b) = server.pair("Alice", "Bob").await.expect("pair");

    assert_eq!(a.room_id(), b.room_id());
    let state = a.expect("state").await.expect("state");
    assert_eq!(state["phase"], "lobby");
    let names: Vec<&str> = state["players"]
        .as_array()
        .expect("players")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
    assert!(state["players"][0]["connected"].as_bool().unwrap());

    let state_b = b.expect("state").await.expect("state");
    assert_eq!(state_b["room"], state["room"]);
}

/// Test: an opted-in player alone gets a bot after the match timeout
#[tokio::test]
async fn test_bot_opponent_after_timeout() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut solo = server.connect("?name=Solo&ai=1").await.expect("connect");
    solo.queue(false).await.expect("queue");
    solo.expect_match().await.expect("match");

    let state = solo.expect("state").await.expect("state");
    let players = state["players"].as_array().expect("players");
    assert_eq!(players[0]["id"], solo.player_id());
    assert_eq!(players[1]["bot"], true);
    assert_eq!(players[1]["name"], "AI Opponent");
    assert_eq!(players[1]["ready"], true);
}

/// Test: without opting in, nobody is paired with a bot
#[tokio::test]
async fn test_no_bot_without_opt_in() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut solo = server.connect_named("Patient").await.expect("connect");
    solo.queue(false).await.expect("queue");

    let matched = solo
        .expect_where("status", Duration::from_millis(500), |d| d["room"].is_string())
        .await;
    assert!(matched.is_err());
    assert_eq!(server.get_json("/health").await.expect("health")["rooms"], 0);
}

/// Test: queueing while seated reports the existing room
#[tokio::test]
async fn test_requeue_while_seated_returns_room() {
    let server = TestServer::start().await.expect("Failed to start server");
    let (mut a, _b) = server.pair("Alice", "Bob").await.expect("pair");
    let room = a.room_id().map(str::to_string);
    a.drain().await;

    a.queue(false).await.expect("queue");
    let status = a
        .expect_where("status", Duration::from_secs(5), |d| {
            d["message"] == "Already in a match"
        })
        .await
        .expect("status");
    assert_eq!(status["room"].as_str().map(str::to_string), room);
    assert_eq!(server.get_json("/health").await.expect("health")["rooms"], 1);
}

fn unit(id: &str, name: &str, points: u32, weapon: WeaponProfile) -> CatalogUnit {
    CatalogUnit {
        id: id.into(),
        faction: "Necrons".into(),
        points,
        snapshot: UnitSnapshot::placeholder(name),
        weapons: vec![
            WeaponProfile {
                name: "Hyperphase sword".into(),
                category: WeaponCategory::Melee,
                ..WeaponProfile::bolter()
            },
            weapon,
        ],
    }
}

/// Test: the bot's unit is the one closest in points, armed like the human
#[tokio::test]
async fn test_bot_matches_points_and_weapon_category() {
    let gauss = WeaponProfile {
        name: "Gauss flayer".into(),
        ..WeaponProfile::bolter()
    };
    let server = TestServer::start_with_factions(vec![MemoryFaction {
        faction: FactionRef {
            id: "necrons".into(),
            name: "Necrons".into(),
        },
        units: vec![
            unit("immortals", "Immortals", 70, gauss.clone()),
            unit("warriors", "Necron Warriors", 90, gauss.clone()),
            unit("lychguard", "Lychguard", 170, gauss),
        ],
    }])
    .await
    .expect("Failed to start server");

    let mut solo = server.connect("?name=Solo&ai=1").await.expect("connect");
    solo.choose("Necrons", "Lychguard", &["Gauss flayer"])
        .await
        .expect("choose");
    solo.expect("status").await.expect("locked");
    solo.queue(true).await.expect("queue");
    solo.expect_match().await.expect("match");

    let state = solo.expect("state").await.expect("state");
    let bot = &state["players"][1];
    assert_eq!(bot["unit"], "Lychguard");
    assert_eq!(bot["points"], 170);
    assert_eq!(bot["weapons"], serde_json::json!(["Gauss flayer"]));
}
