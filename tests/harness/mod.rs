//! Integration Test Harness
//!
//! - `TestServer` - Runs a real dueld server in-process on a random port
//! - `TestClient` - WebSocket client speaking the duel protocol
//!
//! # Example
//!
//! ```rust,ignore
//! use harness::TestServer;
//!
//! #[tokio::test]
//! async fn test_bot_duel() {
//!     let server = TestServer::start().await.unwrap();
//!     let mut player = server.connect("?name=Solo&ai=1").await.unwrap();
//!
//!     player.send("queue", serde_json::json!({"ai": true})).await.unwrap();
//!     let status = player.expect("status").await.unwrap();
//!     assert!(status["data"]["room"].is_string());
//! }
//! ```

#![allow(dead_code)]

mod client;
mod server;

pub use client::TestClient;
pub use server::TestServer;
