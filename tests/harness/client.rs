//! TestClient - WebSocket client speaking the duel protocol

use std::time::Duration;

use anyhow::{bail, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound on a whole bot duel under test timings
pub const DUEL_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket test client
pub struct TestClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
    player_id: String,
    room_id: Option<String>,
}

impl TestClient {
    /// Connect and read the `you` greeting
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let mut client = Self {
            write,
            read,
            player_id: String::new(),
            room_id: None,
        };

        let you = client.recv_json_timeout(Duration::from_secs(5)).await?;
        if you["type"] != "you" {
            bail!("expected greeting, got {you}");
        }
        client.player_id = you["data"]["id"].as_str().unwrap_or_default().to_string();
        Ok(client)
    }

    /// Player id assigned by the server
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Room id from the last match announcement
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Send a typed message with a payload
    pub async fn send(&mut self, msg_type: &str, data: Value) -> Result<()> {
        let msg = json!({ "type": msg_type, "data": data });
        self.write
            .send(Message::Text(msg.to_string().into()))
            .await?;
        Ok(())
    }

    /// Send a message without a payload
    pub async fn send_bare(&mut self, msg_type: &str) -> Result<()> {
        let msg = json!({ "type": msg_type });
        self.write
            .send(Message::Text(msg.to_string().into()))
            .await?;
        Ok(())
    }

    /// Send raw text
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.write.send(Message::Text(text.to_string().into())).await?;
        Ok(())
    }

    pub async fn queue(&mut self, ai: bool) -> Result<()> {
        self.send("queue", json!({ "ai": ai })).await
    }

    pub async fn ready(&mut self) -> Result<()> {
        self.send_bare("ready").await
    }

    pub async fn attack(&mut self) -> Result<()> {
        self.send_bare("attack").await
    }

    pub async fn save_rolls(&mut self, rolls: &[u32]) -> Result<()> {
        self.send("save_rolls", json!({ "rolls": rolls })).await
    }

    pub async fn choose(&mut self, faction: &str, unit: &str, weapons: &[&str]) -> Result<()> {
        self.send(
            "choose",
            json!({ "faction": faction, "unit": unit, "weapons": weapons }),
        )
        .await
    }

    /// Receive the next message as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(&text)?);
                }
                Some(Ok(Message::Close(_))) | None => {
                    bail!("WebSocket closed");
                }
                Some(Err(e)) => bail!("WebSocket error: {e}"),
                _ => continue, // Skip binary/ping/pong frames
            }
        }
    }

    /// Receive with timeout
    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, self.recv_json()).await {
            Ok(result) => result,
            Err(_) => bail!("Timeout waiting for WebSocket message"),
        }
    }

    /// Wait for a message of a specific type
    pub async fn expect(&mut self, msg_type: &str) -> Result<Value> {
        self.expect_where(msg_type, Duration::from_secs(5), |_| true)
            .await
    }

    /// Wait for a message of a type whose payload satisfies `pred`
    pub async fn expect_where(
        &mut self,
        msg_type: &str,
        timeout: Duration,
        pred: impl Fn(&Value) -> bool,
    ) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                bail!("Timeout waiting for message type '{}'", msg_type);
            }

            let msg = self.recv_json_timeout(remaining).await?;
            if msg["type"] == msg_type && pred(&msg["data"]) {
                return Ok(msg["data"].clone());
            }
        }
    }

    /// Wait for a single `log` line containing `needle`
    pub async fn expect_log(&mut self, needle: &str) -> Result<String> {
        let line = self
            .expect_where("log", Duration::from_secs(5), |d| {
                d.as_str().is_some_and(|s| s.contains(needle))
            })
            .await?;
        Ok(line.as_str().unwrap_or_default().to_string())
    }

    /// Wait for a `log_multi` batch with a line containing `needle`
    pub async fn expect_log_multi(&mut self, needle: &str) -> Result<Vec<String>> {
        let batch = self
            .expect_where("log_multi", Duration::from_secs(5), |d| {
                d.as_array().is_some_and(|lines| {
                    lines
                        .iter()
                        .any(|l| l.as_str().is_some_and(|s| s.contains(needle)))
                })
            })
            .await?;
        Ok(serde_json::from_value(batch)?)
    }

    /// Wait for the match announcement and remember the room
    pub async fn expect_match(&mut self) -> Result<String> {
        let status = self
            .expect_where("status", Duration::from_secs(5), |d| d["room"].is_string())
            .await?;
        let room = status["room"].as_str().unwrap_or_default().to_string();
        self.room_id = Some(room.clone());
        Ok(room)
    }

    /// Wait for a room state satisfying `pred`
    pub async fn expect_state(&mut self, pred: impl Fn(&Value) -> bool) -> Result<Value> {
        self.expect_where("state", Duration::from_secs(10), pred).await
    }

    /// Attack on our turns and fail every save until the duel ends.
    ///
    /// Returns the final state.
    pub async fn play_out(&mut self) -> Result<Value> {
        let me = self.player_id.clone();
        let deadline = tokio::time::Instant::now() + DUEL_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                bail!("duel did not finish within {:?}", DUEL_TIMEOUT);
            }
            let state = self.expect_where("state", remaining, |_| true).await?;
            if !state["winner"].is_null() {
                return Ok(state);
            }
            if state["phase"] == "idle" && state["turn"] == me.as_str() {
                self.attack().await?;
            }
            if state["pending_save"]["defender"] == me.as_str() {
                self.save_rolls(&[]).await?;
            }
        }
    }

    /// Drain all pending messages (non-blocking)
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(Ok(msg)) =
            tokio::time::timeout(Duration::from_millis(50), self.recv_json()).await
        {
            messages.push(msg);
        }
        messages
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.write.close().await?;
        Ok(())
    }
}
