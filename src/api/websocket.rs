//! WebSocket handler for real-time duel connections

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::duel::{random_name, Enqueued, Player, RoomCommand, RoomState, Ticket};

/// A connected player session
#[derive(Debug)]
pub struct PlayerSession {
    pub player_id: String,
    /// Distinguishes a resumed connection from the one it replaced
    pub conn_id: Uuid,
    pub room_id: Option<String>,
    pub sender: mpsc::Sender<ServerMessage>,
}

/// Connection manager for all active WebSocket connections
#[derive(Debug, Default)]
pub struct ConnectionManager {
    sessions: RwLock<HashMap<String, PlayerSession>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player session, replacing any older connection
    pub async fn register(&self, session: PlayerSession) {
        let player_id = session.player_id.clone();
        self.sessions.write().await.insert(player_id, session);
    }

    /// Remove a player session if it is still the given connection
    pub async fn unregister(&self, player_id: &str, conn_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.get(player_id).is_some_and(|s| s.conn_id == conn_id) {
            sessions.remove(player_id);
            true
        } else {
            false
        }
    }

    /// Whether `conn_id` is still the player's live connection
    pub async fn is_current(&self, player_id: &str, conn_id: Uuid) -> bool {
        self.sessions
            .read()
            .await
            .get(player_id)
            .is_some_and(|s| s.conn_id == conn_id)
    }

    pub async fn is_connected(&self, player_id: &str) -> bool {
        self.sessions.read().await.contains_key(player_id)
    }

    /// Get a player's sender channel
    pub async fn get_sender(&self, player_id: &str) -> Option<mpsc::Sender<ServerMessage>> {
        self.sessions
            .read()
            .await
            .get(player_id)
            .map(|s| s.sender.clone())
    }

    /// Send a message to a specific player
    pub async fn send_to_player(&self, player_id: &str, msg: ServerMessage) {
        if let Some(sender) = self.get_sender(player_id).await {
            if sender.send(msg).await.is_err() {
                warn!("Failed to send message to player {}", player_id);
            }
        }
    }

    /// Broadcast a message to all players in a room
    pub async fn broadcast_room(&self, room_id: &str, msg: ServerMessage) {
        let targets: Vec<(String, mpsc::Sender<ServerMessage>)> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.room_id.as_deref() == Some(room_id))
            .map(|s| (s.player_id.clone(), s.sender.clone()))
            .collect();
        for (player_id, sender) in targets {
            if sender.send(msg.clone()).await.is_err() {
                warn!("Failed to broadcast to player {}", player_id);
            }
        }
    }

    /// Update player's room
    pub async fn update_room(&self, player_id: &str, room_id: Option<String>) {
        if let Some(session) = self.sessions.write().await.get_mut(player_id) {
            session.room_id = room_id;
        }
    }
}

/// Dice shown to clients for animation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollsEvent {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need: Option<u32>,
    pub rolls: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacker: Option<String>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Own player id, sent on connect
    You { id: String },
    /// Matchmaking and room status
    Status { room: Option<String>, message: String },
    /// Full room snapshot
    State(RoomState),
    Rolls(RollsEvent),
    /// One narration line
    Log(String),
    LogMulti(Vec<String>),
}

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Lock faction, unit and weapons
    Choose {
        faction: String,
        unit: String,
        #[serde(default)]
        weapons: Vec<String>,
    },
    Ready,
    /// Ask for an opponent, optionally accepting a bot
    Queue {
        #[serde(default)]
        ai: bool,
    },
    Attack,
    SaveRolls {
        #[serde(default)]
        rolls: Vec<u32>,
    },
    /// Ping to keep connection alive
    Ping,
}

/// Query parameters on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub name: Option<String>,
    /// "1" to accept a bot opponent
    pub ai: Option<String>,
    /// Resume a seat held by an earlier connection
    pub player_id: Option<String>,
}

/// Handle WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: AppState, params: ConnectParams) {
    // Create message channel for this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);
    let conn_id = Uuid::new_v4();

    // Resume only into a seat that still exists
    let resumed = params
        .player_id
        .as_deref()
        .and_then(|id| state.ctx.registry.room_of(id).map(|room| (id.to_string(), room)));
    let player_id = match &resumed {
        Some((id, _)) => id.clone(),
        None => format!("p-{}", Uuid::new_v4().simple()),
    };

    state
        .ctx
        .connections
        .register(PlayerSession {
            player_id: player_id.clone(),
            conn_id,
            room_id: resumed.as_ref().map(|(_, room)| room.id.clone()),
            sender: tx,
        })
        .await;

    let you = ServerMessage::You {
        id: player_id.clone(),
    };
    if let Ok(json) = serde_json::to_string(&you) {
        let _ = socket.send(Message::Text(json.into())).await;
    }

    match resumed {
        Some((_, room)) => {
            info!("WebSocket resumed: {} in room {}", player_id, room.id);
            room.send(RoomCommand::Reconnected {
                player_id: player_id.clone(),
            })
            .await;
        }
        None => {
            let name = params
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| random_name(&mut rand::rng()));
            let mut player = Player::new(player_id.clone(), name);
            player.wants_bot = params.ai.as_deref() == Some("1");
            info!(
                "WebSocket connected: {} ({}, ai={})",
                player_id, player.name, player.wants_bot
            );
            state.ctx.registry.join_lobby(player);
        }
    }

    // Main loop: handle incoming messages and outgoing messages
    loop {
        tokio::select! {
            // Handle outgoing messages from our channel
            Some(msg) = rx.recv() => {
                if let Ok(json) = serde_json::to_string(&msg) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            // Handle incoming messages from WebSocket
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if !state.ctx.connections.is_current(&player_id, conn_id).await {
                            debug!("Connection for {} was replaced, closing", player_id);
                            break;
                        }
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_client_message(&state, &player_id, client_msg).await,
                            Err(e) => debug!("Ignoring malformed message from {}: {}", player_id, e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    // Clean up; nothing reads our queue any more
    drop(rx);
    if state.ctx.connections.unregister(&player_id, conn_id).await {
        state.ctx.registry.leave_lobby(&player_id);
        if let Some(room) = state.ctx.registry.room_of(&player_id) {
            room.send(RoomCommand::Disconnected {
                player_id: player_id.clone(),
            })
            .await;
        }
    }
    info!("WebSocket disconnected: {}", player_id);
}

/// Handle a message from the client
async fn handle_client_message(state: &AppState, player_id: &str, msg: ClientMessage) {
    let ctx = &state.ctx;
    let room = ctx.registry.room_of(player_id);

    match msg {
        ClientMessage::Choose {
            faction,
            unit,
            weapons,
        } => {
            let resolved = ctx.catalog.resolve_unit(&faction, &unit).await;
            debug!(
                "Player {} chose {}/{} ({} weapons)",
                player_id,
                faction,
                resolved.name(),
                weapons.len()
            );
            match room {
                Some(room) => {
                    room.offer(RoomCommand::Choose {
                        player_id: player_id.to_string(),
                        unit: resolved,
                        weapons,
                    });
                }
                None => {
                    let locked = ctx
                        .registry
                        .update_lobby(player_id, |p| {
                            p.lock(resolved, &weapons);
                            p.loadout.clone()
                        })
                        .flatten();
                    if let Some(loadout) = locked {
                        let message = format!(
                            "Locked {} / {} with {}",
                            loadout.faction,
                            loadout.unit,
                            loadout.weapons.join(", ")
                        );
                        ctx.connections
                            .send_to_player(player_id, ServerMessage::Status { room: None, message })
                            .await;
                    }
                }
            }
        }
        ClientMessage::Ready => match room {
            Some(room) => {
                room.offer(RoomCommand::Ready {
                    player_id: player_id.to_string(),
                });
            }
            None => {
                ctx.registry.update_lobby(player_id, |p| p.ready = true);
            }
        },
        ClientMessage::Queue { ai } => {
            ctx.registry.update_lobby(player_id, |p| p.wants_bot |= ai);
            let wants_bot = ctx
                .registry
                .lobby_player(player_id)
                .is_some_and(|p| p.wants_bot);
            let ticket = Ticket {
                player_id: player_id.to_string(),
                wants_bot,
            };
            let (room_id, message) = match state.matchmaker.enqueue(ticket).await {
                Enqueued::Existing(room) => {
                    let snapshot = room.room.lock().state();
                    ctx.connections
                        .send_to_player(player_id, ServerMessage::State(snapshot))
                        .await;
                    (Some(room.id), "Already in a match".to_string())
                }
                Enqueued::Queued => (None, "Looking for an opponent...".to_string()),
                Enqueued::Closed => (None, "Matchmaking is unavailable".to_string()),
            };
            ctx.connections
                .send_to_player(
                    player_id,
                    ServerMessage::Status {
                        room: room_id,
                        message,
                    },
                )
                .await;
        }
        ClientMessage::Attack => {
            if let Some(room) = room {
                room.offer(RoomCommand::Attack {
                    player_id: player_id.to_string(),
                });
            }
        }
        ClientMessage::SaveRolls { rolls } => {
            if let Some(room) = room {
                room.offer(RoomCommand::SaveRolls {
                    player_id: player_id.to_string(),
                    rolls,
                });
            }
        }
        ClientMessage::Ping => {
            // Just keep the connection alive, no response needed
        }
    }
}
