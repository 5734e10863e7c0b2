//! Registry of connected participants and active rooms
//!
//! Owned by the server and shared by handle with the matchmaker, the room
//! sessions and the connection handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::player::Player;
use super::room::{Room, RoomSummary};
use super::session::RoomCommand;

/// Shared handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: String,
    pub room: Arc<Mutex<Room>>,
    pub commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Forward a command to the room task; false if the room has shut down
    pub async fn send(&self, command: RoomCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Forward a command without waiting; dropped if the room's queue is full
    pub fn offer(&self, command: RoomCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!("room {}: command queue full, dropping {:?}", self.id, command);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Participants and rooms
#[derive(Debug, Default)]
pub struct Registry {
    /// Connected participants not seated in a room
    lobby: Mutex<HashMap<String, Player>>,
    rooms: RwLock<HashMap<String, RoomHandle>>,
    /// player id → room id
    seats: RwLock<HashMap<String, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_lobby(&self, player: Player) {
        self.lobby.lock().insert(player.id.clone(), player);
    }

    pub fn leave_lobby(&self, player_id: &str) -> Option<Player> {
        self.lobby.lock().remove(player_id)
    }

    pub fn in_lobby(&self, player_id: &str) -> bool {
        self.lobby.lock().contains_key(player_id)
    }

    /// Mutate a waiting participant in place
    pub fn update_lobby<R>(&self, player_id: &str, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        self.lobby.lock().get_mut(player_id).map(f)
    }

    pub fn lobby_player(&self, player_id: &str) -> Option<Player> {
        self.lobby.lock().get(player_id).cloned()
    }

    pub fn lobby_size(&self) -> usize {
        self.lobby.lock().len()
    }

    /// Take two waiting participants at once, or neither
    pub fn take_pair(&self, one: &str, two: &str) -> Option<(Player, Player)> {
        let mut lobby = self.lobby.lock();
        if one == two || !lobby.contains_key(one) || !lobby.contains_key(two) {
            return None;
        }
        let a = lobby.remove(one)?;
        let b = lobby.remove(two)?;
        Some((a, b))
    }

    /// Register a room and seat its human players
    pub fn insert_room(&self, handle: RoomHandle, player_ids: &[String]) {
        let mut seats = self.seats.write();
        for id in player_ids {
            seats.insert(id.clone(), handle.id.clone());
        }
        self.rooms.write().insert(handle.id.clone(), handle);
    }

    /// Drop a room and free its seats
    pub fn remove_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.seats.write().retain(|_, r| r != room_id);
        self.rooms.write().remove(room_id)
    }

    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().get(room_id).cloned()
    }

    /// Room a player is seated in
    pub fn room_of(&self, player_id: &str) -> Option<RoomHandle> {
        let room_id = self.seats.read().get(player_id).cloned()?;
        self.room(&room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = self.rooms.read().values().cloned().collect();
        let mut list: Vec<RoomSummary> = handles.iter().map(|h| h.room.lock().summary()).collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }
}
