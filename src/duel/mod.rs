//! Duel rooms, players and matchmaking
//!
//! - `room`: synchronous turn state machine for one duel
//! - `session`: the async task driving a room
//! - `matchmaker`: pairs queued players, synthesising bots
//! - `registry`: lobby and live rooms

mod matchmaker;
mod player;
mod registry;
mod room;
mod session;

use std::sync::Arc;

use crate::api::ConnectionManager;
use crate::catalog::Catalog;
use crate::config::Config;

pub use matchmaker::{Enqueued, Matchmaker, Ticket};
pub use player::{random_name, Loadout, Player, Side};
pub use registry::{Registry, RoomHandle};
pub use room::{
    Next, PendingSave, PendingSaveState, Phase, PlayerState, RollOff, Room, RoomError, RoomState,
    RoomSummary, SaveOutcome, Volley,
};
pub use session::{spawn as spawn_room, RoomCommand};

/// Services shared by the matchmaker, room sessions and connections
pub struct DuelContext {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub registry: Arc<Registry>,
    pub connections: Arc<ConnectionManager>,
}
