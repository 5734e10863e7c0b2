//! Pairing of waiting players.
//!
//! A single task drains the queue. Two human tickets become a room as soon
//! as both are present; a player who opted in gets a bot opponent once
//! nobody else has turned up within the match timeout.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::player::Player;
use super::registry::{Registry, RoomHandle};
use super::room::Room;
use super::session;
use super::DuelContext;
use crate::combat::RandomDice;

/// A request to be matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub player_id: String,
    pub wants_bot: bool,
}

/// Result of joining the queue
#[derive(Debug)]
pub enum Enqueued {
    /// Already seated; here is the room
    Existing(RoomHandle),
    Queued,
    /// The matchmaker task has stopped
    Closed,
}

/// Handle to the matchmaking task
#[derive(Debug, Clone)]
pub struct Matchmaker {
    tx: mpsc::Sender<Ticket>,
    registry: Arc<Registry>,
}

impl Matchmaker {
    /// Start the matchmaking task
    pub fn spawn(ctx: Arc<DuelContext>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let registry = ctx.registry.clone();
        tokio::spawn(run(ctx, rx));
        Self { tx, registry }
    }

    pub async fn enqueue(&self, ticket: Ticket) -> Enqueued {
        if let Some(room) = self.registry.room_of(&ticket.player_id) {
            return Enqueued::Existing(room);
        }
        debug!(
            "matchmaker: {} queued (bot ok: {})",
            ticket.player_id, ticket.wants_bot
        );
        match self.tx.send(ticket).await {
            Ok(()) => Enqueued::Queued,
            Err(_) => Enqueued::Closed,
        }
    }
}

/// The ticket waiting for an opponent, and when it gives up on humans
struct Waiting {
    ticket: Ticket,
    bot_at: Option<Instant>,
}

async fn run(ctx: Arc<DuelContext>, mut rx: mpsc::Receiver<Ticket>) {
    info!("matchmaker started");
    let mut dice = RandomDice::new();
    let mut waiting: Option<Waiting> = None;

    loop {
        let incoming = match waiting.as_ref().and_then(|w| w.bot_at) {
            Some(at) => match timeout_at(at, rx.recv()).await {
                Ok(incoming) => incoming,
                Err(_) => {
                    if let Some(w) = waiting.take() {
                        pair_with_bot(&ctx, w.ticket, &mut dice).await;
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };
        let Some(ticket) = incoming else { break };

        if !ctx.registry.in_lobby(&ticket.player_id) {
            debug!("matchmaker: dropping stale ticket for {}", ticket.player_id);
            continue;
        }

        waiting = match waiting.take() {
            Some(w) if w.ticket.player_id != ticket.player_id
                && ctx.registry.in_lobby(&w.ticket.player_id) =>
            {
                pair(&ctx, w.ticket, ticket).map(|t| wait(&ctx, t))
            }
            // first in line, a re-queue, or the old ticket went stale
            _ => Some(wait(&ctx, ticket)),
        };
    }
    info!("matchmaker stopped");
}

fn wait(ctx: &DuelContext, ticket: Ticket) -> Waiting {
    let bot_at = ticket
        .wants_bot
        .then(|| Instant::now() + ctx.config.match_timeout());
    Waiting { ticket, bot_at }
}

/// Seat two humans; hands back whichever ticket is still usable on failure
fn pair(ctx: &Arc<DuelContext>, first: Ticket, second: Ticket) -> Option<Ticket> {
    let Some((one, two)) = ctx.registry.take_pair(&first.player_id, &second.player_id) else {
        warn!(
            "matchmaker: could not pair {} with {}",
            first.player_id, second.player_id
        );
        return [second, first]
            .into_iter()
            .find(|t| ctx.registry.in_lobby(&t.player_id));
    };
    let room = Room::new(room_id(), one, two);
    info!(
        "matchmaker: paired {} and {} in room {}",
        first.player_id, second.player_id, room.id
    );
    session::spawn(ctx.clone(), room);
    None
}

/// Seat a human against a bot sized to their unit
async fn pair_with_bot(ctx: &Arc<DuelContext>, ticket: Ticket, dice: &mut RandomDice) {
    let Some(human) = ctx.registry.leave_lobby(&ticket.player_id) else {
        debug!("matchmaker: {} left before a bot was found", ticket.player_id);
        return;
    };
    let unit = ctx.catalog.pick_bot_unit(human.points(), dice).await;

    let wanted = human.primary_category();
    let weapon = unit
        .weapons
        .iter()
        .find(|w| Some(w.category) == wanted)
        .or_else(|| unit.weapons.first())
        .map(|w| w.name.clone());
    let bot = Player::bot(unit, &weapon.into_iter().collect::<Vec<_>>());

    let room = Room::new(room_id(), human, bot);
    info!(
        "matchmaker: {} gets a bot opponent in room {}",
        ticket.player_id, room.id
    );
    session::spawn(ctx.clone(), room);
}

fn room_id() -> String {
    format!("room-{}", &Uuid::new_v4().simple().to_string()[..12])
}
