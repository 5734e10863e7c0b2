//! One async task per live room.
//!
//! The task owns the room's command channel and is the only writer of its
//! state. It paces the dice animation between phases, schedules bot turns
//! and saves as room-owned deadlines, and forfeits a player who stays
//! disconnected past the grace period.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use super::player::{Player, Side};
use super::registry::RoomHandle;
use super::room::{Next, Room, RoomError};
use super::DuelContext;
use crate::api::{RollsEvent, ServerMessage};
use crate::catalog::CatalogUnit;
use crate::combat::RandomDice;

/// Events delivered to a room task
#[derive(Debug)]
pub enum RoomCommand {
    Choose {
        player_id: String,
        unit: CatalogUnit,
        weapons: Vec<String>,
    },
    Ready {
        player_id: String,
    },
    Attack {
        player_id: String,
    },
    SaveRolls {
        player_id: String,
        rolls: Vec<u32>,
    },
    Disconnected {
        player_id: String,
    },
    Reconnected {
        player_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BotAction {
    Attack,
    Save,
}

/// A pending bot action, dropped with the session
#[derive(Debug, Clone, Copy)]
struct BotTimer {
    side: Side,
    action: BotAction,
    fire_at: Instant,
}

/// Register a room and start its task
pub fn spawn(ctx: Arc<DuelContext>, room: Room) -> RoomHandle {
    let (tx, rx) = mpsc::channel(64);
    let humans: Vec<String> = room
        .players()
        .filter(|p| !p.is_bot)
        .map(|p| p.id.clone())
        .collect();
    let handle = RoomHandle {
        id: room.id.clone(),
        room: Arc::new(Mutex::new(room)),
        commands: tx,
    };
    ctx.registry.insert_room(handle.clone(), &humans);

    let session = Session {
        ctx,
        handle: handle.clone(),
        dice: RandomDice::new(),
        bot: None,
        away: [None, None],
    };
    tokio::spawn(session.run(rx, humans));
    handle
}

struct Session {
    ctx: Arc<DuelContext>,
    handle: RoomHandle,
    dice: RandomDice,
    bot: Option<BotTimer>,
    /// When each side disconnected
    away: [Option<Instant>; 2],
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Session {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>, humans: Vec<String>) {
        info!("room {}: session started", self.handle.id);
        for id in &humans {
            self.ctx
                .connections
                .update_room(id, Some(self.handle.id.clone()))
                .await;
            if !self.ctx.connections.is_connected(id).await {
                self.mark_away(id);
            }
        }
        self.open().await;

        while !self.finished() {
            let bot_at = self.bot.map(|t| t.fire_at);
            let grace_at = self.grace_deadline();
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                _ = wait_until(bot_at) => {
                    if let Some(timer) = self.bot.take() {
                        self.bot_act(timer).await;
                    }
                }
                _ = wait_until(grace_at) => self.forfeit_absent().await,
            }
        }

        self.close(&humans).await;
    }

    fn finished(&self) -> bool {
        self.handle.room.lock().is_finished()
    }

    fn name(&self, side: Side) -> String {
        self.handle.room.lock().player(side).name.clone()
    }

    fn player_id(&self, side: Side) -> String {
        self.handle.room.lock().player(side).id.clone()
    }

    fn is_bot(&self, side: Side) -> bool {
        self.handle.room.lock().player(side).is_bot
    }

    async fn broadcast(&self, msg: ServerMessage) {
        self.ctx.connections.broadcast_room(&self.handle.id, msg).await;
    }

    async fn broadcast_state(&self) {
        let state = self.handle.room.lock().state();
        self.broadcast(ServerMessage::State(state)).await;
    }

    async fn log(&self, line: String) {
        self.broadcast(ServerMessage::Log(line)).await;
    }

    async fn reject(&self, player_id: &str, err: RoomError) {
        debug!("room {}: rejected {}: {}", self.handle.id, player_id, err);
        self.ctx
            .connections
            .send_to_player(player_id, ServerMessage::Log(err.to_string()))
            .await;
    }

    /// Presentation pause between phases
    async fn pace(&self) {
        let pause = self.ctx.config.phase_pacing();
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }

    fn schedule(&mut self, side: Side, action: BotAction) {
        if self.is_bot(side) {
            self.bot = Some(BotTimer {
                side,
                action,
                fire_at: Instant::now() + self.ctx.config.bot_delay(),
            });
        }
    }

    /// Announce the match; start straight away if both sides are ready
    async fn open(&mut self) {
        self.broadcast(ServerMessage::Status {
            room: Some(self.handle.id.clone()),
            message: "Match found. Choose faction, unit and weapons, then ready up.".to_string(),
        })
        .await;

        let all_ready = {
            let mut room = self.handle.room.lock();
            let mut all = true;
            for side in [Side::One, Side::Two] {
                if room.player(side).ready {
                    all &= room.set_ready(side).unwrap_or(false);
                } else {
                    all = false;
                }
            }
            all && room.all_ready()
        };
        if all_ready {
            self.start().await;
        } else {
            self.broadcast_state().await;
        }
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Choose {
                player_id,
                unit,
                weapons,
            } => {
                let result = {
                    let mut room = self.handle.room.lock();
                    room.seat(&player_id)
                        .and_then(|side| room.choose(side, unit, &weapons))
                };
                match result {
                    Ok(()) => self.broadcast_state().await,
                    Err(e) => self.reject(&player_id, e).await,
                }
            }
            RoomCommand::Ready { player_id } => {
                let result = {
                    let mut room = self.handle.room.lock();
                    room.seat(&player_id).and_then(|side| room.set_ready(side))
                };
                match result {
                    Ok(true) => self.start().await,
                    Ok(false) => self.broadcast_state().await,
                    Err(e) => self.reject(&player_id, e).await,
                }
            }
            RoomCommand::Attack { player_id } => {
                let result = {
                    let mut room = self.handle.room.lock();
                    room.seat(&player_id).and_then(|side| room.begin_attack(side))
                };
                match result {
                    Ok(()) => self.drive().await,
                    Err(e) => self.reject(&player_id, e).await,
                }
            }
            RoomCommand::SaveRolls { player_id, rolls } => {
                let seat = self.handle.room.lock().seat(&player_id);
                match seat {
                    Ok(side) => self.saves(side, &rolls).await,
                    Err(e) => self.reject(&player_id, e).await,
                }
            }
            RoomCommand::Disconnected { player_id } => {
                if let Some(side) = self.mark_away(&player_id) {
                    let grace = self.ctx.config.disconnect_grace_secs;
                    self.log(format!(
                        "{} disconnected and forfeits in {grace}s unless they return",
                        self.name(side)
                    ))
                    .await;
                    self.broadcast_state().await;
                }
            }
            RoomCommand::Reconnected { player_id } => {
                let side = {
                    let mut room = self.handle.room.lock();
                    let side = room.side_of(&player_id);
                    if let Some(side) = side {
                        room.player_mut(side).connected = true;
                    }
                    side
                };
                if let Some(side) = side {
                    self.away[side.index()] = None;
                    info!("room {}: {} reconnected", self.handle.id, player_id);
                    self.log(format!("{} reconnected", self.name(side))).await;
                    self.broadcast_state().await;
                }
            }
        }
    }

    fn mark_away(&mut self, player_id: &str) -> Option<Side> {
        let side = {
            let mut room = self.handle.room.lock();
            let side = room.side_of(player_id)?;
            room.player_mut(side).connected = false;
            side
        };
        info!("room {}: {} disconnected", self.handle.id, player_id);
        self.away[side.index()] = Some(Instant::now());
        Some(side)
    }

    fn grace_deadline(&self) -> Option<Instant> {
        let grace = self.ctx.config.disconnect_grace();
        self.away.iter().flatten().map(|since| *since + grace).min()
    }

    async fn forfeit_absent(&mut self) {
        let grace = self.ctx.config.disconnect_grace();
        let Some(loser) = [Side::One, Side::Two].into_iter().find(|s| {
            self.away[s.index()].is_some_and(|since| since.elapsed() >= grace)
        }) else {
            return;
        };
        let result = self.handle.room.lock().forfeit(loser);
        if let Ok(winner) = result {
            self.bot = None;
            self.log(format!(
                "{} stayed away too long; {} wins by forfeit",
                self.name(loser),
                self.name(winner)
            ))
            .await;
            self.broadcast_state().await;
        }
    }

    /// Roll off and hand the first turn out
    async fn start(&mut self) {
        let result = {
            let mut room = self.handle.room.lock();
            room.roll_off(&mut self.dice)
        };
        let off = match result {
            Ok(off) => off,
            Err(e) => {
                warn!("room {}: roll-off refused: {}", self.handle.id, e);
                return;
            }
        };
        let (one, two) = (self.name(Side::One), self.name(Side::Two));
        let (a, b) = off.rolls.last().copied().unwrap_or_default();
        self.broadcast(ServerMessage::Rolls(RollsEvent {
            phase: "rolloff".to_string(),
            need: None,
            rolls: off.rolls.iter().flat_map(|(a, b)| [*a, *b]).collect(),
            weapon: None,
            attacker: None,
        }))
        .await;
        self.log(format!(
            "Roll-off: {one} {a} vs {two} {b} → {} goes first",
            self.name(off.first)
        ))
        .await;
        self.turn_over(off.first).await;
    }

    async fn turn_over(&mut self, side: Side) {
        self.log(format!("It is now {}'s turn", self.name(side))).await;
        self.broadcast_state().await;
        self.schedule(side, BotAction::Attack);
    }

    /// Fire queued weapons until a save is owed or the turn ends
    async fn drive(&mut self) {
        loop {
            let result = {
                let mut room = self.handle.room.lock();
                room.fire(&mut self.dice)
            };
            let volley = match result {
                Ok(v) => v,
                Err(e) => {
                    warn!("room {}: fire refused: {}", self.handle.id, e);
                    return;
                }
            };
            info!(
                "room {}: {} fired {}: {} hits, {} wounds, {} devastating",
                self.handle.id,
                self.player_id(volley.attacker),
                volley.weapon,
                volley.hits.hits,
                volley.wounds.wounds,
                volley.wounds.mortal
            );

            let attacker = Some(self.player_id(volley.attacker));
            let weapon = Some(volley.weapon.clone());
            let stages = [
                ("attacks", None, volley.attacks.dice.clone()),
                ("hit", Some(volley.hits.target), volley.hits.rolls.clone()),
                ("wound", Some(volley.wounds.target), volley.wounds.rolls.clone()),
            ];
            for (phase, need, rolls) in stages {
                if rolls.is_empty() {
                    continue;
                }
                self.broadcast(ServerMessage::Rolls(RollsEvent {
                    phase: phase.to_string(),
                    need,
                    rolls,
                    weapon: weapon.clone(),
                    attacker: attacker.clone(),
                }))
                .await;
                self.pace().await;
            }
            self.broadcast(ServerMessage::LogMulti(volley.log)).await;

            if !self.after(volley.next).await {
                return;
            }
            self.pace().await;
        }
    }

    /// Resolve the defender's save dice
    async fn saves(&mut self, side: Side, rolls: &[u32]) {
        let result = {
            let mut room = self.handle.room.lock();
            room.submit_saves(side, rolls, &mut self.dice)
        };
        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                let id = self.player_id(side);
                self.reject(&id, e).await;
                return;
            }
        };
        info!(
            "room {}: {} saved {}/{}, took {} damage",
            self.handle.id,
            self.player_id(side),
            outcome.saves.saved,
            outcome.saves.rolls.len(),
            outcome.damage.total
        );

        let attacker = Some(self.player_id(side.other()));
        self.broadcast(ServerMessage::Rolls(RollsEvent {
            phase: "save".to_string(),
            need: Some(outcome.saves.target),
            rolls: outcome.saves.rolls.clone(),
            weapon: Some(outcome.weapon.clone()),
            attacker: attacker.clone(),
        }))
        .await;
        if !outcome.damage.fnp_rolls.is_empty() {
            let need = self
                .handle
                .room
                .lock()
                .player(side)
                .snapshot()
                .and_then(|s| s.defensive.feel_no_pain);
            self.broadcast(ServerMessage::Rolls(RollsEvent {
                phase: "fnp".to_string(),
                need,
                rolls: outcome.damage.fnp_rolls.clone(),
                weapon: Some(outcome.weapon.clone()),
                attacker,
            }))
            .await;
        }
        self.broadcast(ServerMessage::LogMulti(outcome.log)).await;
        self.pace().await;

        if self.after(outcome.next).await {
            self.drive().await;
        }
    }

    /// Follow up a step; true when the next weapon should fire
    async fn after(&mut self, next: Next) -> bool {
        match next {
            Next::AwaitSave { defender, count } => {
                debug!(
                    "room {}: awaiting {} save(s) from {}",
                    self.handle.id,
                    count,
                    self.player_id(defender)
                );
                self.broadcast_state().await;
                self.schedule(defender, BotAction::Save);
                false
            }
            Next::NextWeapon => {
                self.broadcast_state().await;
                true
            }
            Next::TurnOver(side) => {
                self.turn_over(side).await;
                false
            }
            Next::Finished { winner } => {
                self.bot = None;
                info!(
                    "room {}: finished, winner {}",
                    self.handle.id,
                    self.player_id(winner)
                );
                self.broadcast_state().await;
                false
            }
        }
    }

    async fn bot_act(&mut self, timer: BotTimer) {
        match timer.action {
            BotAction::Attack => {
                let result = self.handle.room.lock().begin_attack(timer.side);
                match result {
                    Ok(()) => self.drive().await,
                    Err(e) => debug!("room {}: bot attack skipped: {}", self.handle.id, e),
                }
            }
            BotAction::Save => self.saves(timer.side, &[]).await,
        }
    }

    /// Free the room and return connected humans to the lobby
    async fn close(&mut self, humans: &[String]) {
        self.bot = None;
        let players: Vec<Player> = self.handle.room.lock().players().cloned().collect();
        for player in players.into_iter().filter(|p| !p.is_bot) {
            if !humans.contains(&player.id) {
                continue;
            }
            self.ctx.connections.update_room(&player.id, None).await;
            if self.ctx.connections.is_connected(&player.id).await {
                let mut fresh = Player::new(player.id.clone(), player.name.clone());
                fresh.wants_bot = player.wants_bot;
                self.ctx.registry.join_lobby(fresh);
            }
        }
        self.ctx.registry.remove_room(&self.handle.id);
        info!("room {}: session closed", self.handle.id);
    }
}
