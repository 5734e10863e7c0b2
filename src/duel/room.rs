//! Duel room state machine
//!
//! A room is purely synchronous: every transition is a method call taking
//! the acting side and a dice source, returning what happened. The room
//! session task feeds it events and handles pacing, broadcasting and bots.
//!
//! ```text
//! lobby ──ready×2──▶ idle ──attack──▶ attack ──wounds──▶ save
//!                      ▲                │  ▲               │
//!                      └──turn flips────┘  └──next weapon──┘
//!              any ──0 wounds / forfeit──▶ finished
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::player::{Player, Side};
use crate::catalog::CatalogUnit;
use crate::combat::{
    attack_phase, damage_phase, hit_phase, save_log_line, save_phase, save_target, threshold_label,
    wound_phase, AttackPhase, DamagePhase, DiceSource, HitPhase, SavePhase, SaveTarget,
    UnitSnapshot, WeaponProfile, WoundPhase,
};

/// Protocol violations; room state is left untouched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("you are not in this room")]
    UnknownPlayer,
    #[error("the duel has not started yet")]
    NotStarted,
    #[error("the duel has already started")]
    AlreadyStarted,
    #[error("the duel is over")]
    Finished,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("an attack is already in progress")]
    AttackInProgress,
    #[error("waiting for saves to be rolled")]
    SavePending,
    #[error("there are no saves to roll")]
    NoPendingSave,
    #[error("only the defender rolls saves")]
    NotDefender,
    #[error("no weapons selected")]
    NoWeapons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for both loadouts to be ready
    Lobby,
    /// No attack in progress
    Idle,
    /// Resolving the weapon at the queue cursor
    Attack,
    /// Suspended until the defender rolls saves
    Save,
    Finished,
}

/// Wounds awaiting a save roll
#[derive(Debug, Clone)]
pub struct PendingSave {
    pub defender: Side,
    pub count: u32,
    pub target: SaveTarget,
    pub weapon: WeaponProfile,
}

/// What the room does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Suspended until the defender submits saves
    AwaitSave { defender: Side, count: u32 },
    /// Same turn, next weapon in the queue
    NextWeapon,
    /// Queue exhausted; the other side now has the turn
    TurnOver(Side),
    Finished { winner: Side },
}

/// Result of a roll-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOff {
    /// Each (side one, side two) pair, ending with the unequal one
    pub rolls: Vec<(u32, u32)>,
    pub first: Side,
}

/// One weapon's attack, hit and wound stages
#[derive(Debug, Clone)]
pub struct Volley {
    pub attacker: Side,
    pub weapon: String,
    pub attacks: AttackPhase,
    pub hits: HitPhase,
    pub wounds: WoundPhase,
    /// Devastating damage applied straight away
    pub mortal: Option<DamagePhase>,
    pub log: Vec<String>,
    pub next: Next,
}

/// Save stage and damage of a suspended volley
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub defender: Side,
    pub weapon: String,
    pub saves: SavePhase,
    pub damage: DamagePhase,
    pub wounds_left: u32,
    pub log: Vec<String>,
    pub next: Next,
}

/// Two-player duel
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    players: [Player; 2],
    phase: Phase,
    turn: Option<Side>,
    queue: Vec<WeaponProfile>,
    cursor: usize,
    pending: Option<PendingSave>,
    winner: Option<Side>,
    forfeit: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: impl Into<String>, one: Player, two: Player) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            players: [one, two],
            phase: Phase::Lobby,
            turn: None,
            queue: Vec::new(),
            cursor: 0,
            pending: None,
            winner: None,
            forfeit: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn(&self) -> Option<Side> {
        self.turn
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn pending(&self) -> Option<&PendingSave> {
        self.pending.as_ref()
    }

    pub fn player(&self, side: Side) -> &Player {
        &self.players[side.index()]
    }

    pub fn player_mut(&mut self, side: Side) -> &mut Player {
        &mut self.players[side.index()]
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn side_of(&self, player_id: &str) -> Option<Side> {
        [Side::One, Side::Two]
            .into_iter()
            .find(|s| self.players[s.index()].id == player_id)
    }

    /// Side for a player id, or `UnknownPlayer`
    pub fn seat(&self, player_id: &str) -> Result<Side, RoomError> {
        self.side_of(player_id).ok_or(RoomError::UnknownPlayer)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Lock a loadout while the room is still in the lobby
    pub fn choose(
        &mut self,
        side: Side,
        unit: CatalogUnit,
        weapons: &[String],
    ) -> Result<(), RoomError> {
        match self.phase {
            Phase::Finished => return Err(RoomError::Finished),
            Phase::Lobby => {}
            _ => return Err(RoomError::AlreadyStarted),
        }
        self.player_mut(side).lock(unit, weapons);
        self.touch();
        Ok(())
    }

    /// Mark a side ready; returns whether both sides now are.
    ///
    /// A player readying without a loadout gets the placeholder unit.
    pub fn set_ready(&mut self, side: Side) -> Result<bool, RoomError> {
        match self.phase {
            Phase::Finished => return Err(RoomError::Finished),
            Phase::Lobby => {}
            _ => return Err(RoomError::AlreadyStarted),
        }
        let player = self.player_mut(side);
        if player.unit.is_none() {
            let name = player.loadout.as_ref().map(|l| l.unit.clone()).unwrap_or_default();
            player.lock(CatalogUnit::placeholder("", &name), &[]);
        }
        player.ready = true;
        self.touch();
        Ok(self.players.iter().all(|p| p.ready))
    }

    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|p| p.ready && p.unit.is_some())
    }

    /// Both sides roll a die until the results differ; higher goes first
    pub fn roll_off(&mut self, dice: &mut dyn DiceSource) -> Result<RollOff, RoomError> {
        match self.phase {
            Phase::Finished => return Err(RoomError::Finished),
            Phase::Lobby if self.all_ready() => {}
            Phase::Lobby => return Err(RoomError::NotStarted),
            _ => return Err(RoomError::AlreadyStarted),
        }
        let mut rolls = Vec::new();
        let first = loop {
            let (a, b) = (dice.d6(), dice.d6());
            rolls.push((a, b));
            if a != b {
                break if a > b { Side::One } else { Side::Two };
            }
        };
        for p in &mut self.players {
            p.wounds = p.max_wounds();
        }
        self.turn = Some(first);
        self.phase = Phase::Idle;
        self.touch();
        info!(
            "room {}: roll-off {:?}, {} goes first",
            self.id,
            rolls.last(),
            self.player(first).name
        );
        Ok(RollOff { rolls, first })
    }

    /// Start the active side's turn: queue every selected weapon
    pub fn begin_attack(&mut self, side: Side) -> Result<(), RoomError> {
        match self.phase {
            Phase::Finished => return Err(RoomError::Finished),
            Phase::Lobby => return Err(RoomError::NotStarted),
            Phase::Save => return Err(RoomError::SavePending),
            Phase::Attack => return Err(RoomError::AttackInProgress),
            Phase::Idle => {}
        }
        if self.turn != Some(side) {
            return Err(RoomError::NotYourTurn);
        }
        let weapons = self.player(side).weapons.clone();
        if weapons.is_empty() {
            return Err(RoomError::NoWeapons);
        }
        debug!("room {}: {} weapon(s) queued", self.id, weapons.len());
        self.queue = weapons;
        self.cursor = 0;
        self.phase = Phase::Attack;
        self.touch();
        Ok(())
    }

    /// Resolve attacks, hits and wounds of the weapon at the cursor
    pub fn fire(&mut self, dice: &mut dyn DiceSource) -> Result<Volley, RoomError> {
        match self.phase {
            Phase::Attack => {}
            Phase::Finished => return Err(RoomError::Finished),
            Phase::Save => return Err(RoomError::SavePending),
            _ => return Err(RoomError::NotStarted),
        }
        let attacker = self.turn.ok_or(RoomError::NotStarted)?;
        let defender = attacker.other();
        let weapon = self
            .queue
            .get(self.cursor)
            .cloned()
            .ok_or(RoomError::NoWeapons)?;
        let target = self
            .player(defender)
            .snapshot()
            .cloned()
            .ok_or(RoomError::NotStarted)?;

        let mut log = vec![format!(
            "{} fires {} at {}",
            self.player(attacker).name,
            weapon.name,
            self.player(defender).name
        )];
        let labels = weapon.abilities.labels();
        if !labels.is_empty() {
            log.push(format!("Weapon abilities: [{}]", labels.join(", ")));
        }

        let attacks = attack_phase(&weapon, dice);
        let hits = hit_phase(&weapon, attacks.count, dice);
        let wounds = wound_phase(&weapon, &target, &hits, dice);
        log.extend(attacks.log.iter().cloned());
        log.extend(hits.log.iter().cloned());
        log.extend(wounds.log.iter().cloned());

        let mortal = if wounds.mortal > 0 {
            let damage = damage_phase(&weapon, &target, 0, wounds.mortal, dice);
            log.extend(damage.log.iter().cloned());
            let left = self.player_mut(defender).take_damage(damage.total);
            log.push(format!(
                "{} suffers {} devastating damage ({} wounds left)",
                self.player(defender).name,
                damage.total,
                left
            ));
            Some(damage)
        } else {
            None
        };

        let next = if self.player(defender).wounds == 0 {
            self.finish(attacker, &mut log)
        } else if wounds.wounds > 0 {
            let save = save_target(target.save, target.invuln, weapon.ap);
            log.push(save_log_line(weapon.ap, save, target.invuln));
            log.push(format!(
                "{} must roll {} save(s) at {}",
                self.player(defender).name,
                wounds.wounds,
                threshold_label(save.target)
            ));
            self.pending = Some(PendingSave {
                defender,
                count: wounds.wounds,
                target: save,
                weapon: weapon.clone(),
            });
            self.phase = Phase::Save;
            Next::AwaitSave {
                defender,
                count: wounds.wounds,
            }
        } else {
            self.advance()
        };
        self.touch();

        Ok(Volley {
            attacker,
            weapon: weapon.name,
            attacks,
            hits,
            wounds,
            mortal,
            log,
            next,
        })
    }

    /// Score the defender's save dice and apply damage.
    ///
    /// `rolls` shorter than the pending count are padded from `dice`, longer
    /// ones are truncated.
    pub fn submit_saves(
        &mut self,
        side: Side,
        rolls: &[u32],
        dice: &mut dyn DiceSource,
    ) -> Result<SaveOutcome, RoomError> {
        if self.phase == Phase::Finished {
            return Err(RoomError::Finished);
        }
        let pending = match &self.pending {
            Some(p) if p.defender == side => p.clone(),
            Some(_) => return Err(RoomError::NotDefender),
            None => return Err(RoomError::NoPendingSave),
        };
        self.pending = None;

        let saves = save_phase(pending.target.target, pending.count, rolls, dice);
        let defender = self
            .player(side)
            .snapshot()
            .cloned()
            .unwrap_or_else(|| UnitSnapshot::placeholder(&self.player(side).name));
        let damage = damage_phase(&pending.weapon, &defender, saves.unsaved, 0, dice);

        let mut log = saves.log.clone();
        log.extend(damage.log.iter().cloned());
        let wounds_left = self.player_mut(side).take_damage(damage.total);
        log.push(format!(
            "{} takes {} damage ({} wounds left)",
            self.player(side).name,
            damage.total,
            wounds_left
        ));

        let next = if wounds_left == 0 {
            self.finish(side.other(), &mut log)
        } else {
            self.advance()
        };
        self.touch();

        Ok(SaveOutcome {
            defender: side,
            weapon: pending.weapon.name,
            saves,
            damage,
            wounds_left,
            log,
            next,
        })
    }

    /// Move the cursor past a completed volley, flipping the turn at the end
    fn advance(&mut self) -> Next {
        self.cursor += 1;
        if self.cursor < self.queue.len() {
            self.phase = Phase::Attack;
            return Next::NextWeapon;
        }
        self.queue.clear();
        self.cursor = 0;
        self.phase = Phase::Idle;
        let next = self.turn.map_or(Side::One, Side::other);
        self.turn = Some(next);
        Next::TurnOver(next)
    }

    fn finish(&mut self, winner: Side, log: &mut Vec<String>) -> Next {
        self.phase = Phase::Finished;
        self.winner = Some(winner);
        self.pending = None;
        self.queue.clear();
        log.push(format!("{} wins!", self.player(winner).name));
        info!("room {}: {} wins", self.id, self.player(winner).id);
        Next::Finished { winner }
    }

    /// End the duel in favour of the side that stayed
    pub fn forfeit(&mut self, loser: Side) -> Result<Side, RoomError> {
        if self.phase == Phase::Finished {
            return Err(RoomError::Finished);
        }
        let winner = loser.other();
        self.phase = Phase::Finished;
        self.winner = Some(winner);
        self.forfeit = true;
        self.pending = None;
        self.queue.clear();
        self.touch();
        info!(
            "room {}: {} forfeits to {}",
            self.id,
            self.player(loser).id,
            self.player(winner).id
        );
        Ok(winner)
    }

    /// Full snapshot for clients
    pub fn state(&self) -> RoomState {
        let id_of = |side: Side| self.player(side).id.clone();
        RoomState {
            room: self.id.clone(),
            phase: self.phase,
            turn: self.turn.map(id_of),
            players: self.players.iter().map(PlayerState::from).collect(),
            queue: self.queue.iter().map(|w| w.name.clone()).collect(),
            cursor: self.cursor,
            pending_save: self.pending.as_ref().map(|p| PendingSaveState {
                defender: id_of(p.defender),
                count: p.count,
                need: p.target.target,
                damage: p.weapon.damage.clone(),
                weapon: p.weapon.name.clone(),
            }),
            winner: self.winner.map(id_of),
            forfeit: self.forfeit,
        }
    }

    /// Short listing for the rooms endpoint
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            players: self.players.iter().map(|p| p.name.clone()).collect(),
            turn: self.turn.map(|s| self.player(s).name.clone()),
            phase: self.phase,
            winner: self.winner.map(|s| self.player(s).name.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing room snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    pub room: String,
    pub phase: Phase,
    pub turn: Option<String>,
    pub players: Vec<PlayerState>,
    pub queue: Vec<String>,
    pub cursor: usize,
    pub pending_save: Option<PendingSaveState>,
    pub winner: Option<String>,
    pub forfeit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSaveState {
    pub defender: String,
    pub count: u32,
    pub need: u32,
    pub damage: String,
    pub weapon: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub bot: bool,
    pub ready: bool,
    pub connected: bool,
    pub faction: Option<String>,
    pub unit: Option<String>,
    pub points: u32,
    pub wounds: u32,
    pub max_wounds: u32,
    pub weapons: Vec<String>,
    pub toughness: Option<u32>,
    pub save: Option<u32>,
    pub invuln: Option<u32>,
    pub feel_no_pain: Option<u32>,
    pub damage_reduction: u32,
}

impl From<&Player> for PlayerState {
    fn from(p: &Player) -> Self {
        let snap = p.snapshot();
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            bot: p.is_bot,
            ready: p.ready,
            connected: p.connected,
            faction: p.loadout.as_ref().map(|l| l.faction.clone()),
            unit: snap.map(|s| s.name.clone()),
            points: p.points(),
            wounds: p.wounds,
            max_wounds: p.max_wounds(),
            weapons: p.weapons.iter().map(|w| w.name.clone()).collect(),
            toughness: snap.map(|s| s.toughness),
            save: snap.map(|s| s.save),
            invuln: snap.map(|s| s.invuln).filter(|v| *v > 0),
            feel_no_pain: snap.and_then(|s| s.defensive.feel_no_pain),
            damage_reduction: snap.map_or(0, |s| s.defensive.damage_reduction),
        }
    }
}

/// Debug listing entry
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub players: Vec<String>,
    pub turn: Option<String>,
    pub phase: Phase,
    pub winner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
