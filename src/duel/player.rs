//! Duel participants

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogUnit;
use crate::combat::{UnitSnapshot, WeaponCategory, WeaponProfile};

/// Seat in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }
}

/// Faction, unit and weapon names a player asked for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub faction: String,
    pub unit: String,
    pub weapons: Vec<String>,
}

/// A human or bot participant
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub is_bot: bool,
    /// Opted into a bot opponent when no human shows up
    pub wants_bot: bool,
    pub loadout: Option<Loadout>,
    /// Unit locked by the loadout
    pub unit: Option<CatalogUnit>,
    /// Selected weapons, fired in this order each turn
    pub weapons: Vec<WeaponProfile>,
    /// Wounds remaining
    pub wounds: u32,
    pub ready: bool,
    pub connected: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
            wants_bot: false,
            loadout: None,
            unit: None,
            weapons: Vec::new(),
            wounds: 0,
            ready: false,
            connected: true,
        }
    }

    /// A bot opponent, always ready
    pub fn bot(unit: CatalogUnit, weapon: &[String]) -> Self {
        let id = format!("bot-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let mut bot = Self::new(id, "AI Opponent");
        bot.is_bot = true;
        bot.ready = true;
        bot.lock(unit, weapon);
        bot
    }

    /// Lock a unit and weapon selection, resetting wounds to full
    pub fn lock(&mut self, unit: CatalogUnit, weapons: &[String]) {
        self.weapons = unit.select_weapons(weapons);
        self.loadout = Some(Loadout {
            faction: unit.faction.clone(),
            unit: unit.name().to_string(),
            weapons: self.weapons.iter().map(|w| w.name.clone()).collect(),
        });
        self.wounds = unit.snapshot.wounds;
        self.unit = Some(unit);
    }

    pub fn snapshot(&self) -> Option<&UnitSnapshot> {
        self.unit.as_ref().map(|u| &u.snapshot)
    }

    pub fn max_wounds(&self) -> u32 {
        self.snapshot().map_or(0, |s| s.wounds)
    }

    pub fn points(&self) -> u32 {
        self.unit.as_ref().map_or(0, |u| u.points)
    }

    /// Category of the first selected weapon
    pub fn primary_category(&self) -> Option<WeaponCategory> {
        self.weapons.first().map(|w| w.category)
    }

    /// Remove wounds, never going below zero
    pub fn take_damage(&mut self, damage: u32) -> u32 {
        self.wounds = self.wounds.saturating_sub(damage);
        self.wounds
    }
}

const ADJECTIVES: &[&str] = &[
    "Sassy", "Cheeky", "Awkward", "Sneaky", "Grim", "Grimdark", "Heretical", "Pious", "Stoic",
    "Stalwart", "Brutal", "Warped", "Shiny", "Rusty", "Lucky", "Unlucky", "Spicy",
];

const SURNAMES: &[&str] = &[
    "Gaunt", "Creed", "Yarrick", "Cain", "Eisenhorn", "Ravenor", "Calgar", "Sicarius", "Telion",
    "Trazyn", "Cawl", "Mephiston", "Ventris", "Varren", "Severus", "Drake",
];

/// Display name for a player who did not pick one
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = ADJECTIVES.choose(rng).copied().unwrap_or("Nameless");
    let surname = SURNAMES.choose(rng).copied().unwrap_or("Trooper");
    if rng.random_bool(0.3) {
        if let Some(second) = ADJECTIVES.choose(rng).filter(|s| **s != first) {
            return format!("{first} {second} {surname}");
        }
    }
    format!("{first} {surname}")
}
