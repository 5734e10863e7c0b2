//! Combat data model
//!
//! Snapshots and weapon profiles are built once from catalog data and
//! treated as read-only afterwards. Live wound totals belong to the duel
//! player, never to a snapshot.

use serde::{Deserialize, Serialize};

/// Save value meaning "no save possible"
pub const NO_SAVE: u32 = 7;

/// Immutable per-attack copy of a combatant's stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub name: String,
    pub toughness: u32,
    /// Starting (and maximum) wounds
    pub wounds: u32,
    /// Armour save threshold, 2..=6, or 7 for none
    pub save: u32,
    /// Invulnerable save threshold, 0 for none
    pub invuln: u32,
    /// Unit keywords, matched by Anti-X rules
    pub keywords: Vec<String>,
    /// Free-text ability lines
    pub abilities: Vec<String>,
    /// Rules derived from `abilities` at load time
    pub defensive: DefensiveFlags,
}

impl UnitSnapshot {
    /// Placeholder stat line used when the catalog cannot supply a unit
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            toughness: 4,
            wounds: 10,
            save: 4,
            invuln: 0,
            keywords: Vec::new(),
            abilities: Vec::new(),
            defensive: DefensiveFlags::default(),
        }
    }
}

/// Melee or ranged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeaponCategory {
    Melee,
    #[default]
    Ranged,
}

impl WeaponCategory {
    /// Classify a catalog range column ("Melee", "24\"", ...)
    pub fn from_range(range: &str) -> Self {
        if range.trim().to_lowercase().starts_with("melee") {
            WeaponCategory::Melee
        } else {
            WeaponCategory::Ranged
        }
    }
}

/// One weapon profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    pub name: String,
    pub category: WeaponCategory,
    /// Attacks expression, dice or integer
    pub attacks: String,
    /// Ballistic/weapon skill threshold
    pub skill: u32,
    pub strength: u32,
    /// Armour penetration, zero or negative ("-1" worsens saves by one)
    pub ap: i32,
    /// Damage expression, dice or integer
    pub damage: String,
    /// Raw ability prose from the catalog
    pub description: String,
    pub abilities: AbilityFlags,
}

impl WeaponProfile {
    /// The generic weapon carried by placeholder units
    pub fn bolter() -> Self {
        Self {
            name: "Bolter".to_string(),
            category: WeaponCategory::Ranged,
            attacks: "2".to_string(),
            skill: 4,
            strength: 4,
            ap: 0,
            damage: "1".to_string(),
            description: String::new(),
            abilities: AbilityFlags::default(),
        }
    }
}

/// Conditional wound threshold keyed to a defender keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiRule {
    /// Lowercase keyword fragment, e.g. "infantry"
    pub tag: String,
    pub threshold: u32,
}

/// Normalized weapon rules derived from ability prose
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityFlags {
    pub lethal_hits: bool,
    pub twin_linked: bool,
    pub torrent: bool,
    pub devastating_wounds: bool,
    /// Bonus hits per critical hit, 0 when absent
    pub sustained_hits: u32,
    pub anti: Vec<AntiRule>,
}

impl AbilityFlags {
    pub fn is_empty(&self) -> bool {
        *self == AbilityFlags::default()
    }

    /// Display labels in a stable order
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if self.lethal_hits {
            labels.push("Lethal Hits".to_string());
        }
        if self.twin_linked {
            labels.push("Twin-linked".to_string());
        }
        if self.torrent {
            labels.push("Torrent".to_string());
        }
        if self.devastating_wounds {
            labels.push("Devastating Wounds".to_string());
        }
        if self.sustained_hits > 0 {
            labels.push(format!("Sustained Hits {}", self.sustained_hits));
        }
        for anti in &self.anti {
            labels.push(format!("Anti-{} ({}+)", anti.tag, anti.threshold));
        }
        labels
    }
}

/// Defensive rules derived from unit ability prose
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefensiveFlags {
    /// Feel No Pain threshold
    pub feel_no_pain: Option<u32>,
    /// Flat per-wound damage reduction
    pub damage_reduction: u32,
}

/// Rolls and successes of one phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseRolls {
    pub target: u32,
    pub rolls: Vec<u32>,
    pub success: u32,
}

/// Full outcome of one volley
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShootingResult {
    pub weapon: String,
    pub attacks: u32,
    pub attack_dice: Vec<u32>,
    /// Hit rolls; `success` counts every hit including sustained bonuses
    pub hits: PhaseRolls,
    /// Hits converted straight into wounds by Lethal Hits
    pub auto_wounds: u32,
    /// Wound rolls; `success` counts wounds that go to saves, auto-wounds included
    pub wounds: PhaseRolls,
    /// Wounds diverted to unsavable damage by Devastating Wounds
    pub mortal_wounds: u32,
    /// Save rolls; `success` counts saved wounds
    pub saves: PhaseRolls,
    pub unsaved: u32,
    pub damage_rolls: Vec<u32>,
    pub fnp_rolls: Vec<u32>,
    pub damage_ignored: u32,
    pub damage_total: u32,
    /// Defender wounds left after this volley
    pub defender_wounds: u32,
    pub logs: Vec<String>,
}

/// Format a threshold the way players read it ("4+", "no save")
pub fn threshold_label(value: u32) -> String {
    if value >= NO_SAVE {
        "no save".to_string()
    } else {
        format!("{value}+")
    }
}
