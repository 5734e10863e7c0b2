//! Combat system module
//!
//! Implements tabletop shooting with:
//! - Dice expressions (e.g., "D6+2", "2D3")
//! - Ability derivation from weapon and unit prose
//! - Hit, wound, save and damage resolution
//! - Critical-roll rules (Lethal Hits, Sustained Hits, Devastating Wounds)
//! - Feel No Pain and damage reduction

mod abilities;
mod dice;
mod shooting;
mod types;

pub use abilities::{anti_matches, KeywordDeriver, RuleDeriver};
pub use dice::{
    max_of, roll_expr, DiceError, DiceExpr, DiceSource, Modifier, RandomDice, Rolled,
    ScriptedDice, MAX_DICE, MAX_TERM,
};
pub use shooting::{
    attack_phase, damage_phase, hit_phase, resolve, save_log_line, save_phase, save_target,
    wound_phase, wound_target, AttackPhase, DamagePhase, HitPhase, SavePhase, SaveTarget,
    WoundPhase, MAX_ATTACKS, MAX_DAMAGE, MAX_HITS,
};
pub use types::{
    threshold_label, AbilityFlags, AntiRule, DefensiveFlags, PhaseRolls, ShootingResult,
    UnitSnapshot, WeaponCategory, WeaponProfile, NO_SAVE,
};
