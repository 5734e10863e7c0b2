//! Shooting resolution
//!
//! One volley runs attacks → hit → wound → save → damage, strictly in that
//! order. Each phase is exposed on its own so a duel room can suspend
//! between wounds and saves while the defender rolls; [`resolve`] chains
//! them for a fully automatic volley.
//!
//! Nothing here fails outward. Bad dice expressions roll as zero and
//! missing abilities simply do not apply.

use super::abilities::anti_matches;
use super::dice::{max_of, roll_expr, DiceSource};
use super::types::{
    threshold_label, PhaseRolls, ShootingResult, UnitSnapshot, WeaponProfile, NO_SAVE,
};

/// Natural roll that always fails, whatever the threshold
const NATURAL_FAIL: u32 = 1;
/// Natural roll that counts as a critical
const CRITICAL: u32 = 6;
/// Most attacks a single volley rolls
pub const MAX_ATTACKS: u32 = 200;
/// Most hits a single volley keeps, sustained bonuses included
pub const MAX_HITS: u32 = 4 * MAX_ATTACKS;
/// Most damage a single volley can deal before Feel No Pain
pub const MAX_DAMAGE: u32 = 1000;

fn passes(roll: u32, target: u32) -> bool {
    roll != NATURAL_FAIL && roll >= target
}

/// Wound threshold from strength against toughness
pub fn wound_target(strength: u32, toughness: u32) -> u32 {
    let (s, t) = (u64::from(strength), u64::from(toughness));
    if s >= 2 * t {
        2
    } else if strength > toughness {
        3
    } else if strength == toughness {
        4
    } else if 2 * s <= t {
        6
    } else {
        5
    }
}

/// Save threshold a defender rolls against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTarget {
    /// Threshold actually used
    pub target: u32,
    /// Armour save after AP, 7 when none is left
    pub armour: u32,
    pub used_invuln: bool,
}

/// Armour save modified by AP, replaced by the invulnerable save when better
pub fn save_target(save: u32, invuln: u32, ap: i32) -> SaveTarget {
    let armour = (i64::from(save) - i64::from(ap)).clamp(2, i64::from(NO_SAVE)) as u32;
    if invuln > 0 && invuln < armour {
        SaveTarget {
            target: invuln,
            armour,
            used_invuln: true,
        }
    } else {
        SaveTarget {
            target: armour,
            armour,
            used_invuln: false,
        }
    }
}

/// Number of attacks in this volley
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackPhase {
    pub count: u32,
    pub dice: Vec<u32>,
    pub log: Vec<String>,
}

pub fn attack_phase(weapon: &WeaponProfile, dice: &mut dyn DiceSource) -> AttackPhase {
    let rolled = roll_expr(&weapon.attacks, dice);
    let detail = match rolled.dice.len() {
        0 => String::new(),
        1 => format!(" (roll {})", rolled.dice[0]),
        _ => format!(" (rolls {:?})", rolled.dice),
    };
    let count = rolled.total.min(MAX_ATTACKS);
    let mut log = vec![format!(
        "Attacks: {}{} = {}",
        weapon.attacks.trim(),
        detail,
        rolled.total
    )];
    if count < rolled.total {
        log.push(format!("Attacks capped at {MAX_ATTACKS}"));
    }
    AttackPhase {
        count,
        log,
        dice: rolled.dice,
    }
}

/// Hit rolls and their conversions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitPhase {
    pub target: u32,
    pub rolls: Vec<u32>,
    /// Every hit, including sustained bonuses and lethal auto-wounds
    pub hits: u32,
    /// Critical hits that skip the wound roll
    pub auto_wounds: u32,
    pub log: Vec<String>,
}

/// Roll to hit. `attacks` above [`MAX_ATTACKS`] is capped before rolling,
/// and sustained bonuses never push the total past [`MAX_HITS`].
pub fn hit_phase(weapon: &WeaponProfile, attacks: u32, dice: &mut dyn DiceSource) -> HitPhase {
    let flags = &weapon.abilities;
    let target = weapon.skill.clamp(2, 6);
    let attacks = attacks.min(MAX_ATTACKS);
    let mut phase = HitPhase {
        target,
        rolls: Vec::new(),
        hits: 0,
        auto_wounds: 0,
        log: Vec::new(),
    };

    if flags.torrent {
        phase.hits = attacks;
        phase
            .log
            .push(format!("Torrent: {attacks} attack(s) hit automatically"));
        return phase;
    }

    for i in 0..attacks {
        let roll = dice.d6();
        phase.rolls.push(roll);
        if !passes(roll, target) {
            phase
                .log
                .push(format!("Hit {}: rolled {roll} vs {target}+ → MISS", i + 1));
            continue;
        }
        phase.hits = phase.hits.saturating_add(1);
        phase
            .log
            .push(format!("Hit {}: rolled {roll} vs {target}+ → HIT", i + 1));
        if roll == CRITICAL {
            if flags.lethal_hits {
                phase.auto_wounds += 1;
                phase
                    .log
                    .push("Lethal Hits: critical hit wounds automatically".to_string());
            }
            if flags.sustained_hits > 0 {
                phase.hits = phase.hits.saturating_add(flags.sustained_hits);
                phase.log.push(format!(
                    "Sustained Hits: +{} hit(s)",
                    flags.sustained_hits
                ));
            }
        }
    }
    phase.hits = phase.hits.min(MAX_HITS);
    phase.log.push(format!("Hits total: {}", phase.hits));
    phase
}

/// Wound rolls and their conversions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WoundPhase {
    pub target: u32,
    /// Final roll of each wound attempt (after any re-roll)
    pub rolls: Vec<u32>,
    /// Wounds that go to saves, auto-wounds included
    pub wounds: u32,
    /// Critical wounds turned into unsavable damage
    pub mortal: u32,
    pub log: Vec<String>,
}

pub fn wound_phase(
    weapon: &WeaponProfile,
    defender: &UnitSnapshot,
    hits: &HitPhase,
    dice: &mut dyn DiceSource,
) -> WoundPhase {
    let flags = &weapon.abilities;
    let natural = wound_target(weapon.strength, defender.toughness);
    let mut log = vec![format!(
        "To wound: S{} vs T{} → {natural}+",
        weapon.strength, defender.toughness
    )];

    let mut target = natural;
    for rule in &flags.anti {
        if let Some(keyword) = anti_matches(&rule.tag, &defender.keywords) {
            if rule.threshold < target {
                log.push(format!(
                    "Anti-{} {}+ applies (defender has '{keyword}') → {}+",
                    rule.tag, rule.threshold, rule.threshold
                ));
                target = rule.threshold;
            }
        }
    }

    let mut phase = WoundPhase {
        target,
        rolls: Vec::new(),
        wounds: hits.auto_wounds,
        mortal: 0,
        log,
    };
    if hits.auto_wounds > 0 {
        phase
            .log
            .push(format!("Lethal Hits: +{} automatic wound(s)", hits.auto_wounds));
    }

    for i in 0..hits.hits.saturating_sub(hits.auto_wounds) {
        let mut roll = dice.d6();
        if !passes(roll, target) && flags.twin_linked {
            let reroll = dice.d6();
            phase
                .log
                .push(format!("Twin-linked re-roll: {roll} → {reroll}"));
            roll = reroll;
        }
        phase.rolls.push(roll);

        if !passes(roll, target) {
            phase
                .log
                .push(format!("Wound {}: rolled {roll} vs {target}+ → FAIL", i + 1));
        } else if flags.devastating_wounds && roll == CRITICAL {
            phase.mortal += 1;
            phase.log.push(format!(
                "Wound {}: rolled {roll} → DEVASTATING (no save)",
                i + 1
            ));
        } else {
            phase.wounds += 1;
            phase
                .log
                .push(format!("Wound {}: rolled {roll} vs {target}+ → WOUND", i + 1));
        }
    }
    phase.log.push(format!(
        "Wounds total: {} (+{} devastating)",
        phase.wounds, phase.mortal
    ));
    phase
}

/// Saves against supplied rolls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePhase {
    pub target: u32,
    pub rolls: Vec<u32>,
    pub saved: u32,
    pub unsaved: u32,
    pub log: Vec<String>,
}

/// Score pre-rolled save dice.
///
/// Exactly `count` dice are used: missing dice are drawn from `dice`, extra
/// dice are ignored, and every value is clamped into 1..=6.
pub fn save_phase(
    target: u32,
    count: u32,
    supplied: &[u32],
    dice: &mut dyn DiceSource,
) -> SavePhase {
    let mut rolls: Vec<u32> = supplied
        .iter()
        .take(count as usize)
        .map(|r| (*r).clamp(1, 6))
        .collect();
    while rolls.len() < count as usize {
        rolls.push(dice.d6());
    }

    let mut phase = SavePhase {
        target,
        rolls: Vec::with_capacity(rolls.len()),
        saved: 0,
        unsaved: 0,
        log: Vec::new(),
    };
    for (i, roll) in rolls.into_iter().enumerate() {
        phase.rolls.push(roll);
        if passes(roll, target) {
            phase.saved += 1;
            phase
                .log
                .push(format!("Save {}: rolled {roll} → SAVED", i + 1));
        } else {
            phase.unsaved += 1;
            phase
                .log
                .push(format!("Save {}: rolled {roll} → FAILED", i + 1));
        }
    }
    phase.log.push(format!(
        "Saves total: {}, unsaved: {} ({})",
        phase.saved,
        phase.unsaved,
        threshold_label(target)
    ));
    phase
}

/// Damage dealt by unsaved and devastating wounds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DamagePhase {
    /// Damage of each wound before reduction
    pub rolls: Vec<u32>,
    pub fnp_rolls: Vec<u32>,
    pub ignored: u32,
    pub total: u32,
    pub log: Vec<String>,
}

pub fn damage_phase(
    weapon: &WeaponProfile,
    defender: &UnitSnapshot,
    unsaved: u32,
    mortal: u32,
    dice: &mut dyn DiceSource,
) -> DamagePhase {
    let reduction = defender.defensive.damage_reduction;
    let mut phase = DamagePhase::default();
    let mut sum = 0u32;

    for _ in 0..unsaved.min(MAX_HITS) {
        let dmg = roll_expr(&weapon.damage, dice).total;
        phase.rolls.push(dmg);
        sum = sum.saturating_add(dmg.saturating_sub(reduction));
    }
    if mortal > 0 {
        let fixed = max_of(&weapon.damage);
        for _ in 0..mortal.min(MAX_HITS) {
            let dmg = fixed.unwrap_or_else(|| roll_expr(&weapon.damage, dice).total);
            phase.rolls.push(dmg);
            sum = sum.saturating_add(dmg.saturating_sub(reduction));
        }
        phase.log.push(format!(
            "Devastating Wounds: {mortal} wound(s) at maximum damage from {}",
            weapon.damage.trim()
        ));
    }
    if reduction > 0 && !phase.rolls.is_empty() {
        phase
            .log
            .push(format!("Damage reduced by {reduction} per wound"));
    }
    if sum > MAX_DAMAGE {
        phase
            .log
            .push(format!("Damage capped at {MAX_DAMAGE} (rolled {sum})"));
        sum = MAX_DAMAGE;
    }

    if let Some(fnp) = defender.defensive.feel_no_pain {
        for _ in 0..sum {
            let roll = dice.d6();
            phase.fnp_rolls.push(roll);
            if passes(roll, fnp) {
                phase.ignored += 1;
            }
        }
        if sum > 0 {
            phase.log.push(format!(
                "Feel No Pain {fnp}+: rolls {:?} → ignored {} damage",
                phase.fnp_rolls, phase.ignored
            ));
        }
    }

    phase.total = sum - phase.ignored;
    phase
}

/// Resolve one complete volley, rolling saves for the defender.
///
/// `defender_wounds` is the defender's current wound total; the result
/// reports it after damage, floored at zero.
pub fn resolve(
    attacker: &UnitSnapshot,
    defender: &UnitSnapshot,
    weapon: &WeaponProfile,
    defender_wounds: u32,
    dice: &mut dyn DiceSource,
) -> ShootingResult {
    let mut logs = vec![format!(
        "{} attacks {} with {}",
        attacker.name, defender.name, weapon.name
    )];
    let labels = weapon.abilities.labels();
    if !labels.is_empty() {
        logs.push(format!("Weapon abilities: [{}]", labels.join(", ")));
    }

    let attacks = attack_phase(weapon, dice);
    let hits = hit_phase(weapon, attacks.count, dice);
    let wounds = wound_phase(weapon, defender, &hits, dice);

    let target = save_target(defender.save, defender.invuln, weapon.ap);
    logs.extend(attacks.log.iter().cloned());
    logs.extend(hits.log.iter().cloned());
    logs.extend(wounds.log.iter().cloned());
    logs.push(save_log_line(weapon.ap, target, defender.invuln));

    let saves = save_phase(target.target, wounds.wounds, &[], dice);
    logs.extend(saves.log.iter().cloned());

    let damage = damage_phase(weapon, defender, saves.unsaved, wounds.mortal, dice);
    logs.extend(damage.log.iter().cloned());

    let remaining = defender_wounds.saturating_sub(damage.total);
    logs.push(format!(
        "Total damage: {}, defender wounds left: {remaining}",
        damage.total
    ));

    ShootingResult {
        weapon: weapon.name.clone(),
        attacks: attacks.count,
        attack_dice: attacks.dice,
        hits: PhaseRolls {
            target: hits.target,
            rolls: hits.rolls,
            success: hits.hits,
        },
        auto_wounds: hits.auto_wounds,
        wounds: PhaseRolls {
            target: wounds.target,
            rolls: wounds.rolls,
            success: wounds.wounds,
        },
        mortal_wounds: wounds.mortal,
        saves: PhaseRolls {
            target: saves.target,
            rolls: saves.rolls,
            success: saves.saved,
        },
        unsaved: saves.unsaved,
        damage_rolls: damage.rolls,
        fnp_rolls: damage.fnp_rolls,
        damage_ignored: damage.ignored,
        damage_total: damage.total,
        defender_wounds: remaining,
        logs,
    }
}

/// Narration line explaining which save is used
pub fn save_log_line(ap: i32, target: SaveTarget, invuln: u32) -> String {
    if target.used_invuln {
        format!(
            "Saves: AP {ap} makes armour {}, invulnerable {invuln}+ is better",
            threshold_label(target.armour)
        )
    } else {
        format!("Saves: AP {ap} makes armour {}", threshold_label(target.armour))
    }
}
