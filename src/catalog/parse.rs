//! Stat-line parsing for catalog rows
//!
//! Catalog columns are strings like "3+", "-1", "D6" or "12\"". These
//! helpers pull numbers out of them with safe defaults.

use std::collections::HashSet;

use serde::Deserialize;

use crate::combat::{RuleDeriver, UnitSnapshot, WeaponCategory, WeaponProfile};

/// First integer in a column: "3+" → 3, "-1" → -1, "12\"" → 12
pub fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(n) = s.trim_end_matches('+').parse::<i64>() {
        return Some(n);
    }
    let mut num = String::new();
    for (i, c) in s.char_indices() {
        if (c == '-' && i == 0) || c.is_ascii_digit() {
            num.push(c);
        } else if !num.is_empty() {
            break;
        }
    }
    num.parse().ok()
}

/// Save or skill threshold clamped to 2..=6, 4 when missing
pub fn parse_threshold(s: &str) -> u32 {
    leading_int(s).unwrap_or(4).clamp(2, 6) as u32
}

/// Invulnerable save, 0 when absent
pub fn parse_invuln(s: &str) -> u32 {
    match leading_int(s) {
        Some(n) if n > 0 => n.clamp(2, 6) as u32,
        _ => 0,
    }
}

/// Armour penetration as a non-positive modifier
pub fn parse_ap(s: &str) -> i32 {
    let n = leading_int(s).unwrap_or(0).clamp(-6, 6) as i32;
    -n.abs()
}

/// Ceiling for strength, toughness and wounds read from the catalog
pub const MAX_STAT: u32 = 1000;

/// Positive integer column capped at [`MAX_STAT`], `default` when missing
/// or non-positive
pub fn parse_positive(s: &str, default: u32) -> u32 {
    match leading_int(s) {
        Some(n) if n > 0 => n.min(i64::from(MAX_STAT)) as u32,
        _ => default,
    }
}

/// Faction slug used in catalog paths
pub fn slug(name: &str) -> String {
    let mut s = name
        .trim()
        .to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .replace('&', "and")
        .replace([' ', '/'], "-");
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelRow {
    pub name: String,
    #[serde(rename = "T")]
    pub toughness: String,
    #[serde(rename = "Sv")]
    pub save: String,
    #[serde(rename = "inv_sv")]
    pub invuln: String,
    #[serde(rename = "W")]
    pub wounds: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeaponRow {
    pub name: String,
    pub range: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub attacks: String,
    pub bs_ws: String,
    pub strength: String,
    pub ap: String,
    pub damage: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordRow {
    pub keyword: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AbilityRow {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CostRow {
    pub description: String,
    pub cost: String,
}

/// Build a weapon profile, deriving its rules from type and description
pub fn weapon_from_row(row: &WeaponRow, deriver: &dyn RuleDeriver) -> WeaponProfile {
    let description = format!("{} {}", row.kind.trim(), row.description.trim())
        .trim()
        .to_string();
    WeaponProfile {
        name: row.name.trim().to_string(),
        category: WeaponCategory::from_range(&row.range),
        attacks: row.attacks.trim().to_string(),
        skill: parse_threshold(&row.bs_ws),
        strength: parse_positive(&row.strength, 4),
        ap: parse_ap(&row.ap),
        damage: row.damage.trim().to_string(),
        abilities: deriver.weapon_rules(&description),
        description,
    }
}

/// Build a unit snapshot from its first model row plus keywords and abilities
pub fn snapshot_from_rows(
    name: &str,
    model: Option<&ModelRow>,
    keywords: &[KeywordRow],
    abilities: &[AbilityRow],
    deriver: &dyn RuleDeriver,
) -> UnitSnapshot {
    let mut unit = UnitSnapshot::placeholder(name);
    if let Some(model) = model {
        unit.wounds = parse_positive(&model.wounds, 10);
        unit.toughness = parse_positive(&model.toughness, 4);
        unit.save = parse_threshold(&model.save);
        unit.invuln = parse_invuln(&model.invuln);
    }

    let mut seen = HashSet::new();
    unit.keywords = keywords
        .iter()
        .map(|k| k.keyword.trim())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect();

    unit.abilities = abilities
        .iter()
        .map(|a| match (a.name.trim(), a.description.trim()) {
            (n, "") => n.to_string(),
            ("", d) => d.to_string(),
            (n, d) => format!("{n}: {d}"),
        })
        .filter(|line| !line.is_empty())
        .collect();
    unit.defensive = deriver.defensive_rules(&unit.abilities);
    unit
}

/// First positive cost
pub fn points_from_costs(costs: &[CostRow]) -> u32 {
    costs
        .iter()
        .find_map(|c| leading_int(&c.cost).filter(|n| *n > 0))
        .map_or(0, |n| n.min(i64::from(u32::MAX)) as u32)
}
