//! Ability derivation from catalog prose
//!
//! Catalog weapons and units describe their rules in free text. The
//! [`RuleDeriver`] turns that text into [`AbilityFlags`] and
//! [`DefensiveFlags`] once, at load time. Matching is best-effort: text that
//! does not match a known rule yields no flag rather than an error.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{AbilityFlags, AntiRule, DefensiveFlags};

static SUSTAINED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sustained hits\s*(\d+)?").expect("valid regex"));

static ANTI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"anti-([a-z][a-z]*)\s*\(?\s*(\d)\s*\+").expect("valid regex")
});

static FNP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:feel no pain|fnp)[^0-9]*([2-6])\s*\+").expect("valid regex")
});

static REDUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:reduce damage by|damage reduction)\s*(?:of\s*)?(\d+)?").expect("valid regex")
});

/// Maps free-text rule descriptions to structured flags.
///
/// Kept behind a trait so a structured catalog can supply flags directly
/// without going through text parsing.
pub trait RuleDeriver: Send + Sync {
    /// Weapon rules from a weapon's type/description text
    fn weapon_rules(&self, text: &str) -> AbilityFlags;

    /// Defensive rules from a unit's ability lines
    fn defensive_rules(&self, lines: &[String]) -> DefensiveFlags;
}

/// Case-insensitive keyword matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDeriver;

impl RuleDeriver for KeywordDeriver {
    fn weapon_rules(&self, text: &str) -> AbilityFlags {
        let blob = text.to_lowercase();

        let sustained_hits = SUSTAINED_RE
            .captures(&blob)
            .map(|caps| {
                caps.get(1)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(1)
                    .clamp(1, 6)
            })
            .unwrap_or(0);

        let mut anti: Vec<AntiRule> = Vec::new();
        for caps in ANTI_RE.captures_iter(&blob) {
            let tag = caps[1].to_string();
            let Ok(threshold) = caps[2].parse::<u32>() else {
                continue;
            };
            if !(2..=6).contains(&threshold) {
                continue;
            }
            match anti.iter_mut().find(|rule| rule.tag == tag) {
                Some(rule) => rule.threshold = rule.threshold.min(threshold),
                None => anti.push(AntiRule { tag, threshold }),
            }
        }

        AbilityFlags {
            lethal_hits: blob.contains("lethal hits"),
            twin_linked: blob.contains("twin-linked") || blob.contains("twin linked"),
            torrent: blob.contains("torrent"),
            devastating_wounds: blob.contains("devastating wounds"),
            sustained_hits,
            anti,
        }
    }

    fn defensive_rules(&self, lines: &[String]) -> DefensiveFlags {
        let mut flags = DefensiveFlags::default();

        for line in lines {
            let text = line.to_lowercase();

            if let Some(n) = FNP_RE
                .captures(&text)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            {
                flags.feel_no_pain = Some(flags.feel_no_pain.map_or(n, |cur| cur.min(n)));
            }

            let reduction = if let Some(caps) = REDUCTION_RE.captures(&text) {
                caps.get(1)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(1)
            } else if text.contains("-1 damage") {
                1
            } else {
                0
            };
            flags.damage_reduction = flags.damage_reduction.max(reduction);
        }

        flags
    }
}

/// Whether an Anti-X tag applies to a defender keyword list.
///
/// Case-insensitive substring containment, so "infantry" also matches
/// "Infantry Squad". This over-matches on unrelated compound keywords.
pub fn anti_matches<'a>(tag: &str, keywords: &'a [String]) -> Option<&'a str> {
    let tag = tag.to_lowercase();
    keywords
        .iter()
        .find(|kw| kw.to_lowercase().contains(&tag))
        .map(String::as_str)
}
