//! Dice expression evaluation
//!
//! Parses and rolls catalog dice notation like "4D6", "D3+3", "2D6x2" or a
//! plain integer. Malformed expressions evaluate to zero instead of failing,
//! so bad catalog data can never stall a live duel.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static DICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)?\s*d\s*(\d+)(?:\s*([+\-x*×])\s*(\d+))?\s*$")
        .expect("dice regex is valid")
});

/// Most dice one expression may roll
pub const MAX_DICE: u32 = 100;
/// Ceiling on die sides, flat values and modifier terms
pub const MAX_TERM: u32 = 1000;

/// Source of individual die draws.
///
/// The resolver only ever asks for one die at a time, so tests can script
/// exact sequences and production code can use a seeded or OS-backed RNG.
pub trait DiceSource {
    /// Draw one die with `sides` faces, uniform in `1..=sides`
    fn roll(&mut self, sides: u32) -> u32;

    /// Draw one six-sided die
    fn d6(&mut self) -> u32 {
        self.roll(6)
    }
}

/// Random dice backed by any `rand` RNG
#[derive(Debug, Clone)]
pub struct RandomDice<R = StdRng> {
    rng: R,
}

impl RandomDice<StdRng> {
    /// Fresh OS-seeded dice
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible dice from a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDice<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomDice<R> {
    /// Wrap an existing RNG
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> DiceSource for RandomDice<R> {
    fn roll(&mut self, sides: u32) -> u32 {
        self.rng.random_range(1..=sides.max(1))
    }
}

/// Pre-determined dice, consumed front to back.
///
/// Values are clamped into `1..=sides`. Once the script runs out every
/// further draw returns the fallback value.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    values: VecDeque<u32>,
    fallback: u32,
}

impl ScriptedDice {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: values.into_iter().collect(),
            fallback: 1,
        }
    }

    /// Value returned after the script is exhausted
    pub fn with_fallback(mut self, fallback: u32) -> Self {
        self.fallback = fallback;
        self
    }

    /// Number of scripted values not yet drawn
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&mut self, sides: u32) -> u32 {
        let value = self.values.pop_front().unwrap_or(self.fallback);
        value.clamp(1, sides.max(1))
    }
}

/// Trailing modifier on a dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    None,
    Add(u32),
    Sub(u32),
    Mul(u32),
}

impl Modifier {
    fn apply(self, total: i64) -> i64 {
        match self {
            Modifier::None => total,
            Modifier::Add(k) => total + i64::from(k),
            Modifier::Sub(k) => total - i64::from(k),
            Modifier::Mul(k) => total * i64::from(k),
        }
    }
}

/// A parsed dice expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiceExpr {
    /// Plain integer, capped at [`MAX_TERM`]
    Fixed(u32),
    /// `[N]D[M][+/-/xK]`, with N capped at [`MAX_DICE`]
    Roll {
        count: u32,
        sides: u32,
        modifier: Modifier,
    },
}

/// Why an expression could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    #[error("empty dice expression")]
    Empty,
    #[error("unrecognized dice expression: {0:?}")]
    Syntax(String),
    #[error("dice count and sides must be at least 1: {0:?}")]
    ZeroDice(String),
}

impl DiceExpr {
    /// Parse an expression, or fall back to `Fixed(0)` for malformed input
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|err: DiceError| {
            debug!("dice: {err}, treating as 0");
            DiceExpr::Fixed(0)
        })
    }

    /// Smallest possible total
    pub fn min(&self) -> u32 {
        match *self {
            DiceExpr::Fixed(n) => n,
            DiceExpr::Roll {
                count, modifier, ..
            } => clamp_total(modifier.apply(i64::from(count))),
        }
    }

    /// Largest possible total
    pub fn max(&self) -> u32 {
        match *self {
            DiceExpr::Fixed(n) => n,
            DiceExpr::Roll {
                count,
                sides,
                modifier,
            } => clamp_total(modifier.apply(i64::from(count) * i64::from(sides))),
        }
    }

    /// Roll the expression, keeping each die for display
    pub fn roll(&self, dice: &mut dyn DiceSource) -> Rolled {
        match *self {
            DiceExpr::Fixed(n) => Rolled {
                dice: Vec::new(),
                total: n,
            },
            DiceExpr::Roll {
                count,
                sides,
                modifier,
            } => {
                let rolls: Vec<u32> = (0..count).map(|_| dice.roll(sides)).collect();
                let sum: i64 = rolls.iter().map(|&r| i64::from(r)).sum();
                Rolled {
                    dice: rolls,
                    total: clamp_total(modifier.apply(sum)),
                }
            }
        }
    }
}

fn clamp_total(total: i64) -> u32 {
    total.clamp(0, i64::from(u32::MAX)) as u32
}

impl FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DiceError::Empty);
        }
        if let Ok(n) = s.parse::<u32>() {
            return Ok(DiceExpr::Fixed(n.min(MAX_TERM)));
        }

        let caps = DICE_RE
            .captures(s)
            .ok_or_else(|| DiceError::Syntax(s.to_string()))?;
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        let count = match caps.get(1) {
            Some(_) => number(1).ok_or_else(|| DiceError::Syntax(s.to_string()))?,
            None => 1,
        };
        let sides = number(2).ok_or_else(|| DiceError::Syntax(s.to_string()))?;
        if count == 0 || sides == 0 {
            return Err(DiceError::ZeroDice(s.to_string()));
        }

        let count = count.min(MAX_DICE);
        let sides = sides.min(MAX_TERM);

        let term = number(4).map(|k| k.min(MAX_TERM));
        let modifier = match (caps.get(3).map(|m| m.as_str()), term) {
            (Some("+"), Some(k)) => Modifier::Add(k),
            (Some("-"), Some(k)) => Modifier::Sub(k),
            (Some(_), Some(k)) => Modifier::Mul(k),
            _ => Modifier::None,
        };

        Ok(DiceExpr::Roll {
            count,
            sides,
            modifier,
        })
    }
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DiceExpr::Fixed(n) => write!(f, "{n}"),
            DiceExpr::Roll {
                count,
                sides,
                modifier,
            } => {
                if count != 1 {
                    write!(f, "{count}")?;
                }
                write!(f, "D{sides}")?;
                match modifier {
                    Modifier::None => Ok(()),
                    Modifier::Add(k) => write!(f, "+{k}"),
                    Modifier::Sub(k) => write!(f, "-{k}"),
                    Modifier::Mul(k) => write!(f, "x{k}"),
                }
            }
        }
    }
}

/// Outcome of rolling an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rolled {
    /// Individual die values (empty for fixed values)
    pub dice: Vec<u32>,
    /// Total after modifiers, floored at 0
    pub total: u32,
}

/// Evaluate a raw catalog expression in one step
pub fn roll_expr(expr: &str, dice: &mut dyn DiceSource) -> Rolled {
    DiceExpr::parse_lenient(expr).roll(dice)
}

/// Maximum of a raw expression, if it can be parsed
pub fn max_of(expr: &str) -> Option<u32> {
    expr.parse::<DiceExpr>().ok().map(|e| e.max())
}
