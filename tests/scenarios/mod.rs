//! Scenario Tests for dueld
//!
//! - Matchmaking: pairing humans, bot opponents, re-queueing
//! - Duel: turn order, saves, loadouts from the catalog
//! - Reconnect: resuming a seat and forfeiting after the grace period

pub mod duel;
pub mod matchmaking;
pub mod reconnect;
