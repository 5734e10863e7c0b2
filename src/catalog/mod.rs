//! Reference-data catalog
//!
//! Read-only source of factions, units and weapon profiles. Backed either by
//! the HTTP catalog service or by an in-memory table (tests, offline play).
//! Lookups that fail fall back to a placeholder unit so a match can always
//! proceed.

mod parse;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::combat::{DiceSource, KeywordDeriver, RuleDeriver, UnitSnapshot, WeaponProfile};
use crate::config::Config;

pub use parse::{leading_int, slug, MAX_STAT};

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog returned status {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("catalog response for {path} could not be decoded: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("faction {0:?} has no units")]
    EmptyFaction(String),
    #[error("unit {unit:?} not found in faction {faction:?}")]
    UnknownUnit { faction: String, unit: String },
}

/// A faction list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionRef {
    pub id: String,
    pub name: String,
}

/// A unit list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub id: String,
    pub name: String,
}

/// A fully loaded unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogUnit {
    pub id: String,
    pub faction: String,
    pub points: u32,
    pub snapshot: UnitSnapshot,
    pub weapons: Vec<WeaponProfile>,
}

impl CatalogUnit {
    /// Generic stat line used when the catalog has nothing better
    pub fn placeholder(faction: &str, name: &str) -> Self {
        let name = if name.trim().is_empty() {
            "Generic Squad"
        } else {
            name.trim()
        };
        Self {
            id: slug(name),
            faction: faction.to_string(),
            points: 0,
            snapshot: UnitSnapshot::placeholder(name),
            weapons: vec![WeaponProfile::bolter()],
        }
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    /// Weapons matching the requested names, in request order.
    ///
    /// Unknown names are skipped; an empty result falls back to the first
    /// weapon so a locked loadout always has something to shoot with.
    pub fn select_weapons(&self, names: &[String]) -> Vec<WeaponProfile> {
        let mut picked: Vec<WeaponProfile> = Vec::new();
        for name in names {
            if let Some(w) = self
                .weapons
                .iter()
                .find(|w| w.name.eq_ignore_ascii_case(name.trim()))
            {
                if !picked.iter().any(|p| p.name == w.name) {
                    picked.push(w.clone());
                }
            }
        }
        if picked.is_empty() {
            picked.extend(self.weapons.first().cloned());
        }
        picked
    }

    fn matches(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.snapshot.name.eq_ignore_ascii_case(key)
    }
}

/// One faction of an in-memory catalog
#[derive(Debug, Clone)]
pub struct MemoryFaction {
    pub faction: FactionRef,
    pub units: Vec<CatalogUnit>,
}

enum Backend {
    Http { client: Client, base_url: String },
    Memory(Vec<MemoryFaction>),
}

struct Cached<T> {
    at: Instant,
    value: T,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.at.elapsed() < ttl).then(|| self.value.clone())
    }
}

/// Catalog client with a TTL cache
pub struct Catalog {
    backend: Backend,
    deriver: Arc<dyn RuleDeriver>,
    ttl: Duration,
    factions: Mutex<Option<Cached<Vec<FactionRef>>>>,
    units: Mutex<HashMap<String, Cached<Vec<UnitRef>>>>,
    details: Mutex<HashMap<(String, String), Cached<CatalogUnit>>>,
}

impl Catalog {
    fn with_backend(backend: Backend, ttl: Duration) -> Self {
        Self {
            backend,
            deriver: Arc::new(KeywordDeriver),
            ttl,
            factions: Mutex::new(None),
            units: Mutex::new(HashMap::new()),
            details: Mutex::new(HashMap::new()),
        }
    }

    /// Client for the HTTP catalog service
    pub fn http(base_url: &str, ttl: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(Duration::from_secs(8)).build()?;
        Ok(Self::with_backend(
            Backend::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            ttl,
        ))
    }

    /// Catalog over a fixed in-memory table
    pub fn in_memory(factions: Vec<MemoryFaction>) -> Self {
        Self::with_backend(Backend::Memory(factions), Duration::MAX)
    }

    /// Empty catalog: every lookup yields the placeholder unit
    pub fn placeholder() -> Self {
        Self::in_memory(Vec::new())
    }

    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        match config.catalog_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Self::http(url, config.catalog_ttl()),
            _ => Ok(Self::placeholder()),
        }
    }

    /// Replace the rule deriver used when loading weapons and units
    pub fn with_deriver(mut self, deriver: Arc<dyn RuleDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    async fn get_json<T: DeserializeOwned>(
        client: &Client,
        base_url: &str,
        path: &str,
    ) -> Result<T, CatalogError> {
        let response = client
            .get(format!("{base_url}{path}"))
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| CatalogError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// All factions
    pub async fn factions(&self) -> Result<Vec<FactionRef>, CatalogError> {
        if let Some(hit) = self.factions.lock().as_ref().and_then(|c| c.fresh(self.ttl)) {
            return Ok(hit);
        }
        let list = match &self.backend {
            Backend::Http { client, base_url } => {
                Self::get_json::<Vec<FactionRef>>(client, base_url, "/api/factions").await?
            }
            Backend::Memory(table) => table.iter().map(|f| f.faction.clone()).collect(),
        };
        *self.factions.lock() = Some(Cached {
            at: Instant::now(),
            value: list.clone(),
        });
        Ok(list)
    }

    /// Units of a faction, sorted by name
    pub async fn units(&self, faction: &str) -> Result<Vec<UnitRef>, CatalogError> {
        let key = slug(faction);
        if let Some(hit) = self.units.lock().get(&key).and_then(|c| c.fresh(self.ttl)) {
            return Ok(hit);
        }
        let mut list = match &self.backend {
            Backend::Http { client, base_url } => {
                Self::get_json::<Vec<UnitRef>>(client, base_url, &format!("/api/{key}/units"))
                    .await?
            }
            Backend::Memory(table) => table
                .iter()
                .find(|f| slug(&f.faction.name) == key || slug(&f.faction.id) == key)
                .map(|f| {
                    f.units
                        .iter()
                        .map(|u| UnitRef {
                            id: u.id.clone(),
                            name: u.snapshot.name.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        if list.is_empty() {
            return Err(CatalogError::EmptyFaction(faction.to_string()));
        }
        list.sort_by_key(|u| u.name.to_lowercase());
        self.units.lock().insert(
            key,
            Cached {
                at: Instant::now(),
                value: list.clone(),
            },
        );
        Ok(list)
    }

    /// One unit with stats, weapons and points; `unit` may be an id or a name
    pub async fn unit(&self, faction: &str, unit: &str) -> Result<CatalogUnit, CatalogError> {
        let units = self.units(faction).await?;
        let entry = units
            .iter()
            .find(|u| u.id.eq_ignore_ascii_case(unit) || u.name.eq_ignore_ascii_case(unit))
            .ok_or_else(|| CatalogError::UnknownUnit {
                faction: faction.to_string(),
                unit: unit.to_string(),
            })?;
        self.load(faction, entry).await
    }

    async fn load(&self, faction: &str, entry: &UnitRef) -> Result<CatalogUnit, CatalogError> {
        let key = (slug(faction), entry.id.clone());
        if let Some(hit) = self.details.lock().get(&key).and_then(|c| c.fresh(self.ttl)) {
            return Ok(hit);
        }

        let loaded = match &self.backend {
            Backend::Memory(table) => table
                .iter()
                .find(|f| slug(&f.faction.name) == key.0 || slug(&f.faction.id) == key.0)
                .and_then(|f| f.units.iter().find(|u| u.matches(&entry.id)))
                .cloned()
                .ok_or_else(|| CatalogError::UnknownUnit {
                    faction: faction.to_string(),
                    unit: entry.id.clone(),
                })?,
            Backend::Http { client, base_url } => {
                self.fetch_unit(client, base_url, faction, &key.0, entry)
                    .await?
            }
        };

        self.details.lock().insert(
            key,
            Cached {
                at: Instant::now(),
                value: loaded.clone(),
            },
        );
        Ok(loaded)
    }

    async fn fetch_unit(
        &self,
        client: &Client,
        base_url: &str,
        faction: &str,
        faction_slug: &str,
        entry: &UnitRef,
    ) -> Result<CatalogUnit, CatalogError> {
        let base = format!("/api/{faction_slug}/{}", entry.id);
        let models: Vec<parse::ModelRow> =
            Self::get_json(client, base_url, &format!("{base}/models")).await?;

        // Secondary tables are optional
        let weapons: Vec<parse::WeaponRow> = Self::get_json(client, base_url, &format!("{base}/weapons"))
            .await
            .unwrap_or_default();
        let keywords: Vec<parse::KeywordRow> =
            Self::get_json(client, base_url, &format!("{base}/keywords"))
                .await
                .unwrap_or_default();
        let abilities: Vec<parse::AbilityRow> =
            Self::get_json(client, base_url, &format!("{base}/abilities"))
                .await
                .unwrap_or_default();
        let costs: Vec<parse::CostRow> = Self::get_json(client, base_url, &format!("{base}/costs"))
            .await
            .unwrap_or_default();

        let snapshot = parse::snapshot_from_rows(
            &entry.name,
            models.first(),
            &keywords,
            &abilities,
            self.deriver.as_ref(),
        );
        let mut profiles: Vec<WeaponProfile> = weapons
            .iter()
            .filter(|w| !w.name.trim().is_empty())
            .map(|w| parse::weapon_from_row(w, self.deriver.as_ref()))
            .collect();
        if profiles.is_empty() {
            profiles.push(WeaponProfile {
                name: "Generic".to_string(),
                strength: snapshot.toughness,
                ..WeaponProfile::bolter()
            });
        }

        debug!(
            "catalog: loaded {}/{} ({} weapons)",
            faction_slug,
            entry.id,
            profiles.len()
        );
        Ok(CatalogUnit {
            id: entry.id.clone(),
            faction: faction.to_string(),
            points: parse::points_from_costs(&costs),
            snapshot,
            weapons: profiles,
        })
    }

    /// Every unit of a faction, skipping ones that fail to load
    pub async fn faction_units(&self, faction: &str) -> Result<Vec<CatalogUnit>, CatalogError> {
        let refs = self.units(faction).await?;
        let mut out = Vec::with_capacity(refs.len());
        for entry in &refs {
            match self.load(faction, entry).await {
                Ok(unit) => out.push(unit),
                Err(e) => debug!("catalog: skipping {}: {}", entry.id, e),
            }
        }
        if out.is_empty() {
            return Err(CatalogError::EmptyFaction(faction.to_string()));
        }
        Ok(out)
    }

    /// Unit lookup that never fails.
    ///
    /// A missed unit falls back to the faction's first unit, then to the
    /// placeholder stat line.
    pub async fn resolve_unit(&self, faction: &str, unit: &str) -> CatalogUnit {
        match self.unit(faction, unit).await {
            Ok(found) => return found,
            Err(e) => warn!("catalog: {}", e),
        }
        if let Ok(units) = self.units(faction).await {
            if let Some(first) = units.first() {
                if let Ok(found) = self.load(faction, first).await {
                    return found;
                }
            }
        }
        CatalogUnit::placeholder(faction, unit)
    }

    /// Unit for a bot opponent: random faction, points closest to `points`
    pub async fn pick_bot_unit(
        &self,
        points: u32,
        dice: &mut (dyn DiceSource + Send),
    ) -> CatalogUnit {
        let factions = match self.factions().await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => return CatalogUnit::placeholder("", ""),
            Err(e) => {
                warn!("catalog: bot faction lookup failed: {}", e);
                return CatalogUnit::placeholder("", "");
            }
        };
        let index = dice.roll(factions.len() as u32) as usize - 1;
        let faction = &factions[index.min(factions.len() - 1)];

        match self.faction_units(&faction.name).await {
            Ok(units) => closest_points(units, points)
                .unwrap_or_else(|| CatalogUnit::placeholder(&faction.name, "")),
            Err(e) => {
                warn!("catalog: bot unit lookup failed: {}", e);
                CatalogUnit::placeholder(&faction.name, "")
            }
        }
    }
}

/// Unit whose points are nearest the target, first one on ties
pub fn closest_points(units: Vec<CatalogUnit>, points: u32) -> Option<CatalogUnit> {
    units
        .into_iter()
        .enumerate()
        .min_by_key(|(i, u)| (u.points.abs_diff(points), *i))
        .map(|(_, u)| u)
}
