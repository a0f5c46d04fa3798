//! Location identifier to region lookup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use tracing::info;

/// The jurisdiction a location resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Manhattan,
    Brooklyn,
    Queens,
    Bronx,
    StatenIsland,
    /// Newark airport, outside the city's taxing authority.
    Ewr,
}

impl Region {
    /// Parses the borough column of the zone table. Unknown values, including
    /// the table's own `Unknown` and `N/A` rows, do not resolve.
    pub fn from_borough(name: &str) -> Option<Self> {
        match name.trim() {
            "Manhattan" => Some(Self::Manhattan),
            "Brooklyn" => Some(Self::Brooklyn),
            "Queens" => Some(Self::Queens),
            "Bronx" => Some(Self::Bronx),
            "Staten Island" => Some(Self::StatenIsland),
            "EWR" => Some(Self::Ewr),
            _ => None,
        }
    }

    /// True for the five boroughs, false for the excluded airport region.
    pub fn is_named(&self) -> bool {
        !matches!(self, Self::Ewr)
    }
}

#[derive(Deserialize)]
struct ZoneRow {
    #[serde(rename = "LocationID")]
    location_id: i64,
    #[serde(rename = "Borough")]
    borough: String,
}

/// Static table of every known location id.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    known: HashMap<i64, Option<Region>>,
}

impl ZoneRegistry {
    #[tracing::instrument]
    pub fn load(path: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open zone table '{path}'"))?;
        let registry =
            Self::read(file).with_context(|| format!("failed to load zone table '{path}'"))?;
        info!(zones = registry.len(), "Zone table loaded");
        Ok(registry)
    }

    /// Reads a `LocationID,Borough,...` table. Any unreadable row fails the load.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut known = HashMap::new();
        for row in rdr.deserialize() {
            let row: ZoneRow = row?;
            known.insert(row.location_id, Region::from_borough(&row.borough));
        }
        Ok(Self { known })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (i64, Option<Region>)>) -> Self {
        Self {
            known: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Whether the id appears in the table at all.
    pub fn contains(&self, location_id: i64) -> bool {
        self.known.contains_key(&location_id)
    }

    /// The region for `location_id`, or `None` when unknown or unresolved.
    pub fn region(&self, location_id: i64) -> Option<Region> {
        self.known.get(&location_id).copied().flatten()
    }
}
