// Player catalog: availability and ranking for fallback picks.
//
// Reads a ranked CSV with columns `player_id,name,position,rank`. Extra
// columns are ignored.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A draftable player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPlayer {
    pub player_id: String,
    pub name: String,
    pub position: String,
    /// League ranking; lower is better.
    pub rank: u32,
}

/// Source of player identity and ranking.
pub trait PlayerCatalog: Send + Sync {
    /// Look up a player by ID.
    fn player(&self, player_id: &str) -> Option<&CatalogPlayer>;

    /// All players, best first. Equal ranks keep insertion order.
    fn ranked(&self) -> &[CatalogPlayer];

    /// Highest-ranked player that is not taken and satisfies `fits`.
    fn best_available(
        &self,
        is_taken: &dyn Fn(&str) -> bool,
        fits: &dyn Fn(&CatalogPlayer) -> bool,
    ) -> Option<&CatalogPlayer> {
        self.ranked()
            .iter()
            .find(|p| !is_taken(&p.player_id) && fits(p))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("duplicate player id {0}")]
    DuplicatePlayer(String),
}

// ---------------------------------------------------------------------------
// In-memory ranked catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    player_id: String,
    name: String,
    position: String,
    rank: u32,
}

/// Catalog held entirely in memory, sorted by rank once at construction.
#[derive(Debug, Clone, Default)]
pub struct RankedCatalog {
    players: Vec<CatalogPlayer>,
    index: HashMap<String, usize>,
}

impl RankedCatalog {
    pub fn new(mut players: Vec<CatalogPlayer>) -> Result<Self, CatalogError> {
        // Stable sort keeps insertion order for equal ranks.
        players.sort_by_key(|p| p.rank);

        let mut index = HashMap::with_capacity(players.len());
        for (i, p) in players.iter().enumerate() {
            if index.insert(p.player_id.clone(), i).is_some() {
                return Err(CatalogError::DuplicatePlayer(p.player_id.clone()));
            }
        }
        Ok(RankedCatalog { players, index })
    }

    /// Load a catalog from a CSV file.
    pub fn load_csv(path: &Path) -> Result<Self, CatalogError> {
        let label = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| CatalogError::Io {
            path: label.clone(),
            source: e,
        })?;
        let catalog = Self::from_reader(file, &label)?;
        info!("Loaded {} players from {}", catalog.len(), label);
        Ok(catalog)
    }

    /// Parse CSV from any reader. `label` names the source in errors.
    pub fn from_reader<R: Read>(reader: R, label: &str) -> Result<Self, CatalogError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut players = Vec::new();
        for row in rdr.deserialize::<RawPlayerRow>() {
            let row = row.map_err(|e| CatalogError::Csv {
                path: label.to_string(),
                source: e,
            })?;
            players.push(CatalogPlayer {
                player_id: row.player_id,
                name: row.name,
                position: row.position.to_uppercase(),
                rank: row.rank,
            });
        }
        Self::new(players)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl PlayerCatalog for RankedCatalog {
    fn player(&self, player_id: &str) -> Option<&CatalogPlayer> {
        self.index.get(player_id).map(|&i| &self.players[i])
    }

    fn ranked(&self) -> &[CatalogPlayer] {
        &self.players
    }
}
