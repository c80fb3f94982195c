use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use super::model::GameEntry;
use crate::core::error::{LauncherError, LauncherResult};

/// `games.json` on disk.
pub struct GameStore {
    games_file: PathBuf,
}

impl GameStore {
    pub fn new(games_file: PathBuf) -> Self {
        Self { games_file }
    }

    /// Every stored game. A missing file is an empty library; a corrupt one
    /// is logged and treated as empty rather than failing the caller.
    pub async fn load(&self) -> LauncherResult<Vec<GameEntry>> {
        if !self.games_file.exists() {
            return Ok(Vec::new());
        }

        let json = tokio::fs::read_to_string(&self.games_file)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.games_file.clone(),
                source: e,
            })?;

        let games: Vec<GameEntry> = match serde_json::from_str(&json) {
            Ok(games) => games,
            Err(e) => {
                warn!("Error loading {:?}: {}", self.games_file, e);
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        Ok(games
            .into_iter()
            .filter(|game| {
                if game.name.trim().is_empty() {
                    warn!("Skipping game without a name in {:?}", self.games_file);
                    return false;
                }
                if !seen.insert(game.name.clone()) {
                    warn!("Skipping duplicate game '{}'", game.name);
                    return false;
                }
                true
            })
            .collect())
    }

    pub async fn save(&self, games: &[GameEntry]) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(games)?;

        if let Some(parent) = self.games_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        tokio::fs::write(&self.games_file, json)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.games_file.clone(),
                source: e,
            })
    }

    /// Validate and append a game. Names are unique.
    pub async fn add(&self, game: GameEntry) -> LauncherResult<()> {
        game.validate()?;

        let mut games = self.load().await?;
        if games.iter().any(|existing| existing.name == game.name) {
            return Err(LauncherError::InvalidGame {
                game: game.name,
                reason: "a game with this name already exists".into(),
            });
        }

        info!("Added game: {}", game.name);
        games.push(game);
        self.save(&games).await
    }

    /// Returns `false` when no game has that name.
    pub async fn remove(&self, name: &str) -> LauncherResult<bool> {
        let mut games = self.load().await?;
        let before = games.len();
        games.retain(|game| game.name != name);
        if games.len() == before {
            return Ok(false);
        }

        self.save(&games).await?;
        info!("Removed game: {}", name);
        Ok(true)
    }

    pub async fn find(&self, name: &str) -> LauncherResult<Option<GameEntry>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|game| game.name == name))
    }
}
