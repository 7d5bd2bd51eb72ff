//! Public façade composing the store, phase coordinator, scorer, and
//! submission service. Owns the store for the process lifetime.

use crate::config::GameConfig;
use crate::entity::{Agent, Dispute, DisputeStatus, Finding, FindingStatus, Game};
use crate::phase::{PhaseCoordinator, ScoreEntry};
use crate::repo::{AgentRepo, DisputeRepo, FindingRepo, GameRepo};
use crate::store::Store;
use crate::submission::SubmissionService;
use crate::{BonesError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-only snapshot of a game for status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    #[serde(flatten)]
    pub game: Game,
    pub scoreboard: Vec<ScoreEntry>,
    pub findings_total: i64,
    pub findings_valid: i64,
}

/// Engine façade. One per process; one game runs at a time.
pub struct Orchestrator {
    store: Arc<Store>,
    coordinator: PhaseCoordinator,
    submission: SubmissionService,
}

impl Orchestrator {
    /// Open the engine against `data_dir` (see [`crate::config::data_dir`]).
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let store = Arc::new(Store::open(data_dir)?);
        Ok(Self::with_store(store))
    }

    pub fn with_store(store: Arc<Store>) -> Self {
        let coordinator = PhaseCoordinator::new(store.clone());
        let submission = SubmissionService::new(store.clone());
        Self {
            store,
            coordinator,
            submission,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn coordinator(&self) -> &PhaseCoordinator {
        &self.coordinator
    }

    pub fn submission(&self) -> &SubmissionService {
        &self.submission
    }

    /// Create a game and its agents. Refuses when an unfinished game for
    /// the same project exists, unless `force` is set.
    pub fn create_game(&self, config: GameConfig, force: bool) -> Result<(Game, Vec<Agent>)> {
        config.validate()?;
        self.store.transaction(|conn| {
            if !force {
                if let Some(existing) = GameRepo::find_active_by_project(conn, &config.project)? {
                    return Err(BonesError::Precondition(format!(
                        "project '{}' already has unfinished game {}; pass --force to start anyway",
                        config.project, existing.id
                    )));
                }
            }
            let game = Game::new(config);
            GameRepo::create(conn, &game)?;
            let agents = AgentRepo::create_many(conn, &game.id, game.config.num_agents)?;
            info!(game = %game.id, agents = agents.len(), "game created");
            Ok((game, agents))
        })
    }

    pub fn get_game(&self, game_id: &str) -> Result<Game> {
        self.store.with_conn(|conn| {
            GameRepo::find_by_id(conn, game_id)?
                .ok_or_else(|| BonesError::GameNotFound(game_id.to_string()))
        })
    }

    pub fn list_games(&self) -> Result<Vec<Game>> {
        self.store.with_conn(GameRepo::find_all)
    }

    pub fn delete_game(&self, game_id: &str) -> Result<()> {
        let deleted = self
            .store
            .transaction(|conn| GameRepo::delete(conn, game_id))?;
        if !deleted {
            return Err(BonesError::GameNotFound(game_id.to_string()));
        }
        info!(game = game_id, "game deleted");
        Ok(())
    }

    pub fn status(&self, game_id: &str) -> Result<GameStatus> {
        self.store.with_conn(|conn| {
            let game = GameRepo::find_by_id(conn, game_id)?
                .ok_or_else(|| BonesError::GameNotFound(game_id.to_string()))?;
            let scoreboard = AgentRepo::scoreboard(conn, game_id)?
                .iter()
                .map(ScoreEntry::from)
                .collect();
            let findings_total = FindingRepo::count_by_round(conn, game_id, game.round)?;
            let findings_valid =
                FindingRepo::count_by_status(conn, game_id, FindingStatus::Valid)?;
            Ok(GameStatus {
                game,
                scoreboard,
                findings_total,
                findings_valid,
            })
        })
    }

    pub fn agents(&self, game_id: &str) -> Result<Vec<Agent>> {
        self.store
            .with_conn(|conn| AgentRepo::find_by_game_id(conn, game_id))
    }

    /// Findings for a game, optionally narrowed by round or status.
    pub fn findings(
        &self,
        game_id: &str,
        round: Option<u32>,
        status: Option<FindingStatus>,
    ) -> Result<Vec<Finding>> {
        self.store.with_conn(|conn| {
            let mut findings = FindingRepo::find_by_game(conn, game_id)?;
            if let Some(round) = round {
                findings.retain(|f| f.round == round);
            }
            if let Some(status) = status {
                findings.retain(|f| f.status == status);
            }
            Ok(findings)
        })
    }

    /// Disputes for a game, optionally narrowed by round or status.
    pub fn disputes(
        &self,
        game_id: &str,
        round: Option<u32>,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>> {
        self.store.with_conn(|conn| {
            let mut disputes = DisputeRepo::find_by_game(conn, game_id)?;
            if let Some(round) = round {
                disputes.retain(|d| d.round == round);
            }
            if let Some(status) = status {
                disputes.retain(|d| d.status == status);
            }
            Ok(disputes)
        })
    }
}
