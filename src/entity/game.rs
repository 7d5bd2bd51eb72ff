//! Game aggregate root.

use crate::config::GameConfig;
use crate::entity::GamePhase;
use crate::{BonesError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Generate a unique game ID.
pub fn generate_game_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u16 = rand::random();
    format!("game-{:x}-{:04x}", timestamp, suffix)
}

/// A tournament game: config fixed at creation plus mutable round state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub config: GameConfig,
    pub phase: GamePhase,
    /// Round counter; 0 before the first hunt, incremented on each hunt start.
    pub round: u32,
    /// Deadline of the current timed phase; None outside Hunt/Review.
    pub phase_deadline: Option<DateTime<Utc>>,
    pub winner_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self {
            id: generate_game_id(),
            config,
            phase: GamePhase::Setup,
            round: 0,
            phase_deadline: None,
            winner_agent_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn require_phase(&self, allowed: &[GamePhase], requested: GamePhase) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(BonesError::InvalidPhase {
                current: self.phase.to_string(),
                requested: requested.to_string(),
            })
        }
    }

    /// Begin a hunt round. Legal from Setup (first round) or ReviewScoring
    /// (subsequent rounds). Increments the round counter and arms the
    /// deadline.
    pub fn begin_hunt(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_phase(&[GamePhase::Setup, GamePhase::ReviewScoring], GamePhase::Hunt)?;
        self.phase = GamePhase::Hunt;
        self.round += 1;
        self.phase_deadline = Some(now + Duration::seconds(self.config.hunt_duration_secs as i64));
        Ok(())
    }

    /// Move to hunt scoring. A timeout counts as completion, so this does
    /// not require all agents done.
    pub fn begin_hunt_scoring(&mut self) -> Result<()> {
        self.require_phase(&[GamePhase::Hunt], GamePhase::HuntScoring)?;
        self.phase = GamePhase::HuntScoring;
        self.phase_deadline = None;
        Ok(())
    }

    pub fn begin_review(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_phase(&[GamePhase::HuntScoring], GamePhase::Review)?;
        self.phase = GamePhase::Review;
        self.phase_deadline =
            Some(now + Duration::seconds(self.config.review_duration_secs as i64));
        Ok(())
    }

    pub fn begin_review_scoring(&mut self) -> Result<()> {
        self.require_phase(&[GamePhase::Review], GamePhase::ReviewScoring)?;
        self.phase = GamePhase::ReviewScoring;
        self.phase_deadline = None;
        Ok(())
    }

    /// Terminal transition; winner set iff the game completes.
    pub fn complete(&mut self, winner_agent_id: String, now: DateTime<Utc>) -> Result<()> {
        self.require_phase(&[GamePhase::ReviewScoring], GamePhase::Complete)?;
        self.phase = GamePhase::Complete;
        self.phase_deadline = None;
        self.winner_agent_id = Some(winner_agent_id);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Seconds until the phase deadline, clamped at zero. None outside
    /// timed phases.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.phase_deadline
            .map(|deadline| (deadline - now).num_seconds().max(0))
    }

    pub fn deadline_expired(&self, now: DateTime<Utc>) -> bool {
        self.phase_deadline
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }

    /// Whether the round cap applies and has been reached.
    pub fn at_round_cap(&self) -> bool {
        self.config.max_rounds > 0 && self.round >= self.config.max_rounds
    }
}
