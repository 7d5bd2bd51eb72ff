//! Phase state machine: transitions, deadline math, per-phase checks, and
//! winner determination.
//!
//! ```text
//! Setup ──start_hunt──► Hunt ──start_hunt_scoring──► HuntScoring
//!    ▲                                                    │
//!    │                                              start_review
//!    │                                                    ▼
//!    └◄──start_hunt── ReviewScoring ◄─start_review_scoring─ Review
//!                         │
//!                         └──check_winner──► Complete (terminal)
//! ```

pub mod prompts;

use crate::entity::{Agent, AgentStatus, Game, GamePhase};
use crate::repo::{AgentRepo, DisputeRepo, FindingRepo, GameRepo};
use crate::store::Store;
use crate::{BonesError, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A rendered prompt addressed to one agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPrompt {
    pub agent_id: String,
    pub short_name: String,
    pub prompt: String,
}

/// A rendered referee or verifier prompt for one finding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingPrompt {
    pub finding_id: i64,
    pub prompt: String,
}

/// A rendered referee prompt for one dispute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputePrompt {
    pub dispute_id: i64,
    pub finding_id: i64,
    pub prompt: String,
}

/// Result of starting a timed phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStart {
    pub game_id: String,
    pub phase: GamePhase,
    pub round: u32,
    pub deadline: DateTime<Utc>,
    pub prompts: Vec<AgentPrompt>,
}

/// Status snapshot of a timed phase. Never mutates state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCheck {
    pub game_id: String,
    pub phase: GamePhase,
    pub round: u32,
    pub time_expired: bool,
    pub remaining_seconds: i64,
    pub all_agents_finished: bool,
    pub ready_for_scoring: bool,
    pub pending: Vec<String>,
}

/// Result of starting hunt scoring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HuntScoringStart {
    pub game_id: String,
    pub round: u32,
    pub pending_findings: usize,
    pub prompts: Vec<FindingPrompt>,
}

/// Result of starting review scoring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewScoringStart {
    pub game_id: String,
    pub round: u32,
    pub pending_disputes: usize,
    pub prompts: Vec<DisputePrompt>,
}

/// One scoreboard line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub agent_id: String,
    pub short_name: String,
    pub score: i64,
    pub findings_valid: u32,
    pub status: AgentStatus,
}

impl From<&Agent> for ScoreEntry {
    fn from(agent: &Agent) -> Self {
        Self {
            agent_id: agent.id.clone(),
            short_name: agent.short_name.clone(),
            score: agent.score,
            findings_valid: agent.findings_valid,
            status: agent.status,
        }
    }
}

/// Outcome of winner determination.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all_fields = "camelCase")]
pub enum WinnerOutcome {
    /// The game is over; the winner is marked and the game completed.
    #[serde(rename = "GAME_COMPLETE")]
    GameComplete {
        winner_id: String,
        reason: String,
        final_scores: Vec<ScoreEntry>,
    },
    /// Several agents reached the target; play another round to break it.
    #[serde(rename = "TIE_BREAKER")]
    TieBreaker {
        contenders: Vec<String>,
        scores: Vec<ScoreEntry>,
    },
    /// No terminal condition; the next round may begin.
    #[serde(rename = "CONTINUE")]
    Continue { scores: Vec<ScoreEntry> },
}

/// Drives phase transitions and assembles per-phase prompts.
pub struct PhaseCoordinator {
    store: Arc<Store>,
}

impl PhaseCoordinator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn load_game(conn: &rusqlite::Connection, game_id: &str) -> Result<Game> {
        GameRepo::find_by_id(conn, game_id)?
            .ok_or_else(|| BonesError::GameNotFound(game_id.to_string()))
    }

    /// Transition into Hunt, arm the deadline, and render one hunt prompt
    /// per active agent.
    pub fn start_hunt(&self, game_id: &str) -> Result<PhaseStart> {
        self.store.transaction(|conn| {
            let mut game = Self::load_game(conn, game_id)?;
            game.begin_hunt(Utc::now())?;
            GameRepo::update(conn, &game)?;

            let agents = AgentRepo::find_active(conn, game_id)?;
            let prompts = agents
                .iter()
                .map(|agent| AgentPrompt {
                    agent_id: agent.id.clone(),
                    short_name: agent.short_name.clone(),
                    prompt: prompts::hunt_prompt(&game, agent),
                })
                .collect();

            info!(game = game_id, round = game.round, "hunt started");
            Ok(PhaseStart {
                game_id: game.id.clone(),
                phase: game.phase,
                round: game.round,
                deadline: game.phase_deadline.expect("hunt phase sets a deadline"),
                prompts,
            })
        })
    }

    /// Snapshot hunt progress. Read-only.
    pub fn check_hunt(&self, game_id: &str) -> Result<PhaseCheck> {
        self.check_timed_phase(game_id, GamePhase::Hunt)
    }

    /// Transition into HuntScoring and render one referee prompt per
    /// pending finding. A timeout counts as completion, so agents still
    /// running do not block this.
    pub fn start_hunt_scoring(&self, game_id: &str) -> Result<HuntScoringStart> {
        self.store.transaction(|conn| {
            let mut game = Self::load_game(conn, game_id)?;
            game.begin_hunt_scoring()?;
            GameRepo::update(conn, &game)?;

            let pending = FindingRepo::find_pending_by_round(conn, game_id, game.round)?;
            let prompts = pending
                .iter()
                .map(|finding| FindingPrompt {
                    finding_id: finding.id,
                    prompt: prompts::referee_finding_prompt(&game, finding),
                })
                .collect();

            info!(
                game = game_id,
                round = game.round,
                pending = pending.len(),
                "hunt scoring started"
            );
            Ok(HuntScoringStart {
                game_id: game.id.clone(),
                round: game.round,
                pending_findings: pending.len(),
                prompts,
            })
        })
    }

    /// Verifier prompts for this round's verification-pending findings.
    /// Read-only; the verification pass is not a phase transition.
    pub fn verification_prompts(&self, game_id: &str) -> Result<Vec<FindingPrompt>> {
        self.store.with_conn(|conn| {
            let game = Self::load_game(conn, game_id)?;
            let pending =
                FindingRepo::find_pending_verification_by_round(conn, game_id, game.round)?;
            Ok(pending
                .iter()
                .map(|finding| FindingPrompt {
                    finding_id: finding.id,
                    prompt: prompts::verifier_prompt(&game, finding),
                })
                .collect())
        })
    }

    /// Transition into Review, arm the deadline, and render one review
    /// prompt per active agent listing the findings it may dispute.
    pub fn start_review(&self, game_id: &str) -> Result<PhaseStart> {
        self.store.transaction(|conn| {
            let mut game = Self::load_game(conn, game_id)?;
            game.begin_review(Utc::now())?;
            GameRepo::update(conn, &game)?;

            let agents = AgentRepo::find_active(conn, game_id)?;
            let mut prompts = Vec::with_capacity(agents.len());
            for agent in &agents {
                let reviewable = FindingRepo::find_reviewable_for_agent(conn, game_id, &agent.id)?;
                prompts.push(AgentPrompt {
                    agent_id: agent.id.clone(),
                    short_name: agent.short_name.clone(),
                    prompt: prompts::review_prompt(&game, agent, &reviewable),
                });
            }

            info!(game = game_id, round = game.round, "review started");
            Ok(PhaseStart {
                game_id: game.id.clone(),
                phase: game.phase,
                round: game.round,
                deadline: game.phase_deadline.expect("review phase sets a deadline"),
                prompts,
            })
        })
    }

    /// Snapshot review progress. Read-only.
    pub fn check_review(&self, game_id: &str) -> Result<PhaseCheck> {
        self.check_timed_phase(game_id, GamePhase::Review)
    }

    /// Transition into ReviewScoring and render one referee prompt per
    /// pending dispute.
    pub fn start_review_scoring(&self, game_id: &str) -> Result<ReviewScoringStart> {
        self.store.transaction(|conn| {
            let mut game = Self::load_game(conn, game_id)?;
            game.begin_review_scoring()?;
            GameRepo::update(conn, &game)?;

            let disputes = DisputeRepo::find_pending_by_round(conn, game_id, game.round)?;
            let mut prompts = Vec::with_capacity(disputes.len());
            for dispute in &disputes {
                let finding = FindingRepo::find_by_id(conn, dispute.finding_id)?
                    .ok_or(BonesError::FindingNotFound(dispute.finding_id))?;
                prompts.push(DisputePrompt {
                    dispute_id: dispute.id,
                    finding_id: finding.id,
                    prompt: prompts::referee_dispute_prompt(&game, dispute, &finding),
                });
            }

            info!(
                game = game_id,
                round = game.round,
                pending = disputes.len(),
                "review scoring started"
            );
            Ok(ReviewScoringStart {
                game_id: game.id.clone(),
                round: game.round,
                pending_disputes: disputes.len(),
                prompts,
            })
        })
    }

    /// Decide the round outcome. Terminal outcomes complete the game and
    /// mark the winner; otherwise the game stays in ReviewScoring awaiting
    /// the next `start_hunt`.
    pub fn check_winner(&self, game_id: &str) -> Result<WinnerOutcome> {
        self.check_winner_with_rng(game_id, &mut rand::thread_rng())
    }

    /// RNG-injectable variant of [`PhaseCoordinator::check_winner`]; the
    /// round-cap tie is broken by a uniformly random pick.
    pub fn check_winner_with_rng<R: Rng>(&self, game_id: &str, rng: &mut R) -> Result<WinnerOutcome> {
        self.store.transaction(|conn| {
            let mut game = Self::load_game(conn, game_id)?;
            if game.phase != GamePhase::ReviewScoring {
                return Err(BonesError::InvalidPhase {
                    current: game.phase.to_string(),
                    requested: GamePhase::ReviewScoring.to_string(),
                });
            }

            let board = AgentRepo::scoreboard(conn, game_id)?;
            let scores: Vec<ScoreEntry> = board.iter().map(ScoreEntry::from).collect();
            let reached: Vec<&Agent> = board
                .iter()
                .filter(|a| a.score >= game.config.target_score)
                .collect();

            if reached.len() == 1 {
                let winner = reached[0];
                let reason = format!(
                    "{} reached the target score of {} with {}",
                    winner.short_name, game.config.target_score, winner.score
                );
                return Self::finish(conn, &mut game, winner, reason, scores);
            }

            if reached.len() > 1 {
                let contenders: Vec<String> = reached.iter().map(|a| a.id.clone()).collect();
                info!(game = game_id, ?contenders, "target reached by several agents");
                return Ok(WinnerOutcome::TieBreaker { contenders, scores });
            }

            if game.at_round_cap() {
                let leader = board.first().ok_or_else(|| {
                    BonesError::Invariant(format!("game {} has no agents", game_id))
                })?;
                let tied: Vec<&Agent> =
                    board.iter().filter(|a| a.score == leader.score).collect();
                let (winner, reason) = if tied.len() > 1 {
                    let names: Vec<&str> =
                        tied.iter().map(|a| a.short_name.as_str()).collect();
                    let pick = *tied.choose(rng).expect("tied set is non-empty");
                    (
                        pick,
                        format!(
                            "round cap of {} reached with {} tied at {}; {} won the random tiebreak",
                            game.config.max_rounds,
                            names.join(", "),
                            leader.score,
                            pick.short_name
                        ),
                    )
                } else {
                    (
                        leader,
                        format!(
                            "round cap of {} reached; {} leads with {}",
                            game.config.max_rounds, leader.short_name, leader.score
                        ),
                    )
                };
                return Self::finish(conn, &mut game, winner, reason, scores);
            }

            Ok(WinnerOutcome::Continue { scores })
        })
    }

    fn finish(
        conn: &rusqlite::Connection,
        game: &mut Game,
        winner: &Agent,
        reason: String,
        final_scores: Vec<ScoreEntry>,
    ) -> Result<WinnerOutcome> {
        game.complete(winner.id.clone(), Utc::now())?;
        GameRepo::update(conn, game)?;
        let mut winner = winner.clone();
        winner.status = AgentStatus::Winner;
        AgentRepo::update(conn, &winner)?;
        info!(game = %game.id, winner = %winner.id, %reason, "game complete");
        Ok(WinnerOutcome::GameComplete {
            winner_id: winner.id,
            reason,
            final_scores,
        })
    }

    fn check_timed_phase(&self, game_id: &str, expected: GamePhase) -> Result<PhaseCheck> {
        self.store.with_conn(|conn| {
            let game = Self::load_game(conn, game_id)?;
            if game.phase != expected {
                return Err(BonesError::InvalidPhase {
                    current: game.phase.to_string(),
                    requested: expected.to_string(),
                });
            }
            let now = Utc::now();
            let pending = match expected {
                GamePhase::Hunt => AgentRepo::get_pending_hunt_agents(conn, game_id, game.round)?,
                _ => AgentRepo::get_pending_review_agents(conn, game_id, game.round)?,
            };
            let time_expired = game.deadline_expired(now);
            let all_agents_finished = pending.is_empty();
            Ok(PhaseCheck {
                game_id: game.id.clone(),
                phase: game.phase,
                round: game.round,
                time_expired,
                remaining_seconds: game.remaining_seconds(now).unwrap_or(0),
                all_agents_finished,
                ready_for_scoring: time_expired || all_agents_finished,
                pending: pending.into_iter().map(|a| a.id).collect(),
            })
        })
    }
}
