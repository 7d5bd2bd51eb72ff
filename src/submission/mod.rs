//! Agent-facing operations with their preconditions: submitting findings,
//! filing disputes, referee validation, verification, dispute resolution,
//! and done-marking.

use crate::entity::{
    Dispute, DisputeVerdict, Finding, Game, GamePhase, HuntCategory, VerificationStatus,
};
use crate::repo::{AgentRepo, DisputeRepo, FindingRepo, GameRepo};
use crate::scoring::{pattern_hash, ResolutionApplied, Scorer, ValidationApplied, ValidationRequest};
use crate::store::Store;
use crate::{BonesError, Result};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

/// Verifier decision on a verification-pending finding.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationApplied {
    pub finding_id: i64,
    pub confirmed: bool,
    pub points: i64,
}

/// Precondition-rich front door for everything agents and referees do.
pub struct SubmissionService {
    store: Arc<Store>,
    scorer: Scorer,
}

impl SubmissionService {
    pub fn new(store: Arc<Store>) -> Self {
        let scorer = Scorer::new(store.clone());
        Self { store, scorer }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    fn load_game(conn: &Connection, game_id: &str) -> Result<Game> {
        GameRepo::find_by_id(conn, game_id)?
            .ok_or_else(|| BonesError::GameNotFound(game_id.to_string()))
    }

    fn load_agent_in_game(
        conn: &Connection,
        game_id: &str,
        agent_id: &str,
    ) -> Result<crate::entity::Agent> {
        let agent = AgentRepo::find_by_id(conn, agent_id)?
            .ok_or_else(|| BonesError::AgentNotFound(agent_id.to_string()))?;
        if agent.game_id != game_id {
            return Err(BonesError::AgentNotFound(agent_id.to_string()));
        }
        Ok(agent)
    }

    fn load_finding_in_game(conn: &Connection, game_id: &str, finding_id: i64) -> Result<Finding> {
        let finding = FindingRepo::find_by_id(conn, finding_id)?
            .ok_or(BonesError::FindingNotFound(finding_id))?;
        if finding.game_id != game_id {
            return Err(BonesError::FindingNotFound(finding_id));
        }
        Ok(finding)
    }

    fn require_phase(game: &Game, required: GamePhase) -> Result<()> {
        if game.phase == required {
            Ok(())
        } else {
            Err(BonesError::InvalidPhase {
                current: game.phase.to_string(),
                requested: required.to_string(),
            })
        }
    }

    /// Record a finding during the hunt. Returns the newly assigned id.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_finding(
        &self,
        game_id: &str,
        agent_id: &str,
        file_path: &str,
        line_start: u32,
        line_end: u32,
        description: &str,
        code_snippet: Option<String>,
    ) -> Result<i64> {
        self.store.transaction(|conn| {
            let game = Self::load_game(conn, game_id)?;
            Self::require_phase(&game, GamePhase::Hunt)?;
            let mut agent = Self::load_agent_in_game(conn, game_id, agent_id)?;
            if agent.has_finished_hunt(game.round) {
                return Err(BonesError::Precondition(format!(
                    "agent {} already finished hunting round {}",
                    agent_id, game.round
                )));
            }
            if line_end < line_start {
                return Err(BonesError::Precondition(format!(
                    "line range {}-{} is inverted",
                    line_start, line_end
                )));
            }
            if game.config.category == HuntCategory::DocDrift
                && code_snippet.as_deref().map(str::trim).unwrap_or("").is_empty()
            {
                return Err(BonesError::Precondition(
                    "doc_drift findings require a code snippet in DOC/CODE/CONTRADICTION \
                     format: the documented claim, the actual code, and the contradiction"
                        .to_string(),
                ));
            }

            let hash = pattern_hash(file_path, line_start, line_end, description);
            let mut finding = Finding::new(
                game_id,
                agent_id,
                game.round,
                file_path,
                line_start,
                line_end,
                description,
                code_snippet,
                hash,
            );
            let id = FindingRepo::create(conn, &mut finding)?;
            agent.touch_heartbeat(Utc::now());
            AgentRepo::update(conn, &agent)?;
            info!(game = game_id, agent = agent_id, finding = id, "finding submitted");
            Ok(id)
        })
    }

    /// File a dispute against another agent's valid finding. Returns the
    /// newly assigned id.
    pub fn submit_dispute(
        &self,
        game_id: &str,
        agent_id: &str,
        finding_id: i64,
        reason: &str,
    ) -> Result<i64> {
        self.store.transaction(|conn| {
            let game = Self::load_game(conn, game_id)?;
            Self::require_phase(&game, GamePhase::Review)?;
            let mut agent = Self::load_agent_in_game(conn, game_id, agent_id)?;
            if agent.has_finished_review(game.round) {
                return Err(BonesError::Precondition(format!(
                    "agent {} already finished reviewing round {}",
                    agent_id, game.round
                )));
            }
            let finding = Self::load_finding_in_game(conn, game_id, finding_id)?;
            if !finding.is_valid() {
                return Err(BonesError::Precondition(format!(
                    "finding {} is '{}'; only valid findings can be disputed",
                    finding_id, finding.status
                )));
            }
            if finding.agent_id == agent_id {
                return Err(BonesError::Precondition(
                    "agents cannot dispute their own findings".to_string(),
                ));
            }
            if DisputeRepo::has_agent_disputed(conn, finding_id, agent_id)? {
                return Err(BonesError::Precondition(format!(
                    "agent {} already disputed finding {}",
                    agent_id, finding_id
                )));
            }

            let mut dispute = Dispute::new(game_id, finding_id, agent_id, game.round, reason);
            let id = DisputeRepo::create(conn, &mut dispute)?;
            agent.touch_heartbeat(Utc::now());
            AgentRepo::update(conn, &agent)?;
            info!(game = game_id, agent = agent_id, dispute = id, "dispute filed");
            Ok(id)
        })
    }

    /// Referee decision on a finding. Delegates to the scorer, which
    /// performs the in-transaction duplicate re-check.
    pub fn validate_finding(
        &self,
        game_id: &str,
        finding_id: i64,
        req: ValidationRequest,
    ) -> Result<ValidationApplied> {
        let finding = self.store.with_conn(|conn| {
            Self::load_game(conn, game_id)?;
            Self::load_finding_in_game(conn, game_id, finding_id)
        })?;
        self.scorer.apply_finding_validation(finding, req)
    }

    /// Verifier decision on a verification-pending finding. Awards the
    /// resulting points and the matching stat to the owning agent.
    pub fn verify_finding(
        &self,
        game_id: &str,
        finding_id: i64,
        confirmed: bool,
        explanation: &str,
        overridden_type: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<VerificationApplied> {
        self.store.transaction(|conn| {
            Self::load_game(conn, game_id)?;
            let mut finding = Self::load_finding_in_game(conn, game_id, finding_id)?;
            if finding.verification_status != VerificationStatus::Pending {
                return Err(BonesError::Precondition(format!(
                    "finding {} has verification status '{}'; nothing to verify",
                    finding_id,
                    finding.verification_status.as_str()
                )));
            }
            let mut agent = AgentRepo::find_by_id(conn, &finding.agent_id)?
                .ok_or_else(|| BonesError::AgentNotFound(finding.agent_id.clone()))?;

            let points =
                finding.apply_verification(confirmed, explanation, overridden_type, rejection_reason)?;
            agent.apply_points(points);
            if confirmed {
                agent.record_valid_finding();
            } else {
                agent.record_false_finding();
            }
            crate::scoring::maybe_eliminate(&mut agent);
            FindingRepo::update(conn, &finding)?;
            AgentRepo::update(conn, &agent)?;
            info!(game = game_id, finding = finding_id, confirmed, points, "finding verified");
            Ok(VerificationApplied {
                finding_id,
                confirmed,
                points,
            })
        })
    }

    /// Referee decision on a dispute. Delegates to the scorer.
    pub fn resolve_dispute(
        &self,
        game_id: &str,
        dispute_id: i64,
        verdict: DisputeVerdict,
        explanation: &str,
    ) -> Result<ResolutionApplied> {
        let (dispute, finding) = self.store.with_conn(|conn| {
            Self::load_game(conn, game_id)?;
            let dispute = DisputeRepo::find_by_id(conn, dispute_id)?
                .ok_or(BonesError::DisputeNotFound(dispute_id))?;
            if dispute.game_id != game_id {
                return Err(BonesError::DisputeNotFound(dispute_id));
            }
            let finding = Self::load_finding_in_game(conn, game_id, dispute.finding_id)?;
            Ok((dispute, finding))
        })?;
        self.scorer
            .apply_dispute_resolution(dispute, finding, verdict, explanation)
    }

    /// Agent signals it is finished with the current hunt or review round.
    /// Returns the round it was marked done for.
    pub fn mark_agent_done(
        &self,
        game_id: &str,
        agent_id: &str,
        phase: GamePhase,
    ) -> Result<u32> {
        if !phase.is_timed() {
            return Err(BonesError::Precondition(format!(
                "agents signal completion for hunt or review, not '{}'",
                phase
            )));
        }
        self.store.transaction(|conn| {
            let game = Self::load_game(conn, game_id)?;
            Self::require_phase(&game, phase)?;
            let mut agent = Self::load_agent_in_game(conn, game_id, agent_id)?;
            match phase {
                GamePhase::Hunt => agent.mark_hunt_done(game.round),
                _ => agent.mark_review_done(game.round),
            }
            agent.touch_heartbeat(Utc::now());
            AgentRepo::update(conn, &agent)?;
            info!(game = game_id, agent = agent_id, phase = %phase, round = game.round, "agent done");
            Ok(game.round)
        })
    }
}
