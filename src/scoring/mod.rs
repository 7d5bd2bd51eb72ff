//! Transactional scoring: applying referee verdicts and dispute outcomes.
//!
//! Every operation here runs inside a single store transaction so partial
//! score updates are never observable. The duplicate re-check happens
//! inside the validation transaction, which closes the check-then-mark
//! race between referees validating colliding findings.

mod pattern;

pub use pattern::{normalize_tokens, pattern_hash, similarity, SIMILARITY_THRESHOLD};

use crate::entity::{
    Agent, AgentStatus, Confidence, Dispute, DisputeVerdict, Finding, FindingVerdict,
    VerificationStatus,
};
use crate::repo::{AgentRepo, DisputeRepo, FindingRepo};
use crate::store::Store;
use crate::{BonesError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Agents at or below this score are eliminated from later rounds.
pub const ELIMINATION_FLOOR: i64 = -10;

/// Referee decision on a finding, as passed to the scorer.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub verdict: FindingVerdict,
    pub explanation: String,
    pub confidence: Option<Confidence>,
    pub confidence_score: Option<u8>,
    pub duplicate_of: Option<i64>,
    pub issue_type: Option<String>,
    pub impact_tier: Option<String>,
    pub rejection_reason: Option<String>,
    pub needs_verification: bool,
}

impl ValidationRequest {
    pub fn new(verdict: FindingVerdict, explanation: impl Into<String>) -> Self {
        Self {
            verdict,
            explanation: explanation.into(),
            confidence: None,
            confidence_score: None,
            duplicate_of: None,
            issue_type: None,
            impact_tier: None,
            rejection_reason: None,
            needs_verification: false,
        }
    }
}

/// Outcome of applying a validation, after any duplicate override.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationApplied {
    pub finding_id: i64,
    pub verdict: FindingVerdict,
    pub duplicate_of: Option<i64>,
    pub points: i64,
    pub verification_pending: bool,
}

/// Outcome of resolving a dispute.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionApplied {
    pub dispute_id: i64,
    pub finding_id: i64,
    pub verdict: DisputeVerdict,
    pub disputer_points: i64,
    pub finding_revoked: bool,
}

/// Applies validation and dispute outcomes to finding and agent state.
pub struct Scorer {
    store: Arc<Store>,
}

impl Scorer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Apply a referee verdict to a pending finding.
    ///
    /// When the incoming verdict is VALID, the pattern hash is re-checked
    /// against already-valid findings inside the transaction; a match
    /// overrides the verdict to DUPLICATE of the earliest match, so two
    /// referees validating colliding findings can never both produce Valid.
    pub fn apply_finding_validation(
        &self,
        finding: Finding,
        req: ValidationRequest,
    ) -> Result<ValidationApplied> {
        self.store.transaction(|conn| {
            // Re-read inside the transaction; the caller's copy may be stale.
            let mut finding = FindingRepo::find_by_id(conn, finding.id)?
                .ok_or(BonesError::FindingNotFound(finding.id))?;
            let mut agent = AgentRepo::find_by_id(conn, &finding.agent_id)?
                .ok_or_else(|| BonesError::AgentNotFound(finding.agent_id.clone()))?;

            let mut verdict = req.verdict;
            let mut duplicate_of = req.duplicate_of;
            let mut needs_verification = req.needs_verification;

            if verdict == FindingVerdict::Valid {
                let matches = FindingRepo::find_by_pattern_hash(
                    conn,
                    &finding.game_id,
                    &finding.pattern_hash,
                    true,
                )?;
                if let Some(existing) = matches.iter().find(|m| m.id != finding.id) {
                    debug!(
                        finding = finding.id,
                        original = existing.id,
                        "pattern hash collision, overriding verdict to duplicate"
                    );
                    verdict = FindingVerdict::Duplicate;
                    duplicate_of = Some(existing.id);
                    needs_verification = false;
                }
            }

            let points = match verdict {
                FindingVerdict::Valid => {
                    let points = finding.validate(
                        &req.explanation,
                        req.confidence.unwrap_or(Confidence::Medium),
                        req.confidence_score,
                        req.issue_type.clone(),
                        req.impact_tier.clone(),
                        needs_verification,
                    )?;
                    if !needs_verification {
                        agent.apply_points(points);
                        agent.record_valid_finding();
                    }
                    points
                }
                FindingVerdict::False => {
                    let points =
                        finding.mark_false(&req.explanation, req.rejection_reason.clone())?;
                    agent.apply_points(points);
                    agent.record_false_finding();
                    points
                }
                FindingVerdict::Duplicate => {
                    let original = duplicate_of.ok_or_else(|| {
                        BonesError::Precondition(
                            "duplicate verdict requires the original finding id".to_string(),
                        )
                    })?;
                    let points = finding.mark_duplicate(&req.explanation, original)?;
                    agent.apply_points(points);
                    agent.record_duplicate_finding();
                    points
                }
            };

            maybe_eliminate(&mut agent);
            FindingRepo::update(conn, &finding)?;
            AgentRepo::update(conn, &agent)?;

            info!(
                finding = finding.id,
                agent = %agent.id,
                verdict = ?verdict,
                points,
                "finding adjudicated"
            );

            Ok(ValidationApplied {
                finding_id: finding.id,
                verdict,
                duplicate_of,
                points,
                verification_pending: needs_verification,
            })
        })
    }

    /// Apply a referee verdict to a pending dispute.
    ///
    /// A successful dispute revokes the finding if (and only if) it is
    /// still valid; a dispute against an already-revoked finding still
    /// rewards the disputer but leaves the finder untouched.
    pub fn apply_dispute_resolution(
        &self,
        dispute: Dispute,
        finding: Finding,
        verdict: DisputeVerdict,
        explanation: &str,
    ) -> Result<ResolutionApplied> {
        self.store.transaction(|conn| {
            // Re-read both rows inside the transaction; an earlier dispute
            // in the same scoring pass may have already revoked the finding.
            let mut dispute = DisputeRepo::find_by_id(conn, dispute.id)?
                .ok_or(BonesError::DisputeNotFound(dispute.id))?;
            let mut finding = FindingRepo::find_by_id(conn, finding.id)?
                .ok_or(BonesError::FindingNotFound(finding.id))?;
            let mut disputer = AgentRepo::find_by_id(conn, &dispute.disputer_id)?
                .ok_or_else(|| BonesError::AgentNotFound(dispute.disputer_id.clone()))?;

            let mut finding_revoked = false;
            let disputer_points = match verdict {
                DisputeVerdict::Successful => {
                    let points = dispute.mark_successful(explanation)?;
                    disputer.apply_points(points);
                    disputer.record_dispute_won();

                    if finding.is_valid() {
                        let mut finder = AgentRepo::find_by_id(conn, &finding.agent_id)?
                            .ok_or_else(|| BonesError::AgentNotFound(finding.agent_id.clone()))?;
                        // When verification never resolved, the valid stat
                        // and points were never recorded for the finder.
                        let verification_was_pending =
                            finding.verification_status == VerificationStatus::Pending;
                        finder.apply_points(-finding.points_awarded);
                        let penalty = finding.revoke_validation(explanation)?;
                        finder.apply_points(penalty);
                        if verification_was_pending {
                            finder.record_false_finding();
                        } else {
                            finder.revert_valid_to_false()?;
                        }
                        maybe_eliminate(&mut finder);
                        AgentRepo::update(conn, &finder)?;
                        FindingRepo::update(conn, &finding)?;
                        finding_revoked = true;
                    }
                    points
                }
                DisputeVerdict::Failed => {
                    let points = dispute.mark_failed(explanation)?;
                    disputer.apply_points(points);
                    disputer.record_dispute_lost();
                    points
                }
            };

            maybe_eliminate(&mut disputer);
            DisputeRepo::update(conn, &dispute)?;
            AgentRepo::update(conn, &disputer)?;

            info!(
                dispute = dispute.id,
                finding = finding.id,
                verdict = ?verdict,
                revoked = finding_revoked,
                "dispute resolved"
            );

            Ok(ResolutionApplied {
                dispute_id: dispute.id,
                finding_id: finding.id,
                verdict,
                disputer_points,
                finding_revoked,
            })
        })
    }

    /// Pre-detection hash lookup over findings in {valid, pending}.
    /// Returns the earliest match, if any. The canonical check lives
    /// inside [`Scorer::apply_finding_validation`].
    pub fn check_for_duplicate(
        &self,
        game_id: &str,
        pattern_hash: &str,
        exclude_finding: i64,
    ) -> Result<Option<i64>> {
        self.store.with_conn(|conn| {
            let matches = FindingRepo::find_by_pattern_hash(conn, game_id, pattern_hash, false)?;
            Ok(matches
                .iter()
                .filter(|m| m.id != exclude_finding)
                .map(|m| m.id)
                .min())
        })
    }

    /// Best valid finding by similarity score, when it clears the
    /// duplicate threshold.
    pub fn find_best_duplicate_match(
        &self,
        game_id: &str,
        candidate: &Finding,
    ) -> Result<Option<(i64, f64)>> {
        self.store.with_conn(|conn| {
            let valid = FindingRepo::find_valid(conn, game_id)?;
            let mut best: Option<(i64, f64)> = None;
            for other in valid.iter().filter(|f| f.id != candidate.id) {
                let score = similarity(
                    &candidate.file_path,
                    (candidate.line_start, candidate.line_end),
                    &candidate.description,
                    &other.file_path,
                    (other.line_start, other.line_end),
                    &other.description,
                );
                if score >= SIMILARITY_THRESHOLD
                    && best.map(|(_, s)| score > s).unwrap_or(true)
                {
                    best = Some((other.id, score));
                }
            }
            Ok(best)
        })
    }
}

pub(crate) fn maybe_eliminate(agent: &mut Agent) {
    if agent.status == AgentStatus::Active && agent.score <= ELIMINATION_FLOOR {
        info!(agent = %agent.id, score = agent.score, "agent eliminated");
        agent.status = AgentStatus::Eliminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::entity::{FindingStatus, Game};
    use crate::repo::GameRepo;

    fn setup() -> (Arc<Store>, Scorer, Game, Agent, Agent) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let game = Game::new(GameConfig::new("proj"));
        let (a, b) = store
            .with_conn(|conn| {
                GameRepo::create(conn, &game)?;
                let a = Agent::new(&game.id, "ada");
                let b = Agent::new(&game.id, "basil");
                AgentRepo::create(conn, &a)?;
                AgentRepo::create(conn, &b)?;
                Ok((a, b))
            })
            .unwrap();
        let scorer = Scorer::new(store.clone());
        (store, scorer, game, a, b)
    }

    fn submit(store: &Store, game: &Game, agent: &Agent, desc: &str, lines: (u32, u32)) -> Finding {
        let hash = pattern_hash("src/x.rs", lines.0, lines.1, desc);
        let mut finding = Finding::new(
            &game.id, &agent.id, 1, "src/x.rs", lines.0, lines.1, desc, None, hash,
        );
        store
            .with_conn(|conn| FindingRepo::create(conn, &mut finding))
            .unwrap();
        finding
    }

    #[test]
    fn valid_verdict_awards_point() {
        let (store, scorer, game, a, _) = setup();
        let finding = submit(&store, &game, &a, "off by one", (1, 5));
        let applied = scorer
            .apply_finding_validation(
                finding,
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();
        assert_eq!(applied.verdict, FindingVerdict::Valid);
        assert_eq!(applied.points, 1);
        let agent = store
            .with_conn(|conn| Ok(AgentRepo::find_by_id(conn, &a.id)?.unwrap()))
            .unwrap();
        assert_eq!(agent.score, 1);
        assert_eq!(agent.findings_valid, 1);
    }

    #[test]
    fn second_valid_with_colliding_hash_becomes_duplicate() {
        let (store, scorer, game, a, b) = setup();
        let first = submit(&store, &game, &a, "null ptr in handler", (10, 20));
        let first_id = first.id;
        scorer
            .apply_finding_validation(
                first,
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();

        // same bucket, same tokens -> same hash; referee also says VALID
        let second = submit(&store, &game, &b, "handler null ptr", (12, 18));
        let applied = scorer
            .apply_finding_validation(
                second,
                ValidationRequest::new(FindingVerdict::Valid, "also looks real"),
            )
            .unwrap();
        assert_eq!(applied.verdict, FindingVerdict::Duplicate);
        assert_eq!(applied.duplicate_of, Some(first_id));
        assert_eq!(applied.points, -3);

        let (a_row, b_row) = store
            .with_conn(|conn| {
                Ok((
                    AgentRepo::find_by_id(conn, &a.id)?.unwrap(),
                    AgentRepo::find_by_id(conn, &b.id)?.unwrap(),
                ))
            })
            .unwrap();
        assert_eq!(a_row.score, 1);
        assert_eq!(b_row.score, -3);
        assert_eq!(b_row.findings_duplicate, 1);
    }

    #[test]
    fn successful_dispute_revokes_and_rolls_back_points() {
        let (store, scorer, game, a, b) = setup();
        let finding = submit(&store, &game, &a, "fake bug", (1, 5));
        scorer
            .apply_finding_validation(
                finding.clone(),
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();
        let finding = store
            .with_conn(|conn| Ok(FindingRepo::find_by_id(conn, finding.id)?.unwrap()))
            .unwrap();

        let mut dispute = Dispute::new(&game.id, finding.id, &b.id, 1, "not reproducible");
        store
            .with_conn(|conn| DisputeRepo::create(conn, &mut dispute))
            .unwrap();

        let applied = scorer
            .apply_dispute_resolution(dispute, finding, DisputeVerdict::Successful, "agreed")
            .unwrap();
        assert!(applied.finding_revoked);
        assert_eq!(applied.disputer_points, 2);

        let (a_row, b_row) = store
            .with_conn(|conn| {
                Ok((
                    AgentRepo::find_by_id(conn, &a.id)?.unwrap(),
                    AgentRepo::find_by_id(conn, &b.id)?.unwrap(),
                ))
            })
            .unwrap();
        // +1 reversed, then -2 penalty
        assert_eq!(a_row.score, -2);
        assert_eq!(a_row.findings_valid, 0);
        assert_eq!(a_row.findings_false, 1);
        assert_eq!(b_row.score, 2);
        assert_eq!(b_row.disputes_won, 1);
    }

    #[test]
    fn failed_dispute_leaves_finding_standing() {
        let (store, scorer, game, a, b) = setup();
        let finding = submit(&store, &game, &a, "real bug", (1, 5));
        scorer
            .apply_finding_validation(
                finding.clone(),
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();
        let finding = store
            .with_conn(|conn| Ok(FindingRepo::find_by_id(conn, finding.id)?.unwrap()))
            .unwrap();
        let mut dispute = Dispute::new(&game.id, finding.id, &b.id, 1, "weak");
        store
            .with_conn(|conn| DisputeRepo::create(conn, &mut dispute))
            .unwrap();

        let applied = scorer
            .apply_dispute_resolution(dispute, finding.clone(), DisputeVerdict::Failed, "stands")
            .unwrap();
        assert!(!applied.finding_revoked);
        let (a_row, b_row, f_row) = store
            .with_conn(|conn| {
                Ok((
                    AgentRepo::find_by_id(conn, &a.id)?.unwrap(),
                    AgentRepo::find_by_id(conn, &b.id)?.unwrap(),
                    FindingRepo::find_by_id(conn, finding.id)?.unwrap(),
                ))
            })
            .unwrap();
        assert_eq!(a_row.score, 1);
        assert_eq!(b_row.score, -1);
        assert_eq!(b_row.disputes_lost, 1);
        assert_eq!(f_row.status, FindingStatus::Valid);
    }

    #[test]
    fn dispute_against_already_revoked_finding_still_rewards_disputer() {
        let (store, scorer, game, a, b) = setup();
        let finding = submit(&store, &game, &a, "contested bug", (1, 5));
        scorer
            .apply_finding_validation(
                finding.clone(),
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();
        let finding = store
            .with_conn(|conn| Ok(FindingRepo::find_by_id(conn, finding.id)?.unwrap()))
            .unwrap();

        let mut d1 = Dispute::new(&game.id, finding.id, &b.id, 1, "first challenge");
        store
            .with_conn(|conn| DisputeRepo::create(conn, &mut d1))
            .unwrap();
        scorer
            .apply_dispute_resolution(d1, finding.clone(), DisputeVerdict::Successful, "agreed")
            .unwrap();

        // a second successful dispute sees the finding already revoked
        let revoked = store
            .with_conn(|conn| Ok(FindingRepo::find_by_id(conn, finding.id)?.unwrap()))
            .unwrap();
        let c = Agent::new(&game.id, "clover");
        store.with_conn(|conn| AgentRepo::create(conn, &c)).unwrap();
        let mut d2 = Dispute::new(&game.id, revoked.id, &c.id, 1, "me too");
        store
            .with_conn(|conn| DisputeRepo::create(conn, &mut d2))
            .unwrap();
        let applied = scorer
            .apply_dispute_resolution(d2, revoked, DisputeVerdict::Successful, "agreed")
            .unwrap();
        assert!(!applied.finding_revoked);

        let a_row = store
            .with_conn(|conn| Ok(AgentRepo::find_by_id(conn, &a.id)?.unwrap()))
            .unwrap();
        // only the first revocation touched the finder
        assert_eq!(a_row.score, -2);
        assert_eq!(a_row.findings_false, 1);
    }

    #[test]
    fn revoking_verification_pending_finding_skips_valid_revert() {
        let (store, scorer, game, a, b) = setup();
        let finding = submit(&store, &game, &a, "uncertain bug", (1, 5));
        let mut req = ValidationRequest::new(FindingVerdict::Valid, "maybe");
        req.needs_verification = true;
        let applied = scorer.apply_finding_validation(finding.clone(), req).unwrap();
        assert!(applied.verification_pending);
        assert_eq!(applied.points, 0);

        let finding = store
            .with_conn(|conn| Ok(FindingRepo::find_by_id(conn, finding.id)?.unwrap()))
            .unwrap();
        let mut dispute = Dispute::new(&game.id, finding.id, &b.id, 1, "never real");
        store
            .with_conn(|conn| DisputeRepo::create(conn, &mut dispute))
            .unwrap();
        scorer
            .apply_dispute_resolution(dispute, finding.clone(), DisputeVerdict::Successful, "yes")
            .unwrap();

        let (a_row, f_row) = store
            .with_conn(|conn| {
                Ok((
                    AgentRepo::find_by_id(conn, &a.id)?.unwrap(),
                    FindingRepo::find_by_id(conn, finding.id)?.unwrap(),
                ))
            })
            .unwrap();
        // nothing to reverse (0 points recorded), straight to the penalty
        assert_eq!(a_row.score, -2);
        assert_eq!(a_row.findings_valid, 0);
        assert_eq!(a_row.findings_false, 1);
        assert_eq!(f_row.status, FindingStatus::FalseFlag);
        assert_eq!(f_row.verification_status, VerificationStatus::None);
    }

    #[test]
    fn check_for_duplicate_sees_pending_matches() {
        let (store, scorer, game, a, b) = setup();
        let first = submit(&store, &game, &a, "race in shutdown path", (30, 40));
        let second = submit(&store, &game, &b, "shutdown path race", (31, 39));
        // both still pending; the loose pre-check already flags the pair
        let hit = scorer
            .check_for_duplicate(&game.id, &second.pattern_hash, second.id)
            .unwrap();
        assert_eq!(hit, Some(first.id));
        // nothing matches a hash that was never submitted
        assert_eq!(
            scorer.check_for_duplicate(&game.id, "0000000000000000", 0).unwrap(),
            None
        );
    }

    #[test]
    fn similarity_match_finds_near_duplicate() {
        let (store, scorer, game, a, b) = setup();
        let first = submit(&store, &game, &a, "stale cache entry leaks memory", (1, 10));
        scorer
            .apply_finding_validation(
                first,
                ValidationRequest::new(FindingVerdict::Valid, "confirmed"),
            )
            .unwrap();
        let candidate = submit(&store, &game, &b, "cache entry leaks memory slowly", (3, 12));
        let best = scorer.find_best_duplicate_match(&game.id, &candidate).unwrap();
        let (_, score) = best.expect("expected a match above threshold");
        assert!(score >= SIMILARITY_THRESHOLD);
    }
}
