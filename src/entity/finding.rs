//! Findings: issues submitted by hunters, adjudicated by the referee.

use crate::entity::{
    Confidence, FindingStatus, VerificationStatus, POINTS_FALSE_FLAG, POINTS_VALID,
};
use crate::{BonesError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reported issue against the target source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Monotonically assigned within a game; 0 until persisted.
    pub id: i64,
    pub game_id: String,
    pub agent_id: String,
    pub round: u32,
    pub file_path: String,
    /// Inclusive line range, `line_start <= line_end`.
    pub line_start: u32,
    pub line_end: u32,
    pub description: String,
    pub code_snippet: Option<String>,
    /// Fuzzy-duplicate digest of `(file, bucketed range, tokens)`.
    pub pattern_hash: String,
    pub status: FindingStatus,
    /// Set iff status is Duplicate.
    pub duplicate_of: Option<i64>,
    pub verdict: Option<String>,
    pub confidence: Option<Confidence>,
    pub confidence_score: Option<u8>,
    pub points_awarded: i64,
    pub verification_status: VerificationStatus,
    pub verifier_explanation: Option<String>,
    pub issue_type: Option<String>,
    pub impact_tier: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl Finding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game_id: &str,
        agent_id: &str,
        round: u32,
        file_path: &str,
        line_start: u32,
        line_end: u32,
        description: &str,
        code_snippet: Option<String>,
        pattern_hash: String,
    ) -> Self {
        Self {
            id: 0,
            game_id: game_id.to_string(),
            agent_id: agent_id.to_string(),
            round,
            file_path: file_path.to_string(),
            line_start,
            line_end,
            description: description.to_string(),
            code_snippet,
            pattern_hash,
            status: FindingStatus::Pending,
            duplicate_of: None,
            verdict: None,
            confidence: None,
            confidence_score: None,
            points_awarded: 0,
            verification_status: VerificationStatus::None,
            verifier_explanation: None,
            issue_type: None,
            impact_tier: None,
            rejection_reason: None,
            created_at: Utc::now(),
            validated_at: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == FindingStatus::Valid
    }

    pub fn is_pending(&self) -> bool {
        self.status == FindingStatus::Pending
    }

    fn require_status(&self, expected: FindingStatus, op: &str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(BonesError::InvalidState(format!(
                "finding {} is '{}', {} requires '{}'",
                self.id, self.status, op, expected
            )))
        }
    }

    /// Referee marks the finding valid. With `needs_verification` the
    /// points stay at zero until the verifier resolves; otherwise the
    /// valid-finding reward is awarded immediately.
    ///
    /// Returns the points awarded now.
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        &mut self,
        verdict: &str,
        confidence: Confidence,
        confidence_score: Option<u8>,
        issue_type: Option<String>,
        impact_tier: Option<String>,
        needs_verification: bool,
    ) -> Result<i64> {
        self.require_status(FindingStatus::Pending, "validate")?;
        self.status = FindingStatus::Valid;
        self.verdict = Some(verdict.to_string());
        self.confidence = Some(confidence);
        self.confidence_score = confidence_score;
        self.issue_type = issue_type;
        self.impact_tier = impact_tier;
        self.validated_at = Some(Utc::now());
        if needs_verification {
            self.verification_status = VerificationStatus::Pending;
            self.points_awarded = 0;
        } else {
            self.verification_status = VerificationStatus::None;
            self.points_awarded = POINTS_VALID;
        }
        Ok(self.points_awarded)
    }

    /// Referee rejects the finding as a false flag.
    pub fn mark_false(&mut self, verdict: &str, rejection_reason: Option<String>) -> Result<i64> {
        self.require_status(FindingStatus::Pending, "mark_false")?;
        self.status = FindingStatus::FalseFlag;
        self.verdict = Some(verdict.to_string());
        self.rejection_reason = rejection_reason;
        self.points_awarded = POINTS_FALSE_FLAG;
        self.validated_at = Some(Utc::now());
        Ok(self.points_awarded)
    }

    /// Referee marks the finding a duplicate of an earlier one.
    pub fn mark_duplicate(&mut self, verdict: &str, duplicate_of: i64) -> Result<i64> {
        self.require_status(FindingStatus::Pending, "mark_duplicate")?;
        self.status = FindingStatus::Duplicate;
        self.verdict = Some(verdict.to_string());
        self.duplicate_of = Some(duplicate_of);
        self.points_awarded = crate::entity::POINTS_DUPLICATE;
        self.validated_at = Some(Utc::now());
        Ok(self.points_awarded)
    }

    /// A successful dispute turns a valid finding into a false flag.
    /// Clears any pending verification so the verifier never processes a
    /// finding that has already been revoked.
    pub fn revoke_validation(&mut self, verdict: &str) -> Result<i64> {
        self.require_status(FindingStatus::Valid, "revoke_validation")?;
        self.status = FindingStatus::FalseFlag;
        self.verdict = Some(verdict.to_string());
        self.points_awarded = POINTS_FALSE_FLAG;
        self.verification_status = VerificationStatus::None;
        Ok(self.points_awarded)
    }

    /// Verifier resolves a pending verification. Confirmation awards the
    /// deferred valid-finding points; rejection overrides the referee and
    /// turns the finding into a false flag.
    ///
    /// Returns the points awarded by this resolution.
    pub fn apply_verification(
        &mut self,
        confirmed: bool,
        explanation: &str,
        overridden_type: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<i64> {
        if self.verification_status != VerificationStatus::Pending {
            return Err(BonesError::InvalidState(format!(
                "finding {} has verification status '{}', apply_verification requires 'pending'",
                self.id,
                self.verification_status.as_str()
            )));
        }
        self.verifier_explanation = Some(explanation.to_string());
        if confirmed {
            self.verification_status = VerificationStatus::Confirmed;
            self.points_awarded = POINTS_VALID;
        } else {
            self.verification_status = VerificationStatus::Overridden;
            self.status = FindingStatus::FalseFlag;
            self.points_awarded = POINTS_FALSE_FLAG;
            if overridden_type.is_some() {
                self.issue_type = overridden_type;
            }
            self.rejection_reason = rejection_reason;
        }
        Ok(self.points_awarded)
    }
}
