//! Disputes: challenges agents file against others' validated findings.

use crate::entity::{DisputeStatus, POINTS_DISPUTE_LOST, POINTS_DISPUTE_WON};
use crate::{BonesError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A challenge against a validated finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    /// Monotonically assigned within a game; 0 until persisted.
    pub id: i64,
    pub game_id: String,
    pub finding_id: i64,
    /// Must differ from the finding's submitting agent.
    pub disputer_id: String,
    pub round: u32,
    pub reason: String,
    pub status: DisputeStatus,
    pub verdict: Option<String>,
    pub points_awarded: i64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(game_id: &str, finding_id: i64, disputer_id: &str, round: u32, reason: &str) -> Self {
        Self {
            id: 0,
            game_id: game_id.to_string(),
            finding_id,
            disputer_id: disputer_id.to_string(),
            round,
            reason: reason.to_string(),
            status: DisputeStatus::Pending,
            verdict: None,
            points_awarded: 0,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn require_pending(&self, op: &str) -> Result<()> {
        if self.status == DisputeStatus::Pending {
            Ok(())
        } else {
            Err(BonesError::InvalidState(format!(
                "dispute {} is '{}', {} requires 'pending'",
                self.id,
                self.status.as_str(),
                op
            )))
        }
    }

    /// Referee upholds the dispute; the disputer earns the reward.
    pub fn mark_successful(&mut self, verdict: &str) -> Result<i64> {
        self.require_pending("mark_successful")?;
        self.status = DisputeStatus::Successful;
        self.verdict = Some(verdict.to_string());
        self.points_awarded = POINTS_DISPUTE_WON;
        self.resolved_at = Some(Utc::now());
        Ok(self.points_awarded)
    }

    /// Referee rejects the dispute; the disputer pays the penalty.
    pub fn mark_failed(&mut self, verdict: &str) -> Result<i64> {
        self.require_pending("mark_failed")?;
        self.status = DisputeStatus::Failed;
        self.verdict = Some(verdict.to_string());
        self.points_awarded = POINTS_DISPUTE_LOST;
        self.resolved_at = Some(Utc::now());
        Ok(self.points_awarded)
    }
}
