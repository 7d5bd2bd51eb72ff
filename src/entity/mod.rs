//! Pure game state: entities plus invariant-checking mutators.
//!
//! Entities are constructed either empty (factory for a fresh row) or by
//! rehydration from a persisted row. Mutators enforce local invariants and
//! fail from a disallowed internal state. Entities never touch the store.

mod agent;
mod dispute;
mod finding;
mod game;

pub use agent::*;
pub use dispute::*;
pub use finding::*;
pub use game::*;

use crate::{BonesError, Result};
use serde::{Deserialize, Serialize};

/// Points for a validated finding.
pub const POINTS_VALID: i64 = 1;
/// Penalty for a false flag.
pub const POINTS_FALSE_FLAG: i64 = -2;
/// Penalty for a duplicate submission.
pub const POINTS_DUPLICATE: i64 = -3;
/// Reward for winning a dispute.
pub const POINTS_DISPUTE_WON: i64 = 2;
/// Penalty for losing a dispute.
pub const POINTS_DISPUTE_LOST: i64 = -1;

/// Phase of a game's round loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Setup,
    Hunt,
    HuntScoring,
    Review,
    ReviewScoring,
    Complete,
}

impl GamePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Setup => "setup",
            GamePhase::Hunt => "hunt",
            GamePhase::HuntScoring => "hunt_scoring",
            GamePhase::Review => "review",
            GamePhase::ReviewScoring => "review_scoring",
            GamePhase::Complete => "complete",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "setup" => Ok(GamePhase::Setup),
            "hunt" => Ok(GamePhase::Hunt),
            "hunt_scoring" => Ok(GamePhase::HuntScoring),
            "review" => Ok(GamePhase::Review),
            "review_scoring" => Ok(GamePhase::ReviewScoring),
            "complete" => Ok(GamePhase::Complete),
            other => Err(BonesError::State(format!("unknown game phase '{}'", other))),
        }
    }

    /// Timed phases carry a deadline; all others must have none.
    pub fn is_timed(self) -> bool {
        matches!(self, GamePhase::Hunt | GamePhase::Review)
    }

    pub fn is_terminal(self) -> bool {
        self == GamePhase::Complete
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the hunters are hunting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntCategory {
    Bugs,
    DocDrift,
    Security,
    TestCoverage,
    TechDebt,
    Custom,
}

impl HuntCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HuntCategory::Bugs => "bugs",
            HuntCategory::DocDrift => "doc_drift",
            HuntCategory::Security => "security",
            HuntCategory::TestCoverage => "test_coverage",
            HuntCategory::TechDebt => "tech_debt",
            HuntCategory::Custom => "custom",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "bugs" => Ok(HuntCategory::Bugs),
            "doc_drift" => Ok(HuntCategory::DocDrift),
            "security" => Ok(HuntCategory::Security),
            "test_coverage" => Ok(HuntCategory::TestCoverage),
            "tech_debt" => Ok(HuntCategory::TechDebt),
            "custom" => Ok(HuntCategory::Custom),
            other => Err(BonesError::State(format!(
                "unknown hunt category '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for HuntCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Pending,
    Valid,
    FalseFlag,
    Duplicate,
}

impl FindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingStatus::Pending => "pending",
            FindingStatus::Valid => "valid",
            FindingStatus::FalseFlag => "false_flag",
            FindingStatus::Duplicate => "duplicate",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(FindingStatus::Pending),
            "valid" => Ok(FindingStatus::Valid),
            "false_flag" => Ok(FindingStatus::FalseFlag),
            "duplicate" => Ok(FindingStatus::Duplicate),
            other => Err(BonesError::State(format!(
                "unknown finding status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Second-pass adjudication state for findings the referee was unsure about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    None,
    Pending,
    Confirmed,
    Overridden,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::None => "none",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Confirmed => "confirmed",
            VerificationStatus::Overridden => "overridden",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(VerificationStatus::None),
            "pending" => Ok(VerificationStatus::Pending),
            "confirmed" => Ok(VerificationStatus::Confirmed),
            "overridden" => Ok(VerificationStatus::Overridden),
            other => Err(BonesError::State(format!(
                "unknown verification status '{}'",
                other
            ))),
        }
    }
}

/// Referee confidence in a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(BonesError::State(format!("unknown confidence '{}'", other))),
        }
    }
}

/// Lifecycle status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    Successful,
    Failed,
}

impl DisputeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputeStatus::Pending => "pending",
            DisputeStatus::Successful => "successful",
            DisputeStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(DisputeStatus::Pending),
            "successful" => Ok(DisputeStatus::Successful),
            "failed" => Ok(DisputeStatus::Failed),
            other => Err(BonesError::State(format!(
                "unknown dispute status '{}'",
                other
            ))),
        }
    }
}

/// Status of a competing agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Eliminated,
    Winner,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Eliminated => "eliminated",
            AgentStatus::Winner => "winner",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(AgentStatus::Active),
            "eliminated" => Ok(AgentStatus::Eliminated),
            "winner" => Ok(AgentStatus::Winner),
            other => Err(BonesError::State(format!(
                "unknown agent status '{}'",
                other
            ))),
        }
    }
}

/// Referee verdict on a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingVerdict {
    Valid,
    False,
    Duplicate,
}

impl FindingVerdict {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "VALID" => Ok(FindingVerdict::Valid),
            "FALSE" => Ok(FindingVerdict::False),
            "DUPLICATE" => Ok(FindingVerdict::Duplicate),
            other => Err(BonesError::Precondition(format!(
                "verdict must be VALID, FALSE, or DUPLICATE (got '{}')",
                other
            ))),
        }
    }
}

/// Referee verdict on a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeVerdict {
    Successful,
    Failed,
}

impl DisputeVerdict {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SUCCESSFUL" => Ok(DisputeVerdict::Successful),
            "FAILED" => Ok(DisputeVerdict::Failed),
            other => Err(BonesError::Precondition(format!(
                "verdict must be SUCCESSFUL or FAILED (got '{}')",
                other
            ))),
        }
    }
}
