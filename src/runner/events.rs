//! Progress events emitted by the game runner. Consumers (CLI progress
//! views, dashboards) match on the variant and read its payload.

use crate::entity::{DisputeStatus, FindingStatus};
use crate::phase::ScoreEntry;
use crate::runner::TokenUsage;
use chrono::{DateTime, Utc};
use serde::Serialize;

// Event names stay snake_case on the wire; payload keys follow the
// camelCase convention of the rest of the JSON surface.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameEvent {
    GameCreated {
        game_id: String,
        agents: Vec<String>,
    },
    RoundStart {
        round: u32,
    },
    HuntStart {
        round: u32,
        agents: usize,
        deadline: DateTime<Utc>,
    },
    HuntAgentDone {
        round: u32,
        agent_id: String,
        aborted: bool,
        usage: TokenUsage,
    },
    HuntEnd {
        round: u32,
    },
    ScoringStart {
        round: u32,
        pending: usize,
    },
    FindingValidated {
        round: u32,
        finding_id: i64,
        status: FindingStatus,
        points: i64,
        duplicate_of: Option<i64>,
        usage: TokenUsage,
    },
    ScoringEnd {
        round: u32,
    },
    VerificationStart {
        round: u32,
        pending: usize,
    },
    FindingVerified {
        round: u32,
        finding_id: i64,
        status: FindingStatus,
        points: i64,
        usage: TokenUsage,
    },
    VerificationEnd {
        round: u32,
    },
    ReviewStart {
        round: u32,
        agents: usize,
        deadline: DateTime<Utc>,
    },
    ReviewAgentDone {
        round: u32,
        agent_id: String,
        aborted: bool,
        usage: TokenUsage,
    },
    ReviewEnd {
        round: u32,
    },
    DisputeScoringStart {
        round: u32,
        pending: usize,
    },
    DisputeResolved {
        round: u32,
        dispute_id: i64,
        finding_id: i64,
        status: DisputeStatus,
        usage: TokenUsage,
    },
    DisputeScoringEnd {
        round: u32,
    },
    RoundComplete {
        round: u32,
        action: String,
        scores: Vec<ScoreEntry>,
    },
    GameComplete {
        round: u32,
        winner_id: String,
        reason: String,
        usage: TokenUsage,
        final_scores: Vec<ScoreEntry>,
    },
}
