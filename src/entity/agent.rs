//! Competing agents: identity, score, and per-category stat counters.

use crate::entity::AgentStatus;
use crate::{BonesError, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fixed pool of agent short names, shuffled per game.
pub const NAME_POOL: [&str; 50] = [
    "ada", "basil", "clover", "dahlia", "ember", "fenwick", "ginger", "hazel", "indigo", "juniper",
    "kestrel", "lark", "maple", "nutmeg", "olive", "poppy", "quill", "rowan", "sage", "thistle",
    "umber", "violet", "willow", "xenia", "yarrow", "zephyr", "aspen", "briar", "cedar", "dune",
    "elm", "fern", "grove", "heath", "iris", "jasper", "koa", "linden", "moss", "nettle",
    "onyx", "pine", "quartz", "reed", "sorrel", "tarragon", "vale", "wren", "yew", "zinnia",
];

/// Draw `count` unique short names from the pool. Hard error when the pool
/// cannot cover the request.
pub fn draw_short_names<R: Rng>(count: usize, rng: &mut R) -> Result<Vec<String>> {
    if count > NAME_POOL.len() {
        return Err(BonesError::Precondition(format!(
            "cannot create {} agents: name pool holds {}",
            count,
            NAME_POOL.len()
        )));
    }
    let mut pool: Vec<&str> = NAME_POOL.to_vec();
    pool.shuffle(rng);
    Ok(pool.into_iter().take(count).map(String::from).collect())
}

/// A competing agent within one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// `{game_id}-{short_name}`.
    pub id: String,
    pub game_id: String,
    pub short_name: String,
    pub score: i64,
    pub findings_submitted: u32,
    pub findings_valid: u32,
    pub findings_false: u32,
    pub findings_duplicate: u32,
    pub disputes_won: u32,
    pub disputes_lost: u32,
    /// Round in which the agent last signalled hunt completion; 0 = never.
    pub hunt_done_round: u32,
    /// Round in which the agent last signalled review completion; 0 = never.
    pub review_done_round: u32,
    pub status: AgentStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(game_id: &str, short_name: &str) -> Self {
        Self {
            id: format!("{}-{}", game_id, short_name),
            game_id: game_id.to_string(),
            short_name: short_name.to_string(),
            score: 0,
            findings_submitted: 0,
            findings_valid: 0,
            findings_false: 0,
            findings_duplicate: 0,
            disputes_won: 0,
            disputes_lost: 0,
            hunt_done_round: 0,
            review_done_round: 0,
            status: AgentStatus::Active,
            last_heartbeat: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_finished_hunt(&self, round: u32) -> bool {
        self.hunt_done_round >= round
    }

    pub fn has_finished_review(&self, round: u32) -> bool {
        self.review_done_round >= round
    }

    pub fn mark_hunt_done(&mut self, round: u32) {
        self.hunt_done_round = round;
    }

    pub fn mark_review_done(&mut self, round: u32) {
        self.review_done_round = round;
    }

    pub fn touch_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
    }

    pub fn apply_points(&mut self, delta: i64) {
        self.score += delta;
    }

    pub fn record_valid_finding(&mut self) {
        self.findings_valid += 1;
    }

    pub fn record_false_finding(&mut self) {
        self.findings_false += 1;
    }

    pub fn record_duplicate_finding(&mut self) {
        self.findings_duplicate += 1;
    }

    pub fn record_dispute_won(&mut self) {
        self.disputes_won += 1;
    }

    pub fn record_dispute_lost(&mut self) {
        self.disputes_lost += 1;
    }

    /// Move one finding from the valid column to the false column after a
    /// successful dispute revoked it. Must be called after the finding
    /// itself transitioned.
    pub fn revert_valid_to_false(&mut self) -> Result<()> {
        if self.findings_valid == 0 {
            return Err(BonesError::Invariant(format!(
                "agent {} has no valid findings to revert",
                self.id
            )));
        }
        self.findings_valid -= 1;
        self.findings_false += 1;
        Ok(())
    }
}
