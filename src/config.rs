//! Game configuration and data-directory resolution.

use crate::entity::HuntCategory;
use crate::{BonesError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding where persistent state lives.
pub const DATA_DIR_ENV: &str = "BONES_DATA_DIR";

/// Immutable parameters of a game, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Reference to the project under review (path or URL).
    pub project: String,
    /// What the hunters are hunting for.
    pub category: HuntCategory,
    /// Optional user focus prompt narrowing the hunt.
    pub focus: Option<String>,
    /// Score an agent must reach to win.
    pub target_score: i64,
    /// Hunt phase duration in seconds.
    pub hunt_duration_secs: u64,
    /// Review phase duration in seconds.
    pub review_duration_secs: u64,
    /// Number of competing agents.
    pub num_agents: usize,
    /// Round cap; 0 means unlimited.
    pub max_rounds: u32,
}

impl GameConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(BonesError::Precondition(
                "project reference must not be empty".to_string(),
            ));
        }
        if self.target_score < 1 {
            return Err(BonesError::Precondition(
                "target score must be at least 1".to_string(),
            ));
        }
        if self.num_agents == 0 {
            return Err(BonesError::Precondition(
                "at least one agent is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            category: HuntCategory::Bugs,
            focus: None,
            target_score: 5,
            hunt_duration_secs: 300,
            review_duration_secs: 180,
            num_agents: 3,
            max_rounds: 3,
        }
    }
}

/// Resolve the data directory for persistent state.
///
/// `BONES_DATA_DIR` wins when set; otherwise a hidden folder under the
/// user's home.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".bones"))
        .ok_or_else(|| BonesError::State("could not determine home directory".to_string()))
}
