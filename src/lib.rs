//! Bones: competitive multi-agent code-review tournament engine
//!
//! Hunter agents compete to find issues in a target source tree, a referee
//! adjudicates, optional verifiers second-check uncertain verdicts, and
//! agents dispute one another's validated findings. Rounds repeat until a
//! score target is reached or the round cap is hit.

pub mod cli;
pub mod config;
pub mod entity;
pub mod orchestrator;
pub mod phase;
pub mod repo;
pub mod runner;
pub mod scoring;
pub mod store;
pub mod submission;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BonesError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Finding not found: {0}")]
    FindingNotFound(i64),

    #[error("Dispute not found: {0}")]
    DisputeNotFound(i64),

    #[error("Invalid phase: game is in '{current}', operation requires '{requested}'")]
    InvalidPhase { current: String, requested: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Agent driver error: {0}")]
    Driver(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("State error: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, BonesError>;
