//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bones")]
#[command(about = "Competitive multi-agent code-review tournament", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory for persistent state (overrides BONES_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a game and its agents
    Setup {
        /// Project under review (path or URL)
        project_url: String,

        /// Hunt category: bugs, doc_drift, security, test_coverage, tech_debt, custom
        #[arg(short, long, default_value = "bugs")]
        category: String,

        /// Focus prompt narrowing the hunt
        #[arg(long)]
        focus: Option<String>,

        /// Score an agent must reach to win
        #[arg(short, long, default_value_t = 5)]
        target: i64,

        /// Hunt phase duration in seconds
        #[arg(long, default_value_t = 300)]
        hunt_duration: u64,

        /// Review phase duration in seconds
        #[arg(long, default_value_t = 180)]
        review_duration: u64,

        /// Number of competing agents
        #[arg(short, long, default_value_t = 3)]
        agents: usize,

        /// Round cap; 0 means unlimited
        #[arg(long, default_value_t = 3)]
        max_rounds: u32,

        /// Start even when the project has an unfinished game
        #[arg(long)]
        force: bool,
    },

    /// Begin a hunt round
    StartHunt { game_id: String },

    /// Show hunt progress: deadline, finished and pending agents
    CheckHunt { game_id: String },

    /// Close the hunt and produce referee prompts
    StartHuntScoring { game_id: String },

    /// Record a referee verdict on a finding
    Validate {
        game_id: String,
        finding_id: i64,

        /// VALID, FALSE, or DUPLICATE
        verdict: String,

        /// Referee explanation
        explanation: String,

        /// Referee confidence: high, medium, low
        #[arg(long)]
        confidence: Option<String>,

        /// Numeric confidence 0-100
        #[arg(long)]
        confidence_score: Option<u8>,

        /// Original finding id (DUPLICATE verdicts)
        #[arg(long)]
        duplicate_of: Option<i64>,

        /// Issue classification
        #[arg(long)]
        issue_type: Option<String>,

        /// Impact tier
        #[arg(long)]
        impact_tier: Option<String>,

        /// Why the finding was rejected (FALSE verdicts)
        #[arg(long)]
        rejection_reason: Option<String>,

        /// Defer points until a verifier confirms
        #[arg(long)]
        needs_verification: bool,
    },

    /// Record a verifier decision on a verification-pending finding
    Verify {
        game_id: String,
        finding_id: i64,

        /// CONFIRM or REJECT
        decision: String,

        /// Verifier explanation
        explanation: String,

        /// Corrected issue classification (REJECT)
        #[arg(long)]
        overridden_type: Option<String>,

        /// Why the finding was rejected (REJECT)
        #[arg(long)]
        rejection_reason: Option<String>,
    },

    /// Begin the review (dispute) window
    StartReview { game_id: String },

    /// Show review progress: deadline, finished and pending agents
    CheckReview { game_id: String },

    /// Close the review and produce dispute prompts
    StartReviewScoring { game_id: String },

    /// Record a referee verdict on a dispute
    Resolve {
        game_id: String,
        dispute_id: i64,

        /// SUCCESSFUL or FAILED
        verdict: String,

        /// Referee explanation
        explanation: String,
    },

    /// Decide the round: GAME_COMPLETE, TIE_BREAKER, or CONTINUE
    CheckWinner { game_id: String },

    /// Agent-side: submit a finding during the hunt
    Submit {
        game_id: String,
        agent_id: String,
        file_path: String,
        line_start: u32,
        line_end: u32,
        description: String,

        /// Evidence snippet (required for doc_drift)
        #[arg(long)]
        snippet: Option<String>,
    },

    /// Agent-side: dispute another agent's valid finding
    Dispute {
        game_id: String,
        agent_id: String,
        finding_id: i64,
        reason: String,
    },

    /// Agent-side: signal completion of the current hunt or review
    Done {
        game_id: String,
        agent_id: String,

        /// hunt or review
        phase: String,
    },

    /// Game snapshot with scoreboard
    Status { game_id: String },

    /// List findings, optionally filtered
    Findings {
        game_id: String,

        #[arg(long)]
        round: Option<u32>,

        /// pending, valid, false_flag, duplicate
        #[arg(long)]
        status: Option<String>,
    },

    /// List disputes, optionally filtered
    Disputes {
        game_id: String,

        #[arg(long)]
        round: Option<u32>,

        /// pending, successful, failed
        #[arg(long)]
        status: Option<String>,
    },

    /// List all games, newest first
    List,

    /// Delete a game and everything it owns
    Delete { game_id: String },
}
