use bones::cli::{Cli, Commands};
use bones::config::{self, GameConfig};
use bones::entity::{
    Confidence, DisputeStatus, DisputeVerdict, FindingStatus, FindingVerdict, GamePhase,
    HuntCategory,
};
use bones::orchestrator::Orchestrator;
use bones::scoring::ValidationRequest;
use bones::{BonesError, Result};
use clap::Parser;
use serde_json::{json, Value};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bones=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(value) => {
            println!("{}", value);
        }
        Err(err) => {
            // Single-line JSON error contract for tool callers.
            println!("{}", json!({ "error": err.to_string() }));
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Value> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => config::data_dir()?,
    };
    let orch = Orchestrator::open(data_dir)?;

    let value = match cli.command {
        Commands::Setup {
            project_url,
            category,
            focus,
            target,
            hunt_duration,
            review_duration,
            agents,
            max_rounds,
            force,
        } => {
            let config = GameConfig {
                project: project_url,
                category: HuntCategory::from_str(&category)?,
                focus,
                target_score: target,
                hunt_duration_secs: hunt_duration,
                review_duration_secs: review_duration,
                num_agents: agents,
                max_rounds,
            };
            let (game, agents) = orch.create_game(config, force)?;
            json!({
                "gameId": game.id,
                "agents": agents.iter().map(|a| a.id.clone()).collect::<Vec<_>>(),
                "config": game.config,
                "next": "start-hunt",
            })
        }

        Commands::StartHunt { game_id } => to_json(orch.coordinator().start_hunt(&game_id)?)?,
        Commands::CheckHunt { game_id } => to_json(orch.coordinator().check_hunt(&game_id)?)?,
        Commands::StartHuntScoring { game_id } => {
            to_json(orch.coordinator().start_hunt_scoring(&game_id)?)?
        }

        Commands::Validate {
            game_id,
            finding_id,
            verdict,
            explanation,
            confidence,
            confidence_score,
            duplicate_of,
            issue_type,
            impact_tier,
            rejection_reason,
            needs_verification,
        } => {
            let req = ValidationRequest {
                verdict: FindingVerdict::parse(&verdict)?,
                explanation,
                confidence: confidence.as_deref().map(Confidence::from_str).transpose()?,
                confidence_score,
                duplicate_of,
                issue_type,
                impact_tier,
                rejection_reason,
                needs_verification,
            };
            to_json(orch.submission().validate_finding(&game_id, finding_id, req)?)?
        }

        Commands::Verify {
            game_id,
            finding_id,
            decision,
            explanation,
            overridden_type,
            rejection_reason,
        } => {
            let confirmed = match decision.to_ascii_uppercase().as_str() {
                "CONFIRM" | "CONFIRMED" => true,
                "REJECT" | "REJECTED" => false,
                other => {
                    return Err(BonesError::Precondition(format!(
                        "decision must be CONFIRM or REJECT (got '{}')",
                        other
                    )))
                }
            };
            to_json(orch.submission().verify_finding(
                &game_id,
                finding_id,
                confirmed,
                &explanation,
                overridden_type,
                rejection_reason,
            )?)?
        }

        Commands::StartReview { game_id } => to_json(orch.coordinator().start_review(&game_id)?)?,
        Commands::CheckReview { game_id } => to_json(orch.coordinator().check_review(&game_id)?)?,
        Commands::StartReviewScoring { game_id } => {
            to_json(orch.coordinator().start_review_scoring(&game_id)?)?
        }

        Commands::Resolve {
            game_id,
            dispute_id,
            verdict,
            explanation,
        } => to_json(orch.submission().resolve_dispute(
            &game_id,
            dispute_id,
            DisputeVerdict::parse(&verdict)?,
            &explanation,
        )?)?,

        Commands::CheckWinner { game_id } => to_json(orch.coordinator().check_winner(&game_id)?)?,

        Commands::Submit {
            game_id,
            agent_id,
            file_path,
            line_start,
            line_end,
            description,
            snippet,
        } => {
            let id = orch.submission().submit_finding(
                &game_id,
                &agent_id,
                &file_path,
                line_start,
                line_end,
                &description,
                snippet,
            )?;
            json!({ "findingId": id })
        }

        Commands::Dispute {
            game_id,
            agent_id,
            finding_id,
            reason,
        } => {
            let id = orch
                .submission()
                .submit_dispute(&game_id, &agent_id, finding_id, &reason)?;
            json!({ "disputeId": id })
        }

        Commands::Done {
            game_id,
            agent_id,
            phase,
        } => {
            let phase = match phase.as_str() {
                "hunt" => GamePhase::Hunt,
                "review" => GamePhase::Review,
                other => {
                    return Err(BonesError::Precondition(format!(
                        "phase must be hunt or review (got '{}')",
                        other
                    )))
                }
            };
            let round = orch.submission().mark_agent_done(&game_id, &agent_id, phase)?;
            json!({ "agentId": agent_id, "phase": phase, "round": round })
        }

        Commands::Status { game_id } => to_json(orch.status(&game_id)?)?,

        Commands::Findings {
            game_id,
            round,
            status,
        } => {
            let status = status.as_deref().map(FindingStatus::from_str).transpose()?;
            to_json(orch.findings(&game_id, round, status)?)?
        }

        Commands::Disputes {
            game_id,
            round,
            status,
        } => {
            let status = status.as_deref().map(DisputeStatus::from_str).transpose()?;
            to_json(orch.disputes(&game_id, round, status)?)?
        }

        Commands::List => to_json(orch.list_games()?)?,

        Commands::Delete { game_id } => {
            orch.delete_game(&game_id)?;
            json!({ "deleted": game_id })
        }
    };

    Ok(value)
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| BonesError::State(format!("failed to encode output: {}", e)))
}
