//! Autonomous game runner: drives a game end-to-end round by round.
//!
//! Hunt and review agents run in parallel under a shared phase deadline;
//! referee and verifier passes run sequentially so adjudication order (and
//! with it duplicate detection) stays deterministic. One agent's failure
//! never cancels its peers; an aborted agent counts as done for phase
//! completion.

mod driver;
mod events;

pub use driver::*;
pub use events::GameEvent;

use crate::orchestrator::Orchestrator;
use crate::phase::{AgentPrompt, WinnerOutcome};
use crate::repo::{DisputeRepo, FindingRepo};
use crate::{BonesError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-invocation timeouts for the sequential adjudication passes.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub referee_timeout: Duration,
    pub verifier_timeout: Duration,
    pub dispute_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            referee_timeout: Duration::from_secs(120),
            verifier_timeout: Duration::from_secs(90),
            dispute_timeout: Duration::from_secs(90),
        }
    }
}

/// Totals returned after a run, for embedders that do not replay events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub game_id: String,
    pub rounds: u32,
    pub winner_id: String,
    pub reason: String,
    pub usage: TokenUsage,
}

/// Drives one game to completion through an [`AgentDriver`].
pub struct GameRunner<D: AgentDriver> {
    orchestrator: Arc<Orchestrator>,
    driver: Arc<D>,
    config: RunnerConfig,
    events: UnboundedSender<GameEvent>,
    cancel: CancellationToken,
}

impl<D: AgentDriver> GameRunner<D> {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        driver: Arc<D>,
        events: UnboundedSender<GameEvent>,
    ) -> Self {
        Self {
            orchestrator,
            driver,
            config: RunnerConfig::default(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Token an embedder can use to stop the run from outside.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    /// Run the game until a terminal outcome or external cancellation.
    pub async fn run(&self, game_id: &str) -> Result<RunSummary> {
        let game = self.orchestrator.get_game(game_id)?;
        let agents = self.orchestrator.agents(game_id)?;
        self.emit(GameEvent::GameCreated {
            game_id: game.id.clone(),
            agents: agents.iter().map(|a| a.id.clone()).collect(),
        });

        let hunt_duration = Duration::from_secs(game.config.hunt_duration_secs);
        let review_duration = Duration::from_secs(game.config.review_duration_secs);
        let mut usage = TokenUsage::default();

        loop {
            if self.cancel.is_cancelled() {
                return Err(BonesError::Cancelled("game run stopped".to_string()));
            }

            // Hunt: all competitors in parallel under one deadline.
            let hunt = self.orchestrator.coordinator().start_hunt(game_id)?;
            let round = hunt.round;
            self.emit(GameEvent::RoundStart { round });
            self.emit(GameEvent::HuntStart {
                round,
                agents: hunt.prompts.len(),
                deadline: hunt.deadline,
            });
            let outcomes = self
                .run_parallel(game_id, AgentRole::Hunter, hunt.prompts, hunt_duration)
                .await;
            for outcome in outcomes {
                usage.add(outcome.usage);
                self.emit(GameEvent::HuntAgentDone {
                    round,
                    agent_id: outcome.agent_id,
                    aborted: outcome.aborted,
                    usage: outcome.usage,
                });
            }
            self.emit(GameEvent::HuntEnd { round });

            // Hunt scoring: one referee pass per pending finding.
            let scoring = self.orchestrator.coordinator().start_hunt_scoring(game_id)?;
            self.emit(GameEvent::ScoringStart {
                round,
                pending: scoring.prompts.len(),
            });
            for prompt in scoring.prompts {
                let outcome = self
                    .run_bounded(
                        game_id,
                        "referee",
                        AgentRole::Referee,
                        prompt.prompt,
                        self.config.referee_timeout,
                    )
                    .await;
                usage.add(outcome.usage);
                let finding = self.orchestrator.store().with_conn(|conn| {
                    FindingRepo::find_by_id(conn, prompt.finding_id)?
                        .ok_or(BonesError::FindingNotFound(prompt.finding_id))
                })?;
                self.emit(GameEvent::FindingValidated {
                    round,
                    finding_id: finding.id,
                    status: finding.status,
                    points: finding.points_awarded,
                    duplicate_of: finding.duplicate_of,
                    usage: outcome.usage,
                });
            }
            self.emit(GameEvent::ScoringEnd { round });

            // Verification: second-check the referee's uncertain verdicts.
            let verifications = self
                .orchestrator
                .coordinator()
                .verification_prompts(game_id)?;
            if !verifications.is_empty() {
                self.emit(GameEvent::VerificationStart {
                    round,
                    pending: verifications.len(),
                });
                for prompt in verifications {
                    let outcome = self
                        .run_bounded(
                            game_id,
                            "verifier",
                            AgentRole::Verifier,
                            prompt.prompt,
                            self.config.verifier_timeout,
                        )
                        .await;
                    usage.add(outcome.usage);
                    let finding = self.orchestrator.store().with_conn(|conn| {
                        FindingRepo::find_by_id(conn, prompt.finding_id)?
                            .ok_or(BonesError::FindingNotFound(prompt.finding_id))
                    })?;
                    self.emit(GameEvent::FindingVerified {
                        round,
                        finding_id: finding.id,
                        status: finding.status,
                        points: finding.points_awarded,
                        usage: outcome.usage,
                    });
                }
                self.emit(GameEvent::VerificationEnd { round });
            }

            // Review: all competitors in parallel under one deadline.
            let review = self.orchestrator.coordinator().start_review(game_id)?;
            self.emit(GameEvent::ReviewStart {
                round,
                agents: review.prompts.len(),
                deadline: review.deadline,
            });
            let outcomes = self
                .run_parallel(game_id, AgentRole::Reviewer, review.prompts, review_duration)
                .await;
            for outcome in outcomes {
                usage.add(outcome.usage);
                self.emit(GameEvent::ReviewAgentDone {
                    round,
                    agent_id: outcome.agent_id,
                    aborted: outcome.aborted,
                    usage: outcome.usage,
                });
            }
            self.emit(GameEvent::ReviewEnd { round });

            // Review scoring: one referee pass per pending dispute.
            let dispute_scoring = self
                .orchestrator
                .coordinator()
                .start_review_scoring(game_id)?;
            self.emit(GameEvent::DisputeScoringStart {
                round,
                pending: dispute_scoring.prompts.len(),
            });
            for prompt in dispute_scoring.prompts {
                let outcome = self
                    .run_bounded(
                        game_id,
                        "referee",
                        AgentRole::Referee,
                        prompt.prompt,
                        self.config.dispute_timeout,
                    )
                    .await;
                usage.add(outcome.usage);
                let dispute = self.orchestrator.store().with_conn(|conn| {
                    DisputeRepo::find_by_id(conn, prompt.dispute_id)?
                        .ok_or(BonesError::DisputeNotFound(prompt.dispute_id))
                })?;
                self.emit(GameEvent::DisputeResolved {
                    round,
                    dispute_id: dispute.id,
                    finding_id: dispute.finding_id,
                    status: dispute.status,
                    usage: outcome.usage,
                });
            }
            self.emit(GameEvent::DisputeScoringEnd { round });

            // Decide the round.
            let outcome = self.orchestrator.coordinator().check_winner(game_id)?;
            let action = match &outcome {
                WinnerOutcome::GameComplete { .. } => "GAME_COMPLETE",
                WinnerOutcome::TieBreaker { .. } => "TIE_BREAKER",
                WinnerOutcome::Continue { .. } => "CONTINUE",
            };
            let scores = match &outcome {
                WinnerOutcome::GameComplete { final_scores, .. } => final_scores.clone(),
                WinnerOutcome::TieBreaker { scores, .. } => scores.clone(),
                WinnerOutcome::Continue { scores } => scores.clone(),
            };
            self.emit(GameEvent::RoundComplete {
                round,
                action: action.to_string(),
                scores,
            });

            if let WinnerOutcome::GameComplete {
                winner_id,
                reason,
                final_scores,
            } = outcome
            {
                self.emit(GameEvent::GameComplete {
                    round,
                    winner_id: winner_id.clone(),
                    reason: reason.clone(),
                    usage,
                    final_scores,
                });
                return Ok(RunSummary {
                    game_id: game.id,
                    rounds: round,
                    winner_id,
                    reason,
                    usage,
                });
            }
        }
    }

    /// Fan out one phase's agents, all sharing a deadline. Every task runs
    /// to its own terminal result; failures are logged and reported as
    /// aborted outcomes, never propagated to peers.
    async fn run_parallel(
        &self,
        game_id: &str,
        role: AgentRole,
        prompts: Vec<AgentPrompt>,
        deadline: Duration,
    ) -> Vec<AgentOutcome> {
        let phase_token = self.cancel.child_token();
        let watchdog_token = phase_token.clone();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            watchdog_token.cancel();
        });

        let mut set = JoinSet::new();
        let mut agent_by_task: HashMap<tokio::task::Id, String> = HashMap::new();
        for prompt in prompts {
            let driver = self.driver.clone();
            let token = phase_token.clone();
            let agent_id = prompt.agent_id.clone();
            let run = AgentRun {
                game_id: game_id.to_string(),
                agent_id: prompt.agent_id,
                role,
                prompt: prompt.prompt,
            };
            let task_agent = agent_id.clone();
            let handle = set.spawn(async move {
                (task_agent, driver.run_agent(run, token).await)
            });
            agent_by_task.insert(handle.id(), agent_id);
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => outcomes.push(outcome),
                Ok((agent_id, Err(err))) => {
                    warn!(agent = %agent_id, error = %err, "agent run failed");
                    outcomes.push(AgentOutcome::aborted(agent_id, err.to_string()));
                }
                // A panicked (or aborted) task still yields a terminal
                // result; attribute it through the task-id tag.
                Err(join_err) => {
                    let agent_id = agent_by_task
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(agent = %agent_id, error = %join_err, "agent task panicked");
                    outcomes.push(AgentOutcome::aborted(agent_id, join_err.to_string()));
                }
            }
        }
        watchdog.abort();
        outcomes
    }

    /// Run a single referee or verifier invocation under its own timeout.
    async fn run_bounded(
        &self,
        game_id: &str,
        label: &str,
        role: AgentRole,
        prompt: String,
        timeout: Duration,
    ) -> AgentOutcome {
        let token = self.cancel.child_token();
        let run = AgentRun {
            game_id: game_id.to_string(),
            agent_id: label.to_string(),
            role,
            prompt,
        };
        match tokio::time::timeout(timeout, self.driver.run_agent(run, token.clone())).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(%label, error = %err, "adjudication run failed");
                AgentOutcome::aborted(label, err.to_string())
            }
            Err(_) => {
                token.cancel();
                warn!(%label, ?timeout, "adjudication run timed out");
                AgentOutcome::aborted(label, "timed out")
            }
        }
    }
}
