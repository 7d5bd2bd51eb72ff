//! Full-game runs through the autonomous runner with a scripted driver.

use async_trait::async_trait;
use bones::config::GameConfig;
use bones::entity::{DisputeStatus, FindingStatus, FindingVerdict, GamePhase};
use bones::orchestrator::Orchestrator;
use bones::runner::{
    AgentDriver, AgentOutcome, AgentRole, AgentRun, GameEvent, GameRunner, RunnerConfig,
    TokenUsage,
};
use bones::scoring::ValidationRequest;
use bones::store::Store;
use bones::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted stand-in for the LLM harness: one designated agent submits a
/// finding each hunt, referees validate everything, nobody disputes.
struct ScriptedDriver {
    orch: Arc<Orchestrator>,
    finder_id: String,
    usage_per_run: TokenUsage,
}

#[async_trait]
impl AgentDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run_agent(&self, run: AgentRun, _cancel: CancellationToken) -> Result<AgentOutcome> {
        let game = self.orch.get_game(&run.game_id)?;
        match run.role {
            AgentRole::Hunter => {
                if run.agent_id == self.finder_id {
                    self.orch.submission().submit_finding(
                        &run.game_id,
                        &run.agent_id,
                        "src/engine.rs",
                        40 + game.round * 10,
                        45 + game.round * 10,
                        &format!("round {} off by one in retry loop", game.round),
                        None,
                    )?;
                }
                self.orch
                    .submission()
                    .mark_agent_done(&run.game_id, &run.agent_id, GamePhase::Hunt)?;
            }
            AgentRole::Reviewer => {
                self.orch
                    .submission()
                    .mark_agent_done(&run.game_id, &run.agent_id, GamePhase::Review)?;
            }
            AgentRole::Referee => {
                // validate the first still-pending finding, resolve the
                // first still-pending dispute; sequential passes mean each
                // invocation sees exactly one of its kind
                let pending = self
                    .orch
                    .findings(&run.game_id, Some(game.round), Some(FindingStatus::Pending))?;
                if let Some(finding) = pending.first() {
                    self.orch.submission().validate_finding(
                        &run.game_id,
                        finding.id,
                        ValidationRequest::new(FindingVerdict::Valid, "reproduced"),
                    )?;
                }
            }
            AgentRole::Verifier => {}
        }
        Ok(AgentOutcome::completed(run.agent_id, self.usage_per_run))
    }
}

/// Driver whose competitors never finish on their own; they only return
/// once the phase deadline cancels them.
struct StallingDriver;

#[async_trait]
impl AgentDriver for StallingDriver {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn run_agent(&self, run: AgentRun, cancel: CancellationToken) -> Result<AgentOutcome> {
        match run.role {
            AgentRole::Hunter | AgentRole::Reviewer => {
                cancel.cancelled().await;
                Ok(AgentOutcome::aborted(run.agent_id, "deadline"))
            }
            _ => Ok(AgentOutcome::completed(run.agent_id, TokenUsage::default())),
        }
    }
}

fn new_game(target: i64, num_agents: usize, max_rounds: u32) -> (Arc<Orchestrator>, String, Vec<String>) {
    let orch = Arc::new(Orchestrator::with_store(Arc::new(
        Store::open_in_memory().unwrap(),
    )));
    let mut config = GameConfig::new("https://example.com/repo");
    config.target_score = target;
    config.num_agents = num_agents;
    config.max_rounds = max_rounds;
    config.hunt_duration_secs = 300;
    config.review_duration_secs = 180;
    let (game, agents) = orch.create_game(config, false).unwrap();
    let agent_ids = agents.into_iter().map(|a| a.id).collect();
    (orch, game.id, agent_ids)
}

#[tokio::test(start_paused = true)]
async fn scripted_game_runs_to_completion() {
    let (orch, game_id, agent_ids) = new_game(2, 3, 5);
    let driver = Arc::new(ScriptedDriver {
        orch: orch.clone(),
        finder_id: agent_ids[0].clone(),
        usage_per_run: TokenUsage {
            input_tokens: 100,
            output_tokens: 25,
        },
    });
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = GameRunner::new(orch.clone(), driver, tx);

    let summary = runner.run(&game_id).await.unwrap();
    // one valid finding per round, target 2 -> two rounds
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.winner_id, agent_ids[0]);
    assert!(summary.usage.total() > 0);

    let game = orch.get_game(&game_id).unwrap();
    assert_eq!(game.phase, GamePhase::Complete);
    assert_eq!(game.winner_agent_id.as_deref(), Some(agent_ids[0].as_str()));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let types: Vec<&str> = events
        .iter()
        .map(|e| match e {
            GameEvent::GameCreated { .. } => "game_created",
            GameEvent::RoundStart { .. } => "round_start",
            GameEvent::HuntStart { .. } => "hunt_start",
            GameEvent::HuntAgentDone { .. } => "hunt_agent_done",
            GameEvent::HuntEnd { .. } => "hunt_end",
            GameEvent::ScoringStart { .. } => "scoring_start",
            GameEvent::FindingValidated { .. } => "finding_validated",
            GameEvent::ScoringEnd { .. } => "scoring_end",
            GameEvent::VerificationStart { .. } => "verification_start",
            GameEvent::FindingVerified { .. } => "finding_verified",
            GameEvent::VerificationEnd { .. } => "verification_end",
            GameEvent::ReviewStart { .. } => "review_start",
            GameEvent::ReviewAgentDone { .. } => "review_agent_done",
            GameEvent::ReviewEnd { .. } => "review_end",
            GameEvent::DisputeScoringStart { .. } => "dispute_scoring_start",
            GameEvent::DisputeResolved { .. } => "dispute_resolved",
            GameEvent::DisputeScoringEnd { .. } => "dispute_scoring_end",
            GameEvent::RoundComplete { .. } => "round_complete",
            GameEvent::GameComplete { .. } => "game_complete",
        })
        .collect();

    assert_eq!(types.first(), Some(&"game_created"));
    assert_eq!(types.last(), Some(&"game_complete"));
    assert_eq!(types.iter().filter(|t| **t == "round_start").count(), 2);
    assert_eq!(types.iter().filter(|t| **t == "hunt_agent_done").count(), 6);
    assert_eq!(
        types.iter().filter(|t| **t == "finding_validated").count(),
        2
    );

    // every validated finding scored +1 to the finder
    for event in &events {
        if let GameEvent::FindingValidated { status, points, .. } = event {
            assert_eq!(*status, FindingStatus::Valid);
            assert_eq!(*points, 1);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_agents_are_cancelled_and_game_still_completes() {
    let (orch, game_id, _) = new_game(100, 2, 1);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = GameRunner::new(orch.clone(), Arc::new(StallingDriver), tx);

    let summary = runner.run(&game_id).await.unwrap();
    // nobody scored; the round cap forces completion via the tiebreak
    assert_eq!(summary.rounds, 1);
    assert!(!summary.winner_id.is_empty());

    let mut saw_aborted_hunter = false;
    while let Ok(event) = rx.try_recv() {
        if let GameEvent::HuntAgentDone { aborted, .. } = event {
            assert!(aborted);
            saw_aborted_hunter = true;
        }
    }
    assert!(saw_aborted_hunter);

    let game = orch.get_game(&game_id).unwrap();
    assert_eq!(game.phase, GamePhase::Complete);
}

/// Driver whose designated hunter panics outright; everyone else returns
/// normally.
struct PanickingDriver {
    panicker: String,
}

#[async_trait]
impl AgentDriver for PanickingDriver {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn run_agent(&self, run: AgentRun, _cancel: CancellationToken) -> Result<AgentOutcome> {
        if run.role == AgentRole::Hunter && run.agent_id == self.panicker {
            panic!("hunter crashed mid-run");
        }
        Ok(AgentOutcome::completed(run.agent_id, TokenUsage::default()))
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_agent_is_collected_as_aborted_without_stalling_the_phase() {
    let (orch, game_id, agent_ids) = new_game(100, 2, 1);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let driver = Arc::new(PanickingDriver {
        panicker: agent_ids[0].clone(),
    });
    let runner = GameRunner::new(orch.clone(), driver, tx);

    let summary = runner.run(&game_id).await.unwrap();
    assert_eq!(summary.rounds, 1);

    // the panicked hunter still produces a terminal (aborted) outcome,
    // and its peer is unaffected
    let mut hunt_done = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let GameEvent::HuntAgentDone {
            agent_id, aborted, ..
        } = event
        {
            hunt_done.push((agent_id, aborted));
        }
    }
    assert_eq!(hunt_done.len(), 2);
    let panicked = hunt_done
        .iter()
        .find(|(id, _)| *id == agent_ids[0])
        .expect("panicked agent must still report");
    assert!(panicked.1);
    let peer = hunt_done.iter().find(|(id, _)| *id == agent_ids[1]).unwrap();
    assert!(!peer.1);

    let game = orch.get_game(&game_id).unwrap();
    assert_eq!(game.phase, GamePhase::Complete);
}

#[tokio::test(start_paused = true)]
async fn external_cancel_stops_the_run_cleanly() {
    let (orch, game_id, _) = new_game(100, 2, 0);
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = GameRunner::new(orch.clone(), Arc::new(StallingDriver), tx);
    let cancel = runner.cancel_token();

    // stop the run while the first hunt is in flight
    let handle = tokio::spawn(async move { runner.run(&game_id).await });
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    cancel.cancel();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(bones::BonesError::Cancelled(_))));
}

#[tokio::test(start_paused = true)]
async fn dispute_events_flow_through_the_stream() {
    // drive disputes with a driver whose reviewers challenge every finding
    struct DisputingDriver {
        orch: Arc<Orchestrator>,
    }

    #[async_trait]
    impl AgentDriver for DisputingDriver {
        fn name(&self) -> &'static str {
            "disputing"
        }

        async fn run_agent(&self, run: AgentRun, _cancel: CancellationToken) -> Result<AgentOutcome> {
            let game = self.orch.get_game(&run.game_id)?;
            match run.role {
                AgentRole::Hunter => {
                    self.orch.submission().submit_finding(
                        &run.game_id,
                        &run.agent_id,
                        "src/lib.rs",
                        1,
                        5,
                        &format!("claim from {}", run.agent_id),
                        None,
                    )?;
                    self.orch
                        .submission()
                        .mark_agent_done(&run.game_id, &run.agent_id, GamePhase::Hunt)?;
                }
                AgentRole::Reviewer => {
                    let disputable = self
                        .orch
                        .findings(&run.game_id, None, Some(FindingStatus::Valid))?
                        .into_iter()
                        .find(|f| f.agent_id != run.agent_id);
                    if let Some(finding) = disputable {
                        self.orch.submission().submit_dispute(
                            &run.game_id,
                            &run.agent_id,
                            finding.id,
                            "overstated",
                        )?;
                    }
                    self.orch
                        .submission()
                        .mark_agent_done(&run.game_id, &run.agent_id, GamePhase::Review)?;
                }
                AgentRole::Referee => {
                    let pending = self.orch.findings(
                        &run.game_id,
                        Some(game.round),
                        Some(FindingStatus::Pending),
                    )?;
                    if let Some(finding) = pending.first() {
                        self.orch.submission().validate_finding(
                            &run.game_id,
                            finding.id,
                            ValidationRequest::new(FindingVerdict::Valid, "checks out"),
                        )?;
                    } else {
                        let disputes = self
                            .orch
                            .disputes(&run.game_id, Some(game.round), Some(DisputeStatus::Pending))?;
                        if let Some(dispute) = disputes.first() {
                            self.orch.submission().resolve_dispute(
                                &run.game_id,
                                dispute.id,
                                bones::entity::DisputeVerdict::Failed,
                                "finding stands",
                            )?;
                        }
                    }
                }
                AgentRole::Verifier => {}
            }
            Ok(AgentOutcome::completed(run.agent_id, TokenUsage::default()))
        }
    }

    let (orch, game_id, _) = new_game(100, 2, 1);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let driver = Arc::new(DisputingDriver { orch: orch.clone() });
    let runner = GameRunner::new(orch.clone(), driver, tx).with_config(RunnerConfig {
        referee_timeout: Duration::from_secs(30),
        verifier_timeout: Duration::from_secs(20),
        dispute_timeout: Duration::from_secs(20),
    });
    runner.run(&game_id).await.unwrap();

    let mut resolved = 0;
    while let Ok(event) = rx.try_recv() {
        if let GameEvent::DisputeResolved { status, .. } = event {
            assert_eq!(status, DisputeStatus::Failed);
            resolved += 1;
        }
    }
    // both agents validated a finding, each disputed the other's
    assert_eq!(resolved, 2);

    let disputes = orch.disputes(&game_id, None, None).unwrap();
    assert_eq!(disputes.len(), 2);
    assert!(disputes.iter().all(|d| d.status == DisputeStatus::Failed));
}
