//! Async driver around [`ReviewController`].
//!
//! One task owns the controller and serializes every input through a single
//! `select!` loop: user commands, backend completions and playback ticks.
//! Each rendered frame is published on a `watch` channel, so readers always
//! see the latest consistent view and never an intermediate one.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::controller::{Effect, ReviewController};
use super::player::TickEpoch;
use super::projector::RenderState;
use super::simulation::{SimulationRequest, SimulationTicket};
use crate::backend::ReviewBackend;
use crate::error::{FetchError, SimulationError};
use crate::review::models::{GameState, MatchReview, ScoredState};
use crate::review::LoadTicket;

#[derive(Debug)]
pub enum Command {
    SelectMatch(String),
    Refresh,
    StartPlayback,
    StopPlayback,
    /// Replies once the modification is accepted or rejected, not when scored.
    Simulate {
        modification: GameState,
        reply: oneshot::Sender<Result<(), SimulationError>>,
    },
    ResetSimulation,
    Close,
}

enum Completion {
    Review(LoadTicket, Result<MatchReview, FetchError>),
    Scored(SimulationTicket, Result<ScoredState, SimulationError>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("review session is not running")]
    Closed,

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RenderState>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn select_match(&self, match_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::SelectMatch(match_id.into())).await
    }

    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.send(Command::Refresh).await
    }

    pub async fn start_playback(&self) -> Result<(), SessionError> {
        self.send(Command::StartPlayback).await
    }

    pub async fn stop_playback(&self) -> Result<(), SessionError> {
        self.send(Command::StopPlayback).await
    }

    pub async fn simulate(&self, modification: GameState) -> Result<(), SessionError> {
        let (reply, accepted) = oneshot::channel();
        self.send(Command::Simulate {
            modification,
            reply,
        })
        .await?;
        accepted.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub async fn reset_simulation(&self) -> Result<(), SessionError> {
        self.send(Command::ResetSimulation).await
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.send(Command::Close).await
    }

    /// Latest published frame.
    pub fn view(&self) -> RenderState {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.view.clone()
    }
}

struct Ticker {
    epoch: TickEpoch,
    interval: Interval,
}

async fn next_tick(ticker: &mut Option<Ticker>) -> TickEpoch {
    match ticker {
        Some(t) => {
            t.interval.tick().await;
            t.epoch
        }
        None => pending().await,
    }
}

struct SessionRuntime {
    controller: ReviewController,
    backend: Arc<dyn ReviewBackend>,
    tick_interval: Duration,
    ticker: Option<Ticker>,
    completions: mpsc::UnboundedSender<Completion>,
    view: watch::Sender<RenderState>,
}

/// Spawn the session task. It exits once every [`SessionHandle`] is dropped.
pub fn spawn_session(
    backend: Arc<dyn ReviewBackend>,
    tick_interval: Duration,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let controller = ReviewController::new();
    let (view_tx, view_rx) = watch::channel(controller.view());

    let runtime = SessionRuntime {
        controller,
        backend,
        tick_interval,
        ticker: None,
        completions: completion_tx,
        view: view_tx,
    };
    let task = tokio::spawn(runtime.run(command_rx, completion_rx));

    let handle = SessionHandle {
        commands: command_tx,
        view: view_rx,
    };
    (handle, task)
}

impl SessionRuntime {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!(
            "Review session started (backend: {}, tick={:?})",
            self.backend.name(),
            self.tick_interval
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                epoch = next_tick(&mut self.ticker) => {
                    let effects = self.controller.on_tick(epoch);
                    self.apply(effects);
                }
            }
            self.publish();
        }

        info!("Review session stopped");
    }

    fn on_command(&mut self, command: Command) {
        let effects = match command {
            Command::SelectMatch(id) => self.controller.select_match(&id),
            Command::Refresh => self.controller.refresh(),
            Command::StartPlayback => self.controller.start_playback(),
            Command::StopPlayback => self.controller.stop_playback(),
            Command::Simulate {
                modification,
                reply,
            } => {
                let (effects, outcome) = match self.controller.simulate(modification) {
                    Ok(effects) => (effects, Ok(())),
                    Err(e) => {
                        debug!("Simulation rejected: {}", e);
                        (Vec::new(), Err(e))
                    }
                };
                // The caller may have given up waiting; nothing to do then.
                let _ = reply.send(outcome);
                effects
            }
            Command::ResetSimulation => {
                self.controller.reset_simulation();
                Vec::new()
            }
            Command::Close => self.controller.close(),
        };
        self.apply(effects);
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Review(ticket, result) => {
                match self.controller.on_review_loaded(&ticket, result) {
                    Ok(effects) => self.apply(effects),
                    Err(stale) => debug!("Review for {}: {}", ticket.match_id, stale),
                }
            }
            Completion::Scored(ticket, result) => {
                if let Err(stale) = self.controller.on_simulation_scored(ticket, result) {
                    debug!("Simulation result: {}", stale);
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch(ticket) => self.spawn_fetch(ticket),
                Effect::Score(request) => self.spawn_score(request),
                Effect::ArmTicker(epoch) => {
                    let mut interval =
                        interval_at(Instant::now() + self.tick_interval, self.tick_interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.ticker = Some(Ticker { epoch, interval });
                }
                Effect::DisarmTicker => self.ticker = None,
            }
        }
    }

    fn spawn_fetch(&self, ticket: LoadTicket) {
        let backend = Arc::clone(&self.backend);
        let done = self.completions.clone();
        tokio::spawn(async move {
            let result = backend.fetch_review(&ticket.match_id).await;
            if done.send(Completion::Review(ticket, result)).is_err() {
                warn!("Review fetched after session shutdown");
            }
        });
    }

    fn spawn_score(&self, request: SimulationRequest) {
        let backend = Arc::clone(&self.backend);
        let done = self.completions.clone();
        tokio::spawn(async move {
            let result = backend.simulate(&request.to_wire()).await;
            if done.send(Completion::Scored(request.ticket, result)).is_err() {
                warn!("Simulation scored after session shutdown");
            }
        });
    }

    fn publish(&self) {
        let next = self.controller.view();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sample_review, ScriptedBackend};
    use crate::error::ConnectionError;
    use crate::session::player::PlaybackState;
    use crate::session::projector::{ViewMode, ViewStatus};

    const TICK: Duration = Duration::from_secs(5);

    fn start(backend: &Arc<ScriptedBackend>) -> (SessionHandle, JoinHandle<()>) {
        spawn_session(Arc::clone(backend) as Arc<dyn ReviewBackend>, TICK)
    }

    async fn ready(handle: &SessionHandle, id: &str) {
        let mut rx = handle.subscribe();
        rx.wait_for(|v| v.status == ViewStatus::Ready && v.match_id.as_deref() == Some(id))
            .await
            .unwrap();
    }

    fn patch(field: &str, value: f64) -> GameState {
        let mut s = GameState::default();
        s.set(field, value);
        s
    }

    #[tokio::test(start_paused = true)]
    async fn late_review_for_previous_selection_is_dropped() {
        let backend = Arc::new(ScriptedBackend::new());
        let reply_a = backend.expect_review("A");
        let reply_b = backend.expect_review("B");
        let (handle, _task) = start(&backend);

        handle.select_match("A").await.unwrap();
        handle.select_match("B").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut calls = backend.review_calls();
        calls.sort();
        assert_eq!(calls, vec!["A", "B"]);

        reply_b.send(Ok(sample_review("B"))).unwrap();
        ready(&handle, "B").await;

        reply_a.send(Ok(sample_review("A"))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let view = handle.view();
        assert_eq!(view.match_id.as_deref(), Some("B"));
        assert_eq!(view.status, ViewStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_surfaces_and_retry_recovers() {
        let backend = Arc::new(ScriptedBackend::new());
        let reply = backend.expect_review("A");
        let (handle, _task) = start(&backend);

        handle.select_match("A").await.unwrap();
        reply
            .send(Err(ConnectionError::status(503, "Service Unavailable").into()))
            .unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|v| v.status == ViewStatus::Error).await.unwrap();
        assert!(handle.view().error.unwrap().contains("503"));

        handle.refresh().await.unwrap();
        ready(&handle, "A").await;
        assert!(handle.view().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn playback_advances_per_tick_and_finishes() {
        let backend = Arc::new(ScriptedBackend::new());
        let (handle, _task) = start(&backend);
        handle.select_match("A").await.unwrap();
        ready(&handle, "A").await;

        handle.start_playback().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            handle.view().playback.state,
            PlaybackState::Playing { cursor: 0 }
        );

        tokio::time::sleep(TICK).await;
        assert_eq!(
            handle.view().playback.state,
            PlaybackState::Playing { cursor: 1 }
        );

        tokio::time::sleep(TICK * 10).await;
        let view = handle.view();
        assert_eq!(view.playback.state, PlaybackState::Finished { cursor: 4 });
        assert_eq!(view.chart.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_playback_halts_ticks() {
        let backend = Arc::new(ScriptedBackend::new());
        let (handle, _task) = start(&backend);
        handle.select_match("A").await.unwrap();
        ready(&handle, "A").await;

        handle.start_playback().await.unwrap();
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        handle.stop_playback().await.unwrap();
        tokio::time::sleep(TICK * 3).await;

        let view = handle.view();
        assert_eq!(view.playback.state, PlaybackState::Idle);
        assert_eq!(view.mode, ViewMode::PostGame);
    }

    #[tokio::test(start_paused = true)]
    async fn simulate_while_pending_is_busy_then_chains() {
        let backend = Arc::new(ScriptedBackend::new());
        let first_reply = backend.expect_score();
        let (handle, _task) = start(&backend);
        handle.select_match("A").await.unwrap();
        ready(&handle, "A").await;

        handle.simulate(patch("gold_diff", 1000.0)).await.unwrap();
        assert_eq!(
            handle.simulate(patch("dragons_diff", 1.0)).await,
            Err(SessionError::Simulation(SimulationError::Busy))
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = backend.simulate_calls()[0].clone();
        first_reply
            .send(Ok(ScoredState {
                win_probability: 0.58,
                attributions: vec![("gold_diff".into(), 0.08)],
                modified_state: first.current_state.merge(&first.modifications),
                explanation: None,
            }))
            .unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|v| v.simulation.steps == 1).await.unwrap();

        handle.simulate(patch("dragons_diff", 1.0)).await.unwrap();
        rx.wait_for(|v| v.simulation.steps == 2).await.unwrap();

        let calls = backend.simulate_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].current_state.gold_diff, Some(1000.0));
        assert_eq!(calls[1].modifications, patch("dragons_diff", 1.0));
        assert_eq!(handle.view().mode, ViewMode::Simulated);
    }

    #[tokio::test(start_paused = true)]
    async fn simulate_during_playback_freezes_at_cursor() {
        let backend = Arc::new(ScriptedBackend::new());
        let (handle, _task) = start(&backend);
        handle.select_match("A").await.unwrap();
        ready(&handle, "A").await;

        handle.start_playback().await.unwrap();
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        handle.simulate(patch("barons_diff", 1.0)).await.unwrap();
        tokio::time::sleep(TICK * 4).await;

        let view = handle.view();
        assert_eq!(view.playback.state, PlaybackState::Idle);
        assert_eq!(view.mode, ViewMode::Simulated);
        assert_eq!(view.simulation.anchor_timestamp_ms, Some(300_000));
        assert_eq!(view.chart.len(), 2);
        assert_eq!(
            backend.simulate_calls()[0].current_state,
            sample_review("A").timeline[1].game_state()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn simulate_without_match_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let (handle, _task) = start(&backend);
        assert_eq!(
            handle.simulate(patch("gold_diff", 1.0)).await,
            Err(SessionError::Simulation(SimulationError::NoMatch))
        );
        assert!(backend.simulate_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_stops_when_handles_drop() {
        let backend = Arc::new(ScriptedBackend::new());
        let (handle, task) = start(&backend);
        drop(handle);
        task.await.unwrap();
    }
}
