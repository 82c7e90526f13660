//! Orchestrates store, player and simulation in response to user actions and
//! completions.
//!
//! The controller never performs I/O. Each transition returns the
//! [`Effect`]s the runtime must carry out, which keeps every ordering rule
//! testable without a clock or a network.

use tracing::{debug, info};

use super::player::{TickEpoch, TickOutcome, TimelinePlayer};
use super::projector::{project, RenderState};
use super::simulation::{LiveBaseline, SimulationRequest, SimulationSession, SimulationTicket};
use crate::error::{FetchError, SimulationError, StaleResponse};
use crate::review::models::{GameState, MatchReview, ScoredState};
use crate::review::{LoadOutcome, LoadTicket, MatchStore};

/// Side effect requested by a controller transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(LoadTicket),
    Score(SimulationRequest),
    /// Replace any existing tick source with a fresh one for this epoch.
    ArmTicker(TickEpoch),
    DisarmTicker,
}

#[derive(Debug, Default)]
pub struct ReviewController {
    store: MatchStore,
    player: TimelinePlayer,
    simulation: SimulationSession,
}

impl ReviewController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `match_id`. Player and simulation reset in the same step,
    /// so no view ever mixes the old match with the new one.
    pub fn select_match(&mut self, match_id: &str) -> Vec<Effect> {
        info!("Selecting match {}", match_id);
        self.reset_derived();
        let ticket = self.store.begin_load(match_id);
        vec![Effect::DisarmTicker, Effect::Fetch(ticket)]
    }

    /// Refetch the active match (manual refresh or retry after a failure).
    pub fn refresh(&mut self) -> Vec<Effect> {
        let Some(ticket) = self.store.begin_refresh() else {
            return Vec::new();
        };
        self.reset_derived();
        vec![Effect::DisarmTicker, Effect::Fetch(ticket)]
    }

    pub fn on_review_loaded(
        &mut self,
        ticket: &LoadTicket,
        result: Result<MatchReview, FetchError>,
    ) -> Result<Vec<Effect>, StaleResponse> {
        if let LoadOutcome::Published(review) = self.store.resolve(ticket, result)? {
            debug!(
                "Review {} ready: {} macro / {} micro insights",
                review.match_id,
                review.macro_insights.len(),
                review.micro_insights.len()
            );
        }
        // The review was replaced or dropped; derived state goes with it.
        self.reset_derived();
        Ok(vec![Effect::DisarmTicker])
    }

    pub fn start_playback(&mut self) -> Vec<Effect> {
        let Some(review) = self.store.review() else {
            return Vec::new();
        };
        let count = review.timeline.len();
        match self.player.start(count) {
            Some(epoch) => {
                self.simulation.reset();
                info!("Live playback started ({} snapshots)", count);
                vec![Effect::DisarmTicker, Effect::ArmTicker(epoch)]
            }
            None => Vec::new(),
        }
    }

    pub fn stop_playback(&mut self) -> Vec<Effect> {
        if self.player.stop() {
            info!("Live playback stopped");
        }
        self.simulation.reset();
        vec![Effect::DisarmTicker]
    }

    pub fn on_tick(&mut self, epoch: TickEpoch) -> Vec<Effect> {
        match self.player.tick(epoch) {
            TickOutcome::Advanced { cursor } => {
                debug!("Playback cursor → {}", cursor);
                Vec::new()
            }
            TickOutcome::Finished { cursor } => {
                info!("Playback finished at snapshot {}", cursor);
                vec![Effect::DisarmTicker]
            }
            TickOutcome::Ignored => Vec::new(),
        }
    }

    /// Submit a what-if modification. If playback is live, its cursor
    /// provides the baseline and playback is stopped.
    pub fn simulate(&mut self, modification: GameState) -> Result<Vec<Effect>, SimulationError> {
        let review = self.store.review().ok_or(SimulationError::NoMatch)?;
        let snapshot = self
            .player
            .cursor()
            .and_then(|c| review.snapshot(c))
            .or_else(|| review.final_snapshot())
            .ok_or(SimulationError::NoMatch)?;
        let live = LiveBaseline {
            state: snapshot.game_state(),
            timestamp_ms: snapshot.timestamp_ms,
            win_probability: snapshot.win_probability,
        };

        let request = self.simulation.begin(modification, live)?;

        let mut effects = Vec::with_capacity(2);
        if self.player.stop() {
            debug!("Playback stopped for simulation");
            effects.push(Effect::DisarmTicker);
        }
        effects.push(Effect::Score(request));
        Ok(effects)
    }

    pub fn on_simulation_scored(
        &mut self,
        ticket: SimulationTicket,
        result: Result<ScoredState, SimulationError>,
    ) -> Result<(), StaleResponse> {
        self.simulation.resolve(ticket, result)
    }

    pub fn reset_simulation(&mut self) {
        self.simulation.reset();
    }

    /// Forget the active match entirely (view torn down).
    pub fn close(&mut self) -> Vec<Effect> {
        self.reset_derived();
        self.store.clear();
        vec![Effect::DisarmTicker]
    }

    pub fn view(&self) -> RenderState {
        project(&self.store, &self.player, &self.simulation)
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn player(&self) -> &TimelinePlayer {
        &self.player
    }

    pub fn simulation(&self) -> &SimulationSession {
        &self.simulation
    }

    fn reset_derived(&mut self) {
        self.player.reset();
        self.simulation.reset();
    }
}
