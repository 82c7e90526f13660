//! Chained counterfactual ("what-if") session.
//!
//! Each accepted modification is applied on top of the previous result's
//! game state, so the session is a linear chain. Only one scoring call may be
//! in flight; a second `begin` is rejected until the first resolves, which
//! keeps results in submission order.

use tracing::{debug, info, warn};

use crate::error::{SimulationError, StaleResponse};
use crate::review::models::{Attributions, GameState, ScoredState, SimulateRequest};

/// Outcome of one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub win_probability: f64,
    pub attributions: Attributions,
    /// Baseline merged with the modification and the backend's echo.
    pub state: GameState,
    pub explanation: Option<String>,
}

/// One link of the chain, kept for auditing.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStep {
    pub baseline: GameState,
    pub modification: GameState,
    pub result: SimulationResult,
}

/// The untouched game state a chain starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveBaseline {
    pub state: GameState,
    pub timestamp_ms: u64,
    pub win_probability: f64,
}

/// Where the chain was first baselined on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainAnchor {
    pub timestamp_ms: u64,
    pub win_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTicket {
    generation: u64,
}

/// A call the runtime must send to the scoring service.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    pub ticket: SimulationTicket,
    pub baseline: GameState,
    pub modification: GameState,
}

impl SimulationRequest {
    pub fn to_wire(&self) -> SimulateRequest {
        SimulateRequest {
            current_state: self.baseline.clone(),
            modifications: self.modification.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCall {
    generation: u64,
    baseline: GameState,
    modification: GameState,
    anchor: ChainAnchor,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationSession {
    generation: u64,
    chain: Vec<SimulationStep>,
    anchor: Option<ChainAnchor>,
    pending: Option<PendingCall>,
    last_error: Option<SimulationError>,
}

impl SimulationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a modification. The baseline is the last result's state when a
    /// chain exists, otherwise `live`.
    pub fn begin(
        &mut self,
        modification: GameState,
        live: LiveBaseline,
    ) -> Result<SimulationRequest, SimulationError> {
        if self.pending.is_some() {
            return Err(SimulationError::Busy);
        }

        let (baseline, anchor) = match (self.chain.last(), self.anchor) {
            (Some(step), Some(anchor)) => (step.result.state.clone(), anchor),
            _ => (
                live.state,
                ChainAnchor {
                    timestamp_ms: live.timestamp_ms,
                    win_probability: live.win_probability,
                },
            ),
        };

        self.generation += 1;
        self.last_error = None;
        self.pending = Some(PendingCall {
            generation: self.generation,
            baseline: baseline.clone(),
            modification: modification.clone(),
            anchor,
        });
        debug!(
            "Simulation #{} queued (chain length {})",
            self.generation,
            self.chain.len()
        );

        Ok(SimulationRequest {
            ticket: SimulationTicket {
                generation: self.generation,
            },
            baseline,
            modification,
        })
    }

    /// Apply a scoring completion. Completions for a call that was reset away
    /// are stale; a failed call leaves the chain as it was.
    pub fn resolve(
        &mut self,
        ticket: SimulationTicket,
        result: Result<ScoredState, SimulationError>,
    ) -> Result<(), StaleResponse> {
        let current = self.generation;
        let pending = match self.pending.take() {
            Some(p) if p.generation == ticket.generation => p,
            other => {
                self.pending = other;
                return Err(StaleResponse {
                    received: ticket.generation,
                    current,
                });
            }
        };

        match result {
            Ok(scored) => {
                let state = pending
                    .baseline
                    .merge(&pending.modification)
                    .merge(&scored.modified_state);
                info!(
                    "Simulation #{} → win probability {:.3}",
                    ticket.generation, scored.win_probability
                );
                self.anchor = Some(pending.anchor);
                self.chain.push(SimulationStep {
                    baseline: pending.baseline,
                    modification: pending.modification,
                    result: SimulationResult {
                        win_probability: scored.win_probability,
                        attributions: scored.attributions,
                        state,
                        explanation: scored.explanation,
                    },
                });
            }
            Err(e) => {
                warn!("Simulation #{} failed: {}", ticket.generation, e);
                self.last_error = Some(e);
            }
        }
        Ok(())
    }

    /// Drop the chain and orphan any in-flight call.
    pub fn reset(&mut self) {
        if self.is_active() || self.pending.is_some() {
            debug!("Simulation session reset");
        }
        self.generation += 1;
        self.chain.clear();
        self.anchor = None;
        self.pending = None;
        self.last_error = None;
    }

    /// `true` once at least one result has been applied.
    pub fn is_active(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current(&self) -> Option<&SimulationResult> {
        self.chain.last().map(|s| &s.result)
    }

    pub fn steps(&self) -> &[SimulationStep] {
        &self.chain
    }

    pub fn anchor(&self) -> Option<ChainAnchor> {
        self.anchor
    }

    pub fn last_error(&self) -> Option<&SimulationError> {
        self.last_error.as_ref()
    }
}
