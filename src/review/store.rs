//! Holder of the active match review.
//!
//! Every load is tagged with a monotonically increasing generation. Only the
//! completion carrying the latest generation may publish; anything older was
//! superseded by a later `begin_load` and is discarded.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::models::MatchReview;
use crate::error::{FetchError, StaleResponse};

/// Token handed out by [`MatchStore::begin_load`] and checked on resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreStatus {
    Empty,
    Loading,
    Ready,
    Failed(FetchError),
}

/// What a successful (non-stale) resolution did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Published(Arc<MatchReview>),
    Failed,
}

#[derive(Debug, Clone)]
pub struct MatchStore {
    generation: u64,
    active_id: Option<String>,
    status: StoreStatus,
    review: Option<Arc<MatchReview>>,
}

impl Default for MatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchStore {
    pub fn new() -> Self {
        MatchStore {
            generation: 0,
            active_id: None,
            status: StoreStatus::Empty,
            review: None,
        }
    }

    /// Start loading `match_id`, superseding any load still in flight.
    ///
    /// Switching to a different id drops the published review immediately.
    /// Reloading the same id keeps it visible until the replacement lands.
    pub fn begin_load(&mut self, match_id: &str) -> LoadTicket {
        self.generation += 1;
        if self.active_id.as_deref() != Some(match_id) {
            if let Some(prev) = self.active_id.replace(match_id.to_string()) {
                debug!("Switching match {} → {}", prev, match_id);
            }
            self.review = None;
        }
        self.status = StoreStatus::Loading;
        LoadTicket {
            generation: self.generation,
            match_id: match_id.to_string(),
        }
    }

    /// Reload the active match, if any.
    pub fn begin_refresh(&mut self) -> Option<LoadTicket> {
        let id = self.active_id.clone()?;
        Some(self.begin_load(&id))
    }

    /// Apply a completed fetch. Completions for a superseded generation are
    /// rejected without touching the store.
    pub fn resolve(
        &mut self,
        ticket: &LoadTicket,
        result: Result<MatchReview, FetchError>,
    ) -> Result<LoadOutcome, StaleResponse> {
        if ticket.generation != self.generation
            || self.active_id.as_deref() != Some(ticket.match_id.as_str())
        {
            return Err(StaleResponse {
                received: ticket.generation,
                current: self.generation,
            });
        }

        match result {
            Ok(review) => {
                info!(
                    "Published review for match {} ({} snapshots)",
                    review.match_id,
                    review.timeline.len()
                );
                let review = Arc::new(review);
                self.review = Some(Arc::clone(&review));
                self.status = StoreStatus::Ready;
                // Bump so a duplicate delivery of the same ticket cannot republish.
                self.generation += 1;
                Ok(LoadOutcome::Published(review))
            }
            Err(e) => {
                warn!("Failed to load match {}: {}", ticket.match_id, e);
                self.review = None;
                self.status = StoreStatus::Failed(e);
                self.generation += 1;
                Ok(LoadOutcome::Failed)
            }
        }
    }

    /// Forget everything; late completions become stale.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.active_id = None;
        self.review = None;
        self.status = StoreStatus::Empty;
    }

    pub fn review(&self) -> Option<&Arc<MatchReview>> {
        self.review.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
