use async_trait::async_trait;

use crate::error::{FetchError, SimulationError};
use crate::review::models::{GameKind, LiveMatch, MatchReview, ScoredState, SimulateRequest};

/// Trait every inference backend must implement.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    /// Fetch and validate the full review of one match.
    async fn fetch_review(&self, match_id: &str) -> Result<MatchReview, FetchError>;

    /// List matches currently available as live sources.
    async fn list_live_matches(&self, game: GameKind) -> Result<Vec<LiveMatch>, FetchError>;

    /// Score a counterfactual game state.
    async fn simulate(&self, request: &SimulateRequest) -> Result<ScoredState, SimulationError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
