use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::provider::ReviewBackend;
use crate::error::{ConnectionError, FetchError, SimulationError};
use crate::review::models::{GameKind, LiveMatch, MatchReview, ScoredState, SimulateRequest};
use crate::review::parse::{parse_live_matches, parse_review, parse_scored_state};

/// Client for the DecisionLens inference API (reviews, live listings, what-if scoring).
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL '{}'", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Backend URL '{}' cannot be used as a base", base_url);
        }
        Ok(BackendClient { http, base_url })
    }

    /// `{base}/seg/seg/...`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn json(resp: Response) -> Result<serde_json::Value, ConnectionError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("error");
            let message = if body.is_empty() {
                reason.to_string()
            } else {
                format!("{} ({})", reason, body.trim())
            };
            return Err(ConnectionError::status(status.as_u16(), message));
        }
        resp.json().await.map_err(ConnectionError::from)
    }
}

#[async_trait]
impl ReviewBackend for BackendClient {
    fn name(&self) -> &str {
        "DecisionLens API"
    }

    async fn fetch_review(&self, match_id: &str) -> Result<MatchReview, FetchError> {
        let url = self.endpoint(&["match", match_id, "review"]);
        debug!("Fetching match review: {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ConnectionError::from)?;
        let raw = Self::json(resp).await?;
        let review = parse_review(&raw, match_id)?;

        info!(
            "Fetched review for match {} ({} snapshots)",
            match_id,
            review.timeline.len()
        );
        Ok(review)
    }

    async fn list_live_matches(&self, game: GameKind) -> Result<Vec<LiveMatch>, FetchError> {
        let mut url = self.endpoint(&["matches", "live"]);
        url.query_pairs_mut().append_pair("game", game.as_str());
        debug!("Fetching live matches: {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ConnectionError::from)?;
        let raw = Self::json(resp).await?;
        Ok(parse_live_matches(&raw)?)
    }

    async fn simulate(&self, request: &SimulateRequest) -> Result<ScoredState, SimulationError> {
        let url = self.endpoint(&["simulate"]);
        debug!("Posting simulation to {}", url);

        let resp = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(ConnectionError::from)?;
        let raw = Self::json(resp).await?;
        Ok(parse_scored_state(&raw)?)
    }
}
