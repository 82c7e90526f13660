//! Fixtures and a scripted in-memory backend for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::provider::ReviewBackend;
use crate::error::{ConnectionError, FetchError, SimulationError};
use crate::review::models::{
    GameKind, Insight, LiveMatch, MatchReview, PlayerFrame, PlayerStat, ScoredState,
    SimulateRequest, TeamMeta, TimelineSnapshot,
};
use crate::session::simulation::SimulationRequest;

const TIMESTAMPS: [u64; 5] = [0, 300_000, 600_000, 900_000, 1_200_000];
const WIN_PROBS: [f64; 5] = [0.50, 0.52, 0.48, 0.55, 0.35];
const GOLD: [f64; 5] = [0.0, 450.0, -300.0, 1200.0, -2500.0];

fn insight(timestamp_ms: u64, category: &str, description: &str, player: Option<&str>) -> Insight {
    Insight {
        timestamp_ms,
        category: category.to_string(),
        description: description.to_string(),
        severity: Some("High".to_string()),
        player_id: player.map(str::to_string),
        magnitude: None,
    }
}

/// A five-snapshot League review: blue leads mid-game, then throws.
pub fn sample_review(match_id: &str) -> MatchReview {
    let timeline = TIMESTAMPS
        .iter()
        .zip(WIN_PROBS)
        .zip(GOLD)
        .enumerate()
        .map(|(i, ((&ts, wp), gold))| TimelineSnapshot {
            timestamp_ms: ts,
            win_probability: wp,
            gold_diff: gold,
            xp_diff: gold * 0.8,
            towers_diff: if i >= 3 { 1.0 } else { 0.0 },
            dragons_diff: if i == 4 { -2.0 } else { 0.0 },
            barons_diff: if i == 4 { -1.0 } else { 0.0 },
            team100_kills: Some(i as f64 * 3.0),
            team200_kills: Some(i as f64 * 4.0),
            players: vec![PlayerFrame {
                participant_id: "1".to_string(),
                values: vec![("totalGold".to_string(), 500.0 + ts as f64 / 100.0)],
            }],
            attributions: vec![
                ("gold_diff".to_string(), gold / 10_000.0),
                ("barons_diff".to_string(), if i == 4 { -0.2 } else { 0.0 }),
            ],
            positions: None,
        })
        .collect();

    MatchReview {
        match_id: match_id.to_string(),
        game: GameKind::Lol,
        timeline,
        macro_insights: vec![
            insight(240_000, "Gold Swing", "Early skirmish win top side", None),
            insight(660_000, "Objective", "Dragon conceded without contest", None),
            insight(1_080_000, "Gold Swing", "Baron throw", None),
        ],
        micro_insights: vec![
            insight(300_000, "Isolated Death", "Mid laner caught alone", Some("3")),
            insight(900_000, "Isolated Death", "Jungler face-checked river", Some("2")),
        ],
        player_stats: vec![PlayerStat {
            player_id: "1".to_string(),
            name: Some("Top".to_string()),
            team_id: Some("100".to_string()),
            stats: vec![("kills".to_string(), 2.0), ("deaths".to_string(), 4.0)],
        }],
        coach_summary: "Blue controlled the early game but lost Baron.".to_string(),
        teams: vec![
            TeamMeta {
                team_id: "100".to_string(),
                name: "Blue".to_string(),
                side: Some("blue".to_string()),
            },
            TeamMeta {
                team_id: "200".to_string(),
                name: "Red".to_string(),
                side: Some("red".to_string()),
            },
        ],
        fetched_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Scoring response that echoes the merged state back, like the real scorer.
pub fn scored(win_probability: f64, request: &SimulationRequest) -> ScoredState {
    echo(win_probability, &request.to_wire())
}

fn echo(win_probability: f64, request: &SimulateRequest) -> ScoredState {
    ScoredState {
        win_probability,
        attributions: vec![("gold_diff".to_string(), win_probability - 0.5)],
        modified_state: request.current_state.merge(&request.modifications),
        explanation: None,
    }
}

type ReviewReply = Result<MatchReview, FetchError>;
type ScoreReply = Result<ScoredState, SimulationError>;

/// Backend whose answers are released by the test.
///
/// Requests with nothing scripted answer immediately: reviews with
/// [`sample_review`], simulations with an echo at 0.6.
#[derive(Default)]
pub struct ScriptedBackend {
    reviews: Mutex<HashMap<String, VecDeque<oneshot::Receiver<ReviewReply>>>>,
    scores: Mutex<VecDeque<oneshot::Receiver<ScoreReply>>>,
    live: Mutex<Option<Result<Vec<LiveMatch>, FetchError>>>,
    simulate_calls: Mutex<Vec<SimulateRequest>>,
    review_calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next fetch of `match_id` blocks until the returned sender fires.
    pub fn expect_review(&self, match_id: &str) -> oneshot::Sender<ReviewReply> {
        let (tx, rx) = oneshot::channel();
        self.reviews
            .lock()
            .unwrap()
            .entry(match_id.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// The next simulate call blocks until the returned sender fires.
    pub fn expect_score(&self) -> oneshot::Sender<ScoreReply> {
        let (tx, rx) = oneshot::channel();
        self.scores.lock().unwrap().push_back(rx);
        tx
    }

    pub fn set_live(&self, result: Result<Vec<LiveMatch>, FetchError>) {
        *self.live.lock().unwrap() = Some(result);
    }

    pub fn simulate_calls(&self) -> Vec<SimulateRequest> {
        self.simulate_calls.lock().unwrap().clone()
    }

    pub fn review_calls(&self) -> Vec<String> {
        self.review_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_review(&self, match_id: &str) -> Result<MatchReview, FetchError> {
        self.review_calls.lock().unwrap().push(match_id.to_string());
        let scripted = self
            .reviews
            .lock()
            .unwrap()
            .get_mut(match_id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ConnectionError::transport("script dropped").into())),
            None => Ok(sample_review(match_id)),
        }
    }

    async fn list_live_matches(&self, _game: GameKind) -> Result<Vec<LiveMatch>, FetchError> {
        self.live.lock().unwrap().clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn simulate(&self, request: &SimulateRequest) -> Result<ScoredState, SimulationError> {
        self.simulate_calls.lock().unwrap().push(request.clone());
        let scripted = self.scores.lock().unwrap().pop_front();
        match scripted {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(SimulationError::Scoring(ConnectionError::transport(
                    "script dropped",
                )))
            }),
            None => Ok(echo(0.6, request)),
        }
    }
}
