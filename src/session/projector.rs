//! Pure projection of store, player and simulation into the render state.
//!
//! Precedence for the "current" numbers: an applied simulation result, then
//! the playback cursor, then the review's final snapshot. The projector keeps
//! no memory between calls; equal inputs give equal output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use super::player::{PlaybackState, TimelinePlayer};
use super::simulation::SimulationSession;
use crate::review::models::{
    Attributions, GameKind, GameState, Insight, MatchReview, PlayerStat, TeamMeta,
};
use crate::review::{visible_insights, MatchStore, StoreStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Empty,
    Loading,
    Error,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    PostGame,
    Live,
    Simulated,
}

/// Which source supplied [`CurrentView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Simulation,
    Cursor,
    FinalSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackView {
    #[serde(flatten)]
    pub state: PlaybackState,
    pub snapshot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentView {
    pub timestamp_ms: u64,
    pub win_probability: f64,
    pub game_state: GameState,
    pub source: StateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp_ms: u64,
    pub win_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationView {
    pub pending: bool,
    pub steps: usize,
    pub explanation: Option<String>,
    /// Simulated win probability minus the probability at the chain anchor.
    pub delta: Option<f64>,
    pub anchor_timestamp_ms: Option<u64>,
    pub error: Option<String>,
}

/// Everything the presentation layer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderState {
    pub status: ViewStatus,
    pub match_id: Option<String>,
    pub game: Option<GameKind>,
    pub mode: ViewMode,
    pub playback: PlaybackView,
    pub current: Option<CurrentView>,
    pub chart: Vec<ChartPoint>,
    pub attributions: Vec<Attribution>,
    pub macro_insights: Vec<Insight>,
    pub micro_insights: Vec<Insight>,
    pub player_stats: Vec<PlayerStat>,
    pub teams: Vec<TeamMeta>,
    pub coach_summary: Option<String>,
    pub simulation: SimulationView,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub fn project(
    store: &MatchStore,
    player: &TimelinePlayer,
    simulation: &SimulationSession,
) -> RenderState {
    let (status, error) = match store.status() {
        StoreStatus::Empty => (ViewStatus::Empty, None),
        StoreStatus::Loading => (ViewStatus::Loading, None),
        StoreStatus::Ready => (ViewStatus::Ready, None),
        StoreStatus::Failed(e) => (ViewStatus::Error, Some(e.to_string())),
    };

    let simulation_view = SimulationView {
        pending: simulation.is_pending(),
        steps: simulation.steps().len(),
        explanation: simulation.current().and_then(|r| r.explanation.clone()),
        delta: simulation
            .current()
            .zip(simulation.anchor())
            .map(|(r, a)| r.win_probability - a.win_probability),
        anchor_timestamp_ms: simulation.anchor().map(|a| a.timestamp_ms),
        error: simulation.last_error().map(|e| e.to_string()),
    };

    let playback = PlaybackView {
        state: player.state(),
        snapshot_count: store.review().map_or(0, |r| r.timeline.len()),
    };

    let mut view = RenderState {
        status,
        match_id: store.active_id().map(str::to_string),
        game: None,
        mode: ViewMode::PostGame,
        playback,
        current: None,
        chart: Vec::new(),
        attributions: Vec::new(),
        macro_insights: Vec::new(),
        micro_insights: Vec::new(),
        player_stats: Vec::new(),
        teams: Vec::new(),
        coach_summary: None,
        simulation: simulation_view,
        error,
        fetched_at: None,
    };

    let Some(review) = store.review() else {
        return view;
    };
    view.game = Some(review.game);
    view.player_stats = review.player_stats.clone();
    view.teams = review.teams.clone();
    view.coach_summary = Some(review.coach_summary.clone());
    view.fetched_at = Some(review.fetched_at);

    let Some((current, attributions, mode)) = resolve_current(review, player, simulation) else {
        return view;
    };

    let cutoff = current.timestamp_ms;
    view.chart = review
        .timeline
        .iter()
        .take_while(|s| s.timestamp_ms <= cutoff)
        .map(|s| ChartPoint {
            timestamp_ms: s.timestamp_ms,
            win_probability: s.win_probability,
        })
        .collect();
    view.attributions = rank_attributions(attributions);
    view.macro_insights = visible_insights(&review.macro_insights, cutoff);
    view.micro_insights = visible_insights(&review.micro_insights, cutoff);
    view.mode = mode;
    view.current = Some(current);
    view
}

fn resolve_current<'a>(
    review: &'a MatchReview,
    player: &TimelinePlayer,
    simulation: &'a SimulationSession,
) -> Option<(CurrentView, &'a Attributions, ViewMode)> {
    if let (Some(result), Some(anchor)) = (simulation.current(), simulation.anchor()) {
        let current = CurrentView {
            timestamp_ms: anchor.timestamp_ms,
            win_probability: result.win_probability,
            game_state: result.state.clone(),
            source: StateSource::Simulation,
        };
        return Some((current, &result.attributions, ViewMode::Simulated));
    }

    if let Some(snapshot) = player.cursor().and_then(|c| review.snapshot(c)) {
        let current = CurrentView {
            timestamp_ms: snapshot.timestamp_ms,
            win_probability: snapshot.win_probability,
            game_state: snapshot.game_state(),
            source: StateSource::Cursor,
        };
        return Some((current, &snapshot.attributions, ViewMode::Live));
    }

    let last = review.final_snapshot()?;
    let current = CurrentView {
        timestamp_ms: last.timestamp_ms,
        win_probability: last.win_probability,
        game_state: last.game_state(),
        source: StateSource::FinalSnapshot,
    };
    Some((current, &last.attributions, ViewMode::PostGame))
}

/// Descending absolute magnitude; the stable sort keeps backend order on ties.
pub fn rank_attributions(attributions: &Attributions) -> Vec<Attribution> {
    let mut ranked: Vec<Attribution> = attributions
        .iter()
        .map(|(feature, value)| Attribution {
            feature: feature.clone(),
            value: *value,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.value
            .abs()
            .partial_cmp(&a.value.abs())
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sample_review, scored};
    use crate::error::{ConnectionError, FetchError, SimulationError};
    use crate::session::simulation::LiveBaseline;

    fn loaded_store(id: &str) -> MatchStore {
        let mut store = MatchStore::new();
        let ticket = store.begin_load(id);
        store.resolve(&ticket, Ok(sample_review(id))).unwrap();
        store
    }

    fn live_at_final(store: &MatchStore) -> LiveBaseline {
        let last = store.review().unwrap().final_snapshot().unwrap();
        LiveBaseline {
            state: last.game_state(),
            timestamp_ms: last.timestamp_ms,
            win_probability: last.win_probability,
        }
    }

    #[test]
    fn empty_store_projects_empty_view() {
        let view = project(
            &MatchStore::new(),
            &TimelinePlayer::new(),
            &SimulationSession::new(),
        );
        assert_eq!(view.status, ViewStatus::Empty);
        assert!(view.current.is_none());
        assert!(view.chart.is_empty());
    }

    #[test]
    fn idle_view_shows_final_snapshot_and_everything() {
        let store = loaded_store("A");
        let view = project(&store, &TimelinePlayer::new(), &SimulationSession::new());
        let review = store.review().unwrap();

        assert_eq!(view.status, ViewStatus::Ready);
        assert_eq!(view.mode, ViewMode::PostGame);
        let current = view.current.as_ref().unwrap();
        assert_eq!(current.source, StateSource::FinalSnapshot);
        assert_eq!(current.timestamp_ms, 1_200_000);
        assert_eq!(view.chart.len(), review.timeline.len());
        assert_eq!(view.macro_insights.len(), review.macro_insights.len());
        assert_eq!(view.micro_insights.len(), review.micro_insights.len());
    }

    #[test]
    fn cursor_truncates_chart_and_insights() {
        let store = loaded_store("A");
        let mut player = TimelinePlayer::new();
        let epoch = player.start(5).unwrap();
        player.tick(epoch);

        let view = project(&store, &player, &SimulationSession::new());
        assert_eq!(view.mode, ViewMode::Live);
        assert_eq!(view.current.as_ref().unwrap().source, StateSource::Cursor);
        assert_eq!(view.chart.len(), 2);
        assert!(view
            .macro_insights
            .iter()
            .all(|i| i.timestamp_ms <= 300_000));
    }

    #[test]
    fn visible_insights_grow_with_cursor() {
        let store = loaded_store("A");
        let mut player = TimelinePlayer::new();
        let epoch = player.start(5).unwrap();
        let session = SimulationSession::new();

        let mut previous = project(&store, &player, &session);
        for _ in 0..4 {
            player.tick(epoch);
            let next = project(&store, &player, &session);
            assert!(previous
                .macro_insights
                .iter()
                .all(|i| next.macro_insights.contains(i)));
            assert!(previous
                .micro_insights
                .iter()
                .all(|i| next.micro_insights.contains(i)));
            previous = next;
        }
    }

    #[test]
    fn simulation_overrides_cursor_and_final_snapshot() {
        let store = loaded_store("A");
        let mut session = SimulationSession::new();
        let req = session
            .begin(
                GameState {
                    dragons_diff: Some(3.0),
                    ..Default::default()
                },
                live_at_final(&store),
            )
            .unwrap();
        session.resolve(req.ticket, Ok(scored(0.62, &req))).unwrap();

        let view = project(&store, &TimelinePlayer::new(), &session);
        let current = view.current.as_ref().unwrap();
        assert_eq!(view.mode, ViewMode::Simulated);
        assert_eq!(current.source, StateSource::Simulation);
        assert_eq!(current.game_state.dragons_diff, Some(3.0));
        assert_eq!(view.simulation.steps, 1);
        let delta = view.simulation.delta.unwrap();
        approx::assert_relative_eq!(delta, 0.62 - 0.35, epsilon = 1e-9);
    }

    #[test]
    fn simulation_error_is_local_to_panel() {
        let store = loaded_store("A");
        let mut session = SimulationSession::new();
        let req = session
            .begin(GameState::default(), live_at_final(&store))
            .unwrap();
        session
            .resolve(
                req.ticket,
                Err(SimulationError::Scoring(ConnectionError::status(502, "Bad Gateway"))),
            )
            .unwrap();

        let view = project(&store, &TimelinePlayer::new(), &session);
        assert_eq!(view.status, ViewStatus::Ready);
        assert!(view.error.is_none());
        assert!(view.simulation.error.as_ref().unwrap().contains("502"));
        assert_eq!(view.mode, ViewMode::PostGame);
    }

    #[test]
    fn fetch_failure_projects_error_view() {
        let mut store = MatchStore::new();
        let ticket = store.begin_load("A");
        store
            .resolve(
                &ticket,
                Err(FetchError::from(ConnectionError::status(500, "Internal Server Error"))),
            )
            .unwrap();

        let view = project(&store, &TimelinePlayer::new(), &SimulationSession::new());
        assert_eq!(view.status, ViewStatus::Error);
        assert!(view.error.unwrap().contains("500"));
        assert!(view.current.is_none());
    }

    #[test]
    fn projection_is_idempotent() {
        let store = loaded_store("A");
        let mut player = TimelinePlayer::new();
        let session = SimulationSession::new();

        assert_eq!(
            project(&store, &player, &session),
            project(&store, &player, &session)
        );

        let epoch = player.start(5).unwrap();
        player.tick(epoch);
        player.tick(epoch);
        assert_eq!(
            project(&store, &player, &session),
            project(&store, &player, &session)
        );
    }

    #[test]
    fn attributions_rank_by_magnitude_with_stable_ties() {
        let raw: Attributions = vec![
            ("xp_diff".into(), 0.1),
            ("gold_diff".into(), -0.4),
            ("towers_diff".into(), 0.2),
            ("dragons_diff".into(), -0.2),
            ("barons_diff".into(), 0.0),
        ];
        let ranked: Vec<String> = rank_attributions(&raw)
            .into_iter()
            .map(|a| a.feature)
            .collect();
        assert_eq!(
            ranked,
            vec!["gold_diff", "towers_diff", "dragons_diff", "xp_diff", "barons_diff"]
        );
    }

    #[test]
    fn render_state_serializes_for_the_api() {
        let store = loaded_store("A");
        let view = project(&store, &TimelinePlayer::new(), &SimulationSession::new());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["mode"], "post_game");
        assert_eq!(json["playback"]["state"], "idle");
        assert_eq!(json["playback"]["snapshot_count"], 5);
        assert_eq!(json["game"], "lol");
    }
}
