use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered feature-attribution map (feature name → signed contribution),
/// kept in the order the backend sent it.
pub type Attributions = Vec<(String, f64)>;

/// Which title a match was played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Lol,
    Valorant,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Lol => "lol",
            GameKind::Valorant => "valorant",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lol" | "league" | "league_of_legends" => Ok(GameKind::Lol),
            "valorant" | "val" => Ok(GameKind::Valorant),
            other => Err(format!("unknown game kind '{}'", other)),
        }
    }
}

/// Sparse record of team differentials fed to the scoring model.
///
/// A missing field means "inherit from the baseline" when used as a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub towers_diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dragons_diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barons_diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team100_kills: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team200_kills: Option<f64>,
}

impl GameState {
    /// Field names understood by the scoring backend, in model order.
    pub const FIELDS: [&'static str; 8] = [
        "gold_diff",
        "xp_diff",
        "towers_diff",
        "dragons_diff",
        "barons_diff",
        "time_seconds",
        "team100_kills",
        "team200_kills",
    ];

    /// Overlay `patch` on top of `self`: every field present in the patch wins.
    pub fn merge(&self, patch: &GameState) -> GameState {
        GameState {
            gold_diff: patch.gold_diff.or(self.gold_diff),
            xp_diff: patch.xp_diff.or(self.xp_diff),
            towers_diff: patch.towers_diff.or(self.towers_diff),
            dragons_diff: patch.dragons_diff.or(self.dragons_diff),
            barons_diff: patch.barons_diff.or(self.barons_diff),
            time_seconds: patch.time_seconds.or(self.time_seconds),
            team100_kills: patch.team100_kills.or(self.team100_kills),
            team200_kills: patch.team200_kills.or(self.team200_kills),
        }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        match field {
            "gold_diff" => self.gold_diff,
            "xp_diff" => self.xp_diff,
            "towers_diff" => self.towers_diff,
            "dragons_diff" => self.dragons_diff,
            "barons_diff" => self.barons_diff,
            "time_seconds" => self.time_seconds,
            "team100_kills" => self.team100_kills,
            "team200_kills" => self.team200_kills,
            _ => None,
        }
    }

    /// Returns `false` for names outside [`GameState::FIELDS`].
    pub fn set(&mut self, field: &str, value: f64) -> bool {
        let slot = match field {
            "gold_diff" => &mut self.gold_diff,
            "xp_diff" => &mut self.xp_diff,
            "towers_diff" => &mut self.towers_diff,
            "dragons_diff" => &mut self.dragons_diff,
            "barons_diff" => &mut self.barons_diff,
            "time_seconds" => &mut self.time_seconds,
            "team100_kills" => &mut self.team100_kills,
            "team200_kills" => &mut self.team200_kills,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn is_empty(&self) -> bool {
        Self::FIELDS.iter().all(|f| self.get(f).is_none())
    }
}

/// Per-participant stat subset carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerFrame {
    pub participant_id: String,
    /// Numeric stats in backend order (e.g. `totalGold`, `xp`, `credits`).
    pub values: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFrame {
    pub x: f64,
    pub y: f64,
}

/// One point on the match timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSnapshot {
    pub timestamp_ms: u64,
    /// Blue side (team 100) win probability, 0.0–1.0.
    pub win_probability: f64,
    pub gold_diff: f64,
    pub xp_diff: f64,
    pub towers_diff: f64,
    pub dragons_diff: f64,
    pub barons_diff: f64,
    pub team100_kills: Option<f64>,
    pub team200_kills: Option<f64>,
    pub players: Vec<PlayerFrame>,
    pub attributions: Attributions,
    /// participant id → map position, when the feed carried positional frames
    pub positions: Option<Vec<(String, PositionFrame)>>,
}

impl TimelineSnapshot {
    /// The scoring-model view of this snapshot.
    pub fn game_state(&self) -> GameState {
        GameState {
            gold_diff: Some(self.gold_diff),
            xp_diff: Some(self.xp_diff),
            towers_diff: Some(self.towers_diff),
            dragons_diff: Some(self.dragons_diff),
            barons_diff: Some(self.barons_diff),
            time_seconds: Some(self.timestamp_ms as f64 / 1000.0),
            team100_kills: self.team100_kills,
            team200_kills: self.team200_kills,
        }
    }
}

/// A macro (team-level) or micro (player-level) review finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub timestamp_ms: u64,
    /// e.g. "Gold Swing", "Isolated Death"
    pub category: String,
    pub description: String,
    /// Severity / impact tag, e.g. "High", "Critical"
    pub severity: Option<String>,
    pub player_id: Option<String>,
    pub magnitude: Option<f64>,
}

/// End-of-match stat line for one player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStat {
    pub player_id: String,
    pub name: Option<String>,
    pub team_id: Option<String>,
    pub stats: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMeta {
    pub team_id: String,
    pub name: String,
    pub side: Option<String>,
}

/// Immutable review of one match as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReview {
    pub match_id: String,
    pub game: GameKind,
    /// Chronological, strictly ascending timestamps.
    pub timeline: Vec<TimelineSnapshot>,
    pub macro_insights: Vec<Insight>,
    pub micro_insights: Vec<Insight>,
    pub player_stats: Vec<PlayerStat>,
    pub coach_summary: String,
    pub teams: Vec<TeamMeta>,
    pub fetched_at: DateTime<Utc>,
}

impl MatchReview {
    pub fn final_snapshot(&self) -> Option<&TimelineSnapshot> {
        self.timeline.last()
    }

    pub fn snapshot(&self, index: usize) -> Option<&TimelineSnapshot> {
        self.timeline.get(index)
    }
}

/// Entry of the live match listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMatch {
    pub id: String,
    pub title: String,
    pub tournament: Option<String>,
}

/// Body of `POST /simulate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulateRequest {
    pub current_state: GameState,
    pub modifications: GameState,
}

/// Validated response of `POST /simulate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredState {
    pub win_probability: f64,
    pub attributions: Attributions,
    pub modified_state: GameState,
    pub explanation: Option<String>,
}
