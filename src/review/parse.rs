//! Validated parse boundary for backend payloads.
//!
//! Snapshots are strict: a snapshot with a missing or non-numeric core field,
//! or a timeline whose timestamps are not strictly ascending, rejects the whole
//! review. Insight, stat and team entries are best-effort: malformed entries
//! are skipped with a warning so one bad annotation cannot blank the view.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::warn;

use super::insights::{derive_gold_swings, GOLD_SWING_THRESHOLD};
use super::models::{
    Attributions, GameKind, GameState, Insight, LiveMatch, MatchReview, PlayerFrame, PlayerStat,
    PositionFrame, ScoredState, TeamMeta, TimelineSnapshot,
};
use crate::error::ParseError;

/// Parse `GET /match/{id}/review`.
pub fn parse_review(raw: &Value, requested_id: &str) -> Result<MatchReview, ParseError> {
    let obj = object(raw, "review")?;

    let match_id = match obj.get("match_id").and_then(text) {
        Some(id) if id != requested_id => {
            return Err(ParseError::InvalidValue {
                context: "review".into(),
                field: "match_id",
                detail: format!("expected '{}', got '{}'", requested_id, id),
            })
        }
        _ => requested_id.to_string(),
    };

    let game = match obj.get("game").and_then(Value::as_str) {
        Some(g) => g.parse::<GameKind>().map_err(|detail| ParseError::InvalidValue {
            context: "review".into(),
            field: "game",
            detail,
        })?,
        None => GameKind::Lol,
    };

    let timeline = match first_present(obj, &["timeline", "snapshots"]) {
        Some((field, v)) => {
            let items = v.as_array().ok_or_else(|| ParseError::InvalidValue {
                context: "review".into(),
                field,
                detail: "expected an array".into(),
            })?;
            parse_timeline(items)?
        }
        None => Vec::new(),
    };

    // Older backends omit macro insights entirely; fall back to local gold-swing detection.
    let macro_insights = match obj.get("macro_insights") {
        Some(v) => parse_insights(v, "macro_insights"),
        None => derive_gold_swings(&timeline, GOLD_SWING_THRESHOLD),
    };
    let micro_insights = obj
        .get("micro_insights")
        .map(|v| parse_insights(v, "micro_insights"))
        .unwrap_or_default();

    let player_stats = obj
        .get("player_stats")
        .map(parse_player_stats)
        .unwrap_or_default();
    let teams = obj.get("teams").map(parse_teams).unwrap_or_default();

    let coach_summary = first_present(obj, &["ai_coach_summary", "coach_summary"])
        .and_then(|(_, v)| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(MatchReview {
        match_id,
        game,
        timeline,
        macro_insights,
        micro_insights,
        player_stats,
        coach_summary,
        teams,
        fetched_at: Utc::now(),
    })
}

/// Parse `GET /matches/live`. Entries without an id are dropped.
pub fn parse_live_matches(raw: &Value) -> Result<Vec<LiveMatch>, ParseError> {
    let items = match raw.as_array() {
        Some(a) => a,
        None => match raw.get("matches").and_then(Value::as_array) {
            Some(a) => a,
            None => {
                return Err(ParseError::InvalidValue {
                    context: "live matches".into(),
                    field: "matches",
                    detail: "expected an array".into(),
                })
            }
        },
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(text)?;
            let title = item
                .get("title")
                .or_else(|| item.get("name"))
                .and_then(Value::as_str)
                .unwrap_or(&id)
                .to_string();
            let tournament = item
                .get("tournament")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(LiveMatch {
                id,
                title,
                tournament,
            })
        })
        .collect())
}

/// Parse the response of `POST /simulate`.
pub fn parse_scored_state(raw: &Value) -> Result<ScoredState, ParseError> {
    let context = "simulate response";
    let obj = object(raw, context)?;

    let win_probability = probability(obj, &["win_probability", "modified_probability"], context)?;

    let attributions = match obj.get("shap_explanations") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => parse_attributions(v, context)?,
    };

    let modified_state = match obj.get("modified_state") {
        None | Some(Value::Null) => GameState::default(),
        Some(v) => parse_game_state(v, "modified_state")?,
    };

    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ScoredState {
        win_probability,
        attributions,
        modified_state,
        explanation,
    })
}

fn parse_timeline(items: &[Value]) -> Result<Vec<TimelineSnapshot>, ParseError> {
    let mut timeline: Vec<TimelineSnapshot> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let snapshot = parse_snapshot(index, item)?;
        if let Some(prev) = timeline.last() {
            if snapshot.timestamp_ms <= prev.timestamp_ms {
                return Err(ParseError::OutOfOrder {
                    index,
                    previous: prev.timestamp_ms,
                    timestamp: snapshot.timestamp_ms,
                });
            }
        }
        timeline.push(snapshot);
    }
    Ok(timeline)
}

fn parse_snapshot(index: usize, raw: &Value) -> Result<TimelineSnapshot, ParseError> {
    let context = format!("timeline[{}]", index);
    let obj = object(raw, &context)?;

    let timestamp_ms = timestamp(obj, &context)?;
    let win_probability = probability(obj, &["win_prob", "win_probability"], &context)?;
    let gold_diff = required_number(obj, "gold_diff", &context)?;
    let xp_diff = required_number(obj, "xp_diff", &context)?;
    let towers_diff = optional_number(obj, "towers_diff", &context)?.unwrap_or(0.0);
    let dragons_diff = optional_number(obj, "dragons_diff", &context)?.unwrap_or(0.0);
    let barons_diff = optional_number(obj, "barons_diff", &context)?.unwrap_or(0.0);
    let team100_kills = optional_number(obj, "team100_kills", &context)?;
    let team200_kills = optional_number(obj, "team200_kills", &context)?;

    let attributions = match first_present(obj, &["shap_explanations", "attributions"]) {
        None | Some((_, Value::Null)) => Vec::new(),
        Some((_, v)) => parse_attributions(v, &context)?,
    };

    let mut players = Vec::new();
    let mut positions = Vec::new();
    if let Some((field, frames)) = first_present(obj, &["players", "participantFrames"]) {
        let frames = frames.as_object().ok_or_else(|| ParseError::InvalidValue {
            context: context.clone(),
            field,
            detail: "expected an object keyed by participant".into(),
        })?;
        for (participant_id, frame) in frames {
            let Some(frame) = frame.as_object() else {
                continue;
            };
            let values = frame
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect();
            if let Some(pos) = frame.get("position").and_then(parse_position) {
                positions.push((participant_id.clone(), pos));
            }
            players.push(PlayerFrame {
                participant_id: participant_id.clone(),
                values,
            });
        }
    }

    Ok(TimelineSnapshot {
        timestamp_ms,
        win_probability,
        gold_diff,
        xp_diff,
        towers_diff,
        dragons_diff,
        barons_diff,
        team100_kills,
        team200_kills,
        players,
        attributions,
        positions: if positions.is_empty() {
            None
        } else {
            Some(positions)
        },
    })
}

fn parse_position(raw: &Value) -> Option<PositionFrame> {
    Some(PositionFrame {
        x: raw.get("x").and_then(number)?,
        y: raw.get("y").and_then(number)?,
    })
}

fn parse_attributions(raw: &Value, context: &str) -> Result<Attributions, ParseError> {
    let map = raw.as_object().ok_or_else(|| ParseError::InvalidValue {
        context: context.to_string(),
        field: "shap_explanations",
        detail: "expected an object of feature → number".into(),
    })?;
    map.iter()
        .map(|(feature, v)| {
            number(v)
                .map(|n| (feature.clone(), n))
                .ok_or_else(|| ParseError::InvalidValue {
                    context: context.to_string(),
                    field: "shap_explanations",
                    detail: format!("feature '{}' is not a number", feature),
                })
        })
        .collect()
}

fn parse_game_state(raw: &Value, context: &str) -> Result<GameState, ParseError> {
    let obj = object(raw, context)?;
    let mut state = GameState::default();
    for field in GameState::FIELDS {
        if let Some(n) = optional_number(obj, field, context)? {
            state.set(field, n);
        }
    }
    Ok(state)
}

fn parse_insights(raw: &Value, kind: &str) -> Vec<Insight> {
    let Some(items) = raw.as_array() else {
        warn!("{} is not an array, ignoring", kind);
        return Vec::new();
    };

    let mut insights: Vec<Insight> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let parsed = parse_insight(item);
            if parsed.is_none() {
                warn!("Skipping malformed {}[{}]", kind, i);
            }
            parsed
        })
        .collect();
    // Stable: insights sharing a timestamp keep backend order.
    insights.sort_by_key(|i| i.timestamp_ms);
    insights
}

fn parse_insight(raw: &Value) -> Option<Insight> {
    let obj = raw.as_object()?;
    let timestamp_ms = timestamp(obj, "insight").ok()?;
    let category = first_present(obj, &["type", "category"])
        .and_then(|(_, v)| v.as_str())?
        .to_string();
    let player_id = obj.get("player_id").and_then(text);
    let description = match obj.get("description").and_then(Value::as_str) {
        Some(d) => d.to_string(),
        None => match &player_id {
            Some(pid) => format!("Player {} - {}", pid, category),
            None => category.clone(),
        },
    };
    let severity = first_present(obj, &["severity", "impact"])
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string);
    let magnitude = obj.get("magnitude").and_then(number);

    Some(Insight {
        timestamp_ms,
        category,
        description,
        severity,
        player_id,
        magnitude,
    })
}

fn parse_player_stats(raw: &Value) -> Vec<PlayerStat> {
    let Some(items) = raw.as_array() else {
        warn!("player_stats is not an array, ignoring");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let player_id = first_present(obj, &["player_id", "id"]).and_then(|(_, v)| text(v));
            let Some(player_id) = player_id else {
                warn!("Skipping player stat without an id");
                return None;
            };
            let stats = obj
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "player_id" | "id" | "team_id"))
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect();
            Some(PlayerStat {
                player_id,
                name: obj.get("name").and_then(Value::as_str).map(str::to_string),
                team_id: obj.get("team_id").and_then(text),
                stats,
            })
        })
        .collect()
}

fn parse_teams(raw: &Value) -> Vec<TeamMeta> {
    let team = |team_id: Option<String>, v: &Value| -> Option<TeamMeta> {
        let team_id = team_id.or_else(|| {
            first_present(v.as_object()?, &["team_id", "id"]).and_then(|(_, v)| text(v))
        })?;
        Some(TeamMeta {
            name: v
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&team_id)
                .to_string(),
            side: v.get("side").and_then(Value::as_str).map(str::to_string),
            team_id,
        })
    };

    match raw {
        Value::Array(items) => items.iter().filter_map(|v| team(None, v)).collect(),
        // { "100": { "name": "C9" }, "200": { ... } }
        Value::Object(map) => map
            .iter()
            .filter_map(|(id, v)| team(Some(id.clone()), v))
            .collect(),
        _ => {
            warn!("teams is neither an array nor an object, ignoring");
            Vec::new()
        }
    }
}

// ── Field helpers ──────────────────────────────────────────────────────────────

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

/// Identifiers may arrive as strings or integers.
fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn object<'a>(raw: &'a Value, context: &str) -> Result<&'a Map<String, Value>, ParseError> {
    raw.as_object().ok_or_else(|| ParseError::NotAnObject {
        context: context.to_string(),
    })
}

fn first_present<'a>(
    obj: &'a Map<String, Value>,
    fields: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    fields
        .iter()
        .find_map(|f| obj.get(*f).map(|v| (*f, v)))
}

fn optional_number(
    obj: &Map<String, Value>,
    field: &'static str,
    context: &str,
) -> Result<Option<f64>, ParseError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v)
            .map(Some)
            .ok_or_else(|| ParseError::InvalidValue {
                context: context.to_string(),
                field,
                detail: format!("expected a number, got {}", v),
            }),
    }
}

fn required_number(
    obj: &Map<String, Value>,
    field: &'static str,
    context: &str,
) -> Result<f64, ParseError> {
    optional_number(obj, field, context)?.ok_or_else(|| ParseError::MissingField {
        context: context.to_string(),
        field,
    })
}

fn timestamp(obj: &Map<String, Value>, context: &str) -> Result<u64, ParseError> {
    let ts = required_number(obj, "timestamp", context)?;
    if ts < 0.0 {
        return Err(ParseError::InvalidValue {
            context: context.to_string(),
            field: "timestamp",
            detail: format!("negative timestamp {}", ts),
        });
    }
    Ok(ts as u64)
}

fn probability(
    obj: &Map<String, Value>,
    aliases: &[&'static str],
    context: &str,
) -> Result<f64, ParseError> {
    let (field, _) = first_present(obj, aliases).ok_or_else(|| ParseError::MissingField {
        context: context.to_string(),
        field: aliases[0],
    })?;
    let p = required_number(obj, field, context)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ParseError::InvalidValue {
            context: context.to_string(),
            field,
            detail: format!("probability {} outside [0, 1]", p),
        });
    }
    Ok(p)
}
