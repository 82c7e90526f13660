//! Time-gated insight visibility.
//!
//! Insights are stored timestamp-ascending, so the visible subset for a given
//! cutoff is always a prefix. Advancing the cutoff can only grow that prefix,
//! which gives the monotonic reveal the live replay relies on.

use super::models::{Insight, TimelineSnapshot};

/// Gold-differential change between consecutive snapshots that counts as a
/// strategic inflection.
pub const GOLD_SWING_THRESHOLD: f64 = 800.0;

/// Insights whose timestamp is at or before `cutoff_ms`, in ascending order.
pub fn visible_insights(all: &[Insight], cutoff_ms: u64) -> Vec<Insight> {
    debug_assert!(
        all.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms),
        "insights must be sorted by timestamp"
    );
    let end = all.partition_point(|i| i.timestamp_ms <= cutoff_ms);
    all[..end].to_vec()
}

/// Derive macro insights from large snapshot-to-snapshot gold swings.
///
/// Used when a review arrives without backend-computed macro insights.
pub fn derive_gold_swings(timeline: &[TimelineSnapshot], threshold: f64) -> Vec<Insight> {
    timeline
        .windows(2)
        .filter_map(|pair| {
            let delta = pair[1].gold_diff - pair[0].gold_diff;
            if delta.abs() <= threshold {
                return None;
            }
            let direction = if delta > 0.0 {
                "Team 100 Advantage"
            } else {
                "Team 200 Advantage"
            };
            Some(Insight {
                timestamp_ms: pair[1].timestamp_ms,
                category: "Gold Swing".to_string(),
                description: format!(
                    "Significant gold swing of {:.0} towards {}",
                    delta.abs(),
                    direction
                ),
                severity: None,
                player_id: None,
                magnitude: Some(delta),
            })
        })
        .collect()
}
