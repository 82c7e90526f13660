//! Clocked cursor over a match's snapshot sequence.
//!
//! `Idle` shows the final snapshot (post-game view). `Playing` advances the
//! cursor one snapshot per tick. `Finished` pins the cursor at the last
//! snapshot and renders like `Idle`, but keeps the "was live" provenance.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing { cursor: usize },
    Finished { cursor: usize },
}

/// Identifies one playback pass. Ticks carrying an older epoch are ignored,
/// so a timer armed for a superseded pass can never move the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEpoch(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced { cursor: usize },
    /// The cursor reached the last snapshot; the tick source must be cancelled.
    Finished { cursor: usize },
    Ignored,
}

#[derive(Debug, Clone)]
pub struct TimelinePlayer {
    state: PlaybackState,
    snapshot_count: usize,
    epoch: u64,
}

impl Default for TimelinePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelinePlayer {
    pub fn new() -> Self {
        TimelinePlayer {
            state: PlaybackState::Idle,
            snapshot_count: 0,
            epoch: 0,
        }
    }

    /// Begin a playback pass over `snapshot_count` snapshots.
    ///
    /// Returns the epoch the caller must arm its tick source with, or `None`
    /// when already playing or there is nothing to play.
    pub fn start(&mut self, snapshot_count: usize) -> Option<TickEpoch> {
        if matches!(self.state, PlaybackState::Playing { .. }) || snapshot_count == 0 {
            return None;
        }
        self.epoch += 1;
        self.snapshot_count = snapshot_count;
        self.state = PlaybackState::Playing { cursor: 0 };
        debug!("Playback started over {} snapshots", snapshot_count);
        Some(TickEpoch(self.epoch))
    }

    pub fn tick(&mut self, epoch: TickEpoch) -> TickOutcome {
        let PlaybackState::Playing { cursor } = self.state else {
            return TickOutcome::Ignored;
        };
        if epoch.0 != self.epoch {
            return TickOutcome::Ignored;
        }

        if cursor + 1 < self.snapshot_count {
            let next = cursor + 1;
            if next + 1 == self.snapshot_count {
                self.state = PlaybackState::Finished { cursor: next };
                return TickOutcome::Finished { cursor: next };
            }
            self.state = PlaybackState::Playing { cursor: next };
            TickOutcome::Advanced { cursor: next }
        } else {
            self.state = PlaybackState::Finished { cursor };
            TickOutcome::Finished { cursor }
        }
    }

    /// Return to the post-game view. Returns `true` if playback was live.
    pub fn stop(&mut self) -> bool {
        let was_live = self.is_live();
        self.epoch += 1;
        self.state = PlaybackState::Idle;
        was_live
    }

    /// Stop and forget the snapshot count of the previous review.
    pub fn reset(&mut self) {
        self.stop();
        self.snapshot_count = 0;
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Index of the displayed snapshot, or `None` for "final snapshot".
    pub fn cursor(&self) -> Option<usize> {
        match self.state {
            PlaybackState::Idle => None,
            PlaybackState::Playing { cursor } | PlaybackState::Finished { cursor } => Some(cursor),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    /// Playing or Finished: the view is anchored on the cursor.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, PlaybackState::Idle)
    }

    pub fn current_epoch(&self) -> Option<TickEpoch> {
        self.is_playing().then_some(TickEpoch(self.epoch))
    }
}
