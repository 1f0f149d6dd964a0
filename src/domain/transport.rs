//! Transport state: the play/pause/tempo/position state describing playback.
//!
//! The step derivation formula in [`TransportState::current_step`] is the
//! single implementation shared by the server (for its own mutation
//! decisions) and the client-side [`StepScheduler`](crate::domain::StepScheduler).
//! Any divergence in rounding mode between participants causes audible
//! drift, so nothing else in the crate may reimplement it.

use serde::{Deserialize, Serialize};

/// Play/pause/tempo/position state for one room.
///
/// Invariants, upheld by the mutating methods:
/// - `playing == true` exactly when `start_time.is_some()`
/// - `start_step` is always in `[0, total_steps)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    /// Whether the playhead is advancing.
    pub playing: bool,

    /// Beats per minute.
    pub bpm: u16,

    /// Server clock anchor in epoch milliseconds; `Some` iff playing.
    pub start_time: Option<i64>,

    /// Step the playhead was at when `start_time` was anchored.
    pub start_step: u32,
}

impl TransportState {
    /// A stopped transport at step 0 with the given tempo.
    pub fn stopped(bpm: u16) -> Self {
        Self {
            playing: false,
            bpm,
            start_time: None,
            start_step: 0,
        }
    }

    /// Duration of one grid step in milliseconds.
    pub fn step_duration_ms(bpm: u16, subdivisions_per_beat: u32) -> f64 {
        60_000.0 / f64::from(bpm) / f64::from(subdivisions_per_beat)
    }

    /// Derive the current step from the absolute `(start_time, start_step)`
    /// anchor. Never accumulates per-tick deltas.
    ///
    /// `now_ms` is server time (clients pass their offset-corrected clock).
    /// Negative elapsed time from residual clock error is handled by
    /// [`norm_mod`], so the result is always in `[0, total_steps)`.
    pub fn current_step(&self, now_ms: i64, total_steps: u32, subdivisions_per_beat: u32) -> u32 {
        let start_time = match (self.playing, self.start_time) {
            (true, Some(t)) => t,
            _ => return self.start_step,
        };

        let elapsed = (now_ms - start_time) as f64;
        let advanced = (elapsed / Self::step_duration_ms(self.bpm, subdivisions_per_beat)).floor();
        norm_mod(i64::from(self.start_step) + advanced as i64, i64::from(total_steps)) as u32
    }

    /// Stopped → Playing. Resumes from the last position: `start_step` is
    /// left untouched. No-op while already playing.
    pub fn start(&mut self, now_ms: i64) {
        if !self.playing {
            self.playing = true;
            self.start_time = Some(now_ms);
        }
    }

    /// Playing → Stopped. Snapshots the currently-derived step into
    /// `start_step` so a later `start` resumes exactly there.
    pub fn pause(&mut self, now_ms: i64, total_steps: u32, subdivisions_per_beat: u32) {
        if self.playing {
            self.start_step = self.current_step(now_ms, total_steps, subdivisions_per_beat);
            self.playing = false;
            self.start_time = None;
        }
    }

    /// → Stopped at step 0. Idempotent.
    pub fn rewind(&mut self) {
        self.playing = false;
        self.start_time = None;
        self.start_step = 0;
    }

    /// Change tempo, re-anchoring first so the derivation formula continues
    /// seamlessly: while playing, the derived step is snapshotted into
    /// `start_step` and `start_time` reset to now *before* the new bpm
    /// takes effect. The playhead does not jump.
    pub fn set_bpm(&mut self, bpm: u16, now_ms: i64, total_steps: u32, subdivisions_per_beat: u32) {
        if self.playing {
            self.start_step = self.current_step(now_ms, total_steps, subdivisions_per_beat);
            self.start_time = Some(now_ms);
        }
        self.bpm = bpm;
    }

    /// Check the `playing ⇔ start_time` invariant (test support).
    pub fn invariant_holds(&self) -> bool {
        self.playing == self.start_time.is_some()
    }
}

/// Euclidean-style modulo: result is in `[0, n)` even for negative `x`.
pub fn norm_mod(x: i64, n: i64) -> i64 {
    ((x % n) + n) % n
}
