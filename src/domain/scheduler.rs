//! Client-side step scheduler.
//!
//! Polls the derivation formula against the offset-corrected clock and
//! reports each step transition exactly once. Deliberately polling-based:
//! the step is always recomputed from the absolute `(start_time,
//! start_step)` anchor in the last authoritative transport state, never
//! from accumulated per-tick deltas, so scheduling jitter cannot drift
//! the playhead.

use super::transport::TransportState;

/// Suggested poll interval; short relative to the ~100 ms minimum step
/// duration at top tempo.
pub const POLL_INTERVAL_MS: u64 = 16;

/// Edge-detecting poll loop over the shared step derivation.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    transport: TransportState,
    total_steps: u32,
    subdivisions_per_beat: u32,
    last_observed: Option<u32>,
}

impl StepScheduler {
    pub fn new(transport: TransportState, total_steps: u32, subdivisions_per_beat: u32) -> Self {
        Self {
            transport,
            total_steps,
            subdivisions_per_beat,
            last_observed: None,
        }
    }

    /// Replace the transport reference with a fresh authoritative
    /// `transport:state`. The observed step survives so an unchanged
    /// position does not re-fire.
    pub fn sync_transport(&mut self, transport: TransportState) {
        self.transport = transport;
    }

    /// The transport reference currently scheduled against.
    pub fn transport(&self) -> &TransportState {
        &self.transport
    }

    /// One poll tick. `server_now_ms` is the offset-corrected clock.
    ///
    /// Returns `Some(step)` exactly once per distinct derived step value;
    /// repeated ticks landing on the same step return `None`. Steps
    /// skipped during a scheduling stall are dropped, not replayed: only
    /// the latest computed step fires.
    pub fn poll(&mut self, server_now_ms: i64) -> Option<u32> {
        let step = self
            .transport
            .current_step(server_now_ms, self.total_steps, self.subdivisions_per_beat);
        if self.last_observed == Some(step) {
            return None;
        }
        self.last_observed = Some(step);
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: u32 = 16;
    const SUBDIV: u32 = 4;

    fn playing_at(bpm: u16, anchor: i64) -> TransportState {
        let mut t = TransportState::stopped(bpm);
        t.start(anchor);
        t
    }

    #[test]
    fn first_poll_fires_current_step() {
        let mut s = StepScheduler::new(playing_at(100, 0), STEPS, SUBDIV);
        assert_eq!(s.poll(0), Some(0));
    }

    #[test]
    fn same_step_fires_only_once_across_ticks() {
        // 150ms per step at 100 bpm, polled every 16ms.
        let mut s = StepScheduler::new(playing_at(100, 0), STEPS, SUBDIV);
        assert_eq!(s.poll(0), Some(0));
        for now in (16..150).step_by(16) {
            assert_eq!(s.poll(now), None);
        }
        assert_eq!(s.poll(150), Some(1));
        assert_eq!(s.poll(160), None);
    }

    #[test]
    fn stall_drops_skipped_steps() {
        let mut s = StepScheduler::new(playing_at(100, 0), STEPS, SUBDIV);
        assert_eq!(s.poll(0), Some(0));
        // 600ms stall jumps straight to step 4; 1..3 never fire.
        assert_eq!(s.poll(620), Some(4));
        assert_eq!(s.poll(636), None);
    }

    #[test]
    fn stopped_transport_fires_position_once() {
        let mut t = TransportState::stopped(100);
        t.start_step = 3;
        let mut s = StepScheduler::new(t, STEPS, SUBDIV);
        assert_eq!(s.poll(1_000), Some(3));
        assert_eq!(s.poll(2_000), None);
    }

    #[test]
    fn sync_with_unchanged_position_does_not_refire() {
        let mut s = StepScheduler::new(playing_at(100, 0), STEPS, SUBDIV);
        assert_eq!(s.poll(80), Some(0));

        // Server rebroadcasts an equivalent transport (e.g. after arm).
        s.sync_transport(playing_at(100, 0));
        assert_eq!(s.poll(90), None);
    }

    #[test]
    fn late_joiner_matches_existing_member() {
        // Two schedulers fed the same transport:state derive the same step
        // within one polling interval.
        let transport = playing_at(100, 10_000);
        let mut veteran = StepScheduler::new(transport, STEPS, SUBDIV);
        veteran.poll(10_000);
        veteran.poll(11_000);

        let mut joiner = StepScheduler::new(transport, STEPS, SUBDIV);
        let now = 11_237;
        let expected = transport.current_step(now, STEPS, SUBDIV);
        assert_eq!(joiner.poll(now), Some(expected));
        // Veteran lands on the same value (already fired it or fires now).
        match veteran.poll(now) {
            Some(step) => assert_eq!(step, expected),
            None => assert_eq!(
                transport.current_step(now - POLL_INTERVAL_MS as i64, STEPS, SUBDIV),
                expected
            ),
        }
    }

    #[test]
    fn rewind_sync_fires_step_zero() {
        let mut s = StepScheduler::new(playing_at(100, 0), STEPS, SUBDIV);
        assert_eq!(s.poll(500), Some(3));

        let mut stopped = TransportState::stopped(100);
        stopped.rewind();
        s.sync_transport(stopped);
        assert_eq!(s.poll(510), Some(0));
    }
}
