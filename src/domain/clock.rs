//! Client-side clock offset estimation.
//!
//! Produces `offset` such that `server_time ≈ client_time + offset` from a
//! short round-trip handshake: each round assumes symmetric network delay
//! and takes the midpoint, the final offset is the median of all rounds so
//! a single delayed round cannot skew the result.

/// Rounds per handshake.
pub const HANDSHAKE_ROUNDS: usize = 5;

/// Spacing between handshake rounds in milliseconds.
pub const ROUND_SPACING_MS: u64 = 50;

/// One completed handshake round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockOffsetSample {
    /// Client clock when the request was sent (epoch ms).
    pub client_time: i64,
    /// Server clock when it answered (epoch ms).
    pub server_time: i64,
    /// Full request/response round trip (ms).
    pub round_trip: i64,
}

impl ClockOffsetSample {
    /// Offset under the symmetric-delay midpoint assumption.
    pub fn offset(&self) -> i64 {
        self.server_time - self.client_time - self.round_trip / 2
    }
}

/// Median-of-rounds clock offset estimator.
///
/// Holds the last committed offset (0 before any handshake succeeds) and
/// the samples of an in-flight handshake. A handshake only replaces the
/// committed offset once all [`HANDSHAKE_ROUNDS`] rounds complete;
/// [`abort_handshake`](Self::abort_handshake) discards partial samples,
/// keeping the previous offset for use until the next reconnect.
#[derive(Debug, Clone, Default)]
pub struct OffsetEstimator {
    committed: i64,
    pending: Vec<ClockOffsetSample>,
}

impl OffsetEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current best estimate: `server_time - client_time`.
    pub fn offset(&self) -> i64 {
        self.committed
    }

    /// Translate a local clock reading into estimated server time.
    pub fn to_server_time(&self, client_now_ms: i64) -> i64 {
        client_now_ms + self.committed
    }

    /// Record one completed round. Commits the median once enough rounds
    /// have arrived and returns the new offset; otherwise returns `None`.
    pub fn add_sample(&mut self, sample: ClockOffsetSample) -> Option<i64> {
        self.pending.push(sample);
        if self.pending.len() < HANDSHAKE_ROUNDS {
            return None;
        }

        let mut offsets: Vec<i64> = self.pending.iter().map(ClockOffsetSample::offset).collect();
        offsets.sort_unstable();
        self.committed = offsets[offsets.len() / 2];
        self.pending.clear();
        Some(self.committed)
    }

    /// Rounds still outstanding in the current handshake.
    pub fn rounds_remaining(&self) -> usize {
        HANDSHAKE_ROUNDS - self.pending.len()
    }

    /// Discard partial samples after a channel drop; the previously
    /// committed offset stays in effect.
    pub fn abort_handshake(&mut self) {
        self.pending.clear();
    }
}
