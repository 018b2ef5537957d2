use serde::{Deserialize, Serialize};
use wcpos_api::Checkpoint;

/// Per-query remote sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub checkpoint: Checkpoint,
    pub has_more: bool,
    pub in_flight: bool,
    pub retry_count: u32,
    /// Parameter generation; a fetch started under an older epoch is discarded
    pub epoch: u64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            checkpoint: Checkpoint::Beginning,
            has_more: true,
            in_flight: false,
            retry_count: 0,
            epoch: 0,
        }
    }
}

impl SyncState {
    /// Start over for a new parameter set.
    pub fn reset(&mut self) {
        *self = Self {
            epoch: self.epoch + 1,
            ..Self::default()
        };
    }

    /// Begin a new refresh pass after the previous one reached the end.
    pub fn restart_pass(&mut self) {
        self.checkpoint = Checkpoint::Beginning;
        self.has_more = true;
    }
}
