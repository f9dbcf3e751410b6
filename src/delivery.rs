//! Delivery latch guarding the input payload.
//!
//! At most one payload write may be outstanding per wait cycle. The latch
//! moves `Idle -> Sending` when a write is attempted and only returns to
//! `Idle` when the wait ends, the write fails, the wait is canceled, or the
//! controller restarts.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    Idle,
    Sending,
}

#[derive(Debug, Default)]
pub struct DeliveryLatch {
    state: DeliveryState,
}

impl DeliveryLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn is_sending(&self) -> bool {
        self.state == DeliveryState::Sending
    }

    /// Claims the latch for one write. Returns `false` if a write is already
    /// outstanding in this cycle.
    pub fn try_begin(&mut self) -> bool {
        match self.state {
            DeliveryState::Idle => {
                self.state = DeliveryState::Sending;
                true
            }
            DeliveryState::Sending => false,
        }
    }

    pub fn write_failed(&mut self) {
        self.state = DeliveryState::Idle;
    }

    pub fn wait_ended(&mut self) {
        self.state = DeliveryState::Idle;
    }

    pub fn canceled(&mut self) {
        self.state = DeliveryState::Idle;
    }

    pub fn reset(&mut self) {
        self.state = DeliveryState::Idle;
    }
}
