//! Loading gate: bounds how long `is_loading` can stay raised.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use super::AuthStateHandle;

/// Owns the externally visible `is_loading` flag.
///
/// Each [`begin`](LoadingGate::begin) returns an epoch and arms a deadline
/// timer. The flag drops when the matching [`release`](LoadingGate::release)
/// arrives or the deadline fires, whichever is first. Releases and timers
/// from superseded epochs are no-ops.
#[derive(Debug, Clone)]
pub struct LoadingGate {
    state: AuthStateHandle,
    deadline: Duration,
    epoch: Arc<Mutex<u64>>,
}

impl LoadingGate {
    pub fn new(state: AuthStateHandle, deadline: Duration) -> Self {
        Self {
            state,
            deadline,
            epoch: Arc::new(Mutex::new(0)),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Raises `is_loading` and arms the deadline timer.
    pub fn begin(&self) -> u64 {
        let epoch = {
            let mut current = self.epoch.lock();
            *current += 1;
            self.state.set_loading(true);
            *current
        };

        let gate = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(gate.deadline).await;
            let current = gate.epoch.lock();
            if *current == epoch && gate.state.is_loading() {
                warn!(
                    deadline_ms = gate.deadline.as_millis() as u64,
                    role = %gate.state.view().role,
                    "loading deadline elapsed, releasing with best-effort permissions"
                );
                gate.state.set_loading(false);
            }
        });

        epoch
    }

    /// Lowers `is_loading` if `epoch` is still the latest.
    pub fn release(&self, epoch: u64) {
        let current = self.epoch.lock();
        if *current == epoch {
            self.state.set_loading(false);
        }
    }

    /// Lowers `is_loading` unconditionally and disarms pending timers.
    pub fn open(&self) {
        let mut current = self.epoch.lock();
        *current += 1;
        self.state.set_loading(false);
    }
}
