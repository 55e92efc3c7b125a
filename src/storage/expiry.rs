//! Background sweeper for expired records.
//!
//! Reads already treat expired records as absent; the sweeper only reclaims their
//! space. Ticks before `Init` are skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::storage::{StateEngine, StateError};

/// Periodically purges expired records from a state engine.
pub struct ExpirySweeper {
    engine: Arc<StateEngine>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(engine: Arc<StateEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Spawns the sweep loop. The returned handle runs until aborted.
    pub fn run(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Starting expiry sweeper with interval: {:?}", self.period);

            loop {
                ticker.tick().await;
                self.sweep_once();
            }
        })
    }

    /// Runs one sweep and returns the number of purged records.
    pub fn sweep_once(&self) -> usize {
        match self.engine.purge_expired() {
            Ok(purged) => {
                if purged > 0 {
                    info!("Expiry sweep removed {} records", purged);
                }
                purged
            }
            Err(StateError::NotInitialized) => {
                debug!("Expiry sweep skipped, state store not initialized");
                0
            }
            Err(e) => {
                warn!("Expiry sweep failed: {}", e);
                0
            }
        }
    }
}
