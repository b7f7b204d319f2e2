//! Mesh relay and gateway bridging engine.
//!
//! Inbound frames go decode -> dedupe -> flood router -> gateway bridge;
//! own reports go scheduler -> path choice -> radio. All shared state
//! (dedupe cache, last-heard time, sequence counter) lives in one
//! [`MeshEngine`].

pub mod bridge;
pub mod dedupe;
pub mod doctor;
pub mod engine;
pub mod jitter;
pub mod link;
pub mod nearby;
pub mod radio;
pub mod router;
pub mod scheduler;
pub mod status;

#[cfg(test)]
pub(crate) mod testutil;

use serde::Deserialize;
use std::time::Duration;

pub use engine::{FrameOutcome, MeshEngine, SharedEngine};
pub use link::LinkStatus;
pub use radio::{Path, Radio};

/// Node identity as loaded by the provisioning layer.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Identity {
    pub origin_id: u16,
    /// Last sequence number used before reboot (0 on a fresh node).
    #[serde(default)]
    pub initial_sequence: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relays a packet may take before it is consumed instead of re-flooded.
    pub hop_budget: u8,
    /// Mesh counts as alive this long after the last novel frame.
    pub mesh_stale_s: u64,
    pub rebroadcast_jitter_min_ms: u64,
    pub rebroadcast_jitter_max_ms: u64,
    /// Minimum spacing between two successful bridge sends.
    pub bridge_min_interval_ms: u64,
    pub report_interval_s: u64,
    pub report_jitter_s: u64,
    /// Re-check cadence while reporting is paused.
    pub paused_recheck_s: u64,
    pub max_pending_rebroadcasts: usize,
    pub nearby_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hop_budget: 4,
            mesh_stale_s: 10 * 60,
            rebroadcast_jitter_min_ms: 200,
            rebroadcast_jitter_max_ms: 600,
            bridge_min_interval_ms: 2_000,
            report_interval_s: 120,
            report_jitter_s: 20,
            paused_recheck_s: 5,
            max_pending_rebroadcasts: 8,
            nearby_capacity: 30,
        }
    }
}

impl EngineConfig {
    pub fn mesh_stale(&self) -> Duration {
        Duration::from_secs(self.mesh_stale_s)
    }

    pub fn rebroadcast_jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.rebroadcast_jitter_min_ms),
            Duration::from_millis(self.rebroadcast_jitter_max_ms),
        )
    }

    pub fn bridge_min_interval(&self) -> Duration {
        Duration::from_millis(self.bridge_min_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_s)
    }

    pub fn report_jitter(&self) -> Duration {
        Duration::from_secs(self.report_jitter_s)
    }

    pub fn paused_recheck(&self) -> Duration {
        Duration::from_secs(self.paused_recheck_s)
    }
}
