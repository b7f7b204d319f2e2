use serde::Serialize;

use crate::link::LinkStatus;
use crate::nearby::NearbyBoat;

/// Running totals kept by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub duplicates: u64,
    pub own_echoes: u64,
    pub relays_scheduled: u64,
    pub relays_sent: u64,
    pub relays_lost: u64,
    pub bridged: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
}

/// Point-in-time view for the status display / local API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub ts_unix_ms: i64,
    pub origin_id: u16,
    pub sequence: u16,
    pub battery: u8,
    pub fix_valid: bool,
    pub lat: f64,
    pub lon: f64,
    pub wan_joined: bool,
    pub mesh_recent: bool,
    pub link: LinkStatus,
    pub reporting: bool,
    pub last_mesh_heard_s: Option<u64>,
    /// Relays still waiting out their jitter delay.
    pub pending_rebroadcasts: usize,
    pub counters: Counters,
    pub nearby: Vec<NearbyBoat>,
}
