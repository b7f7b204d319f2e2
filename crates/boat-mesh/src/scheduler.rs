use boat_proto::{Fix, ReportPacket};
use std::time::{Duration, Instant};

use crate::jitter::JitterSource;
use crate::radio::Path;

/// Path for this node's own report. Mesh first while the mesh is alive
/// (peers near a gateway carry it for free), wide-area when the mesh has
/// gone quiet, and mesh again as a last resort when nothing is joined.
pub fn choose_path(mesh_recent: bool, wide_area_joined: bool) -> Path {
    if mesh_recent {
        Path::Mesh
    } else if wide_area_joined {
        Path::WideArea
    } else {
        Path::Mesh
    }
}

/// Periodic own-report timer plus the local sequence counter.
#[derive(Debug)]
pub struct ReportScheduler {
    interval: Duration,
    jitter_window: Duration,
    paused_recheck: Duration,
    next_due: Instant,
    sequence: u16,
    enabled: bool,
}

impl ReportScheduler {
    pub fn new(
        interval: Duration,
        jitter_window: Duration,
        paused_recheck: Duration,
        initial_sequence: u16,
        now: Instant,
        jitter: &mut dyn JitterSource,
    ) -> Self {
        let next_due = now + interval + jitter.draw(Duration::ZERO, jitter_window);
        Self { interval, jitter_window, paused_recheck, next_due, sequence: initial_sequence, enabled: true }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Last sequence number handed out; what a persistence layer saves.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// If due, reschedule and (when enabled) build the next own report.
    /// The next deadline is fixed before anything is sent, so a failed send
    /// never shifts the cadence.
    pub fn tick(
        &mut self,
        now: Instant,
        origin_id: u16,
        fix: &Fix,
        battery_pct: u8,
        jitter: &mut dyn JitterSource,
    ) -> Option<ReportPacket> {
        if !self.is_due(now) {
            return None;
        }
        if !self.enabled {
            self.next_due = now + self.paused_recheck;
            return None;
        }
        self.next_due = now + self.interval + jitter.draw(Duration::ZERO, self.jitter_window);
        self.sequence = self.sequence.wrapping_add(1);
        Some(ReportPacket::from_fix(origin_id, self.sequence, fix, battery_pct))
    }
}
