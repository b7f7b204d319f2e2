use boat_proto::{Frame, ReportPacket};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::dedupe::DedupeCache;
use crate::jitter::JitterSource;
use crate::radio::{Path, Radio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// (origin, sequence) already handled; nothing else happens.
    Duplicate,
    /// New, and at the hop budget: consumed, never re-flooded.
    AtBudget,
    /// New, relayed copy queued for `fire_at`.
    Scheduled { fire_at: Instant },
    /// New, but the rebroadcast queue was full so the relay is lost.
    QueueFull,
}

impl Routed {
    pub fn is_novel(&self) -> bool {
        !matches!(self, Routed::Duplicate)
    }
}

#[derive(Debug, Clone)]
struct PendingRebroadcast {
    frame: Frame,
    fire_at: Instant,
}

/// Hop-limited flood. Rebroadcasts wait out a random delay so that nodes
/// hearing the same frame at the same moment don't all key up together.
#[derive(Debug)]
pub struct FloodRouter {
    hop_budget: u8,
    jitter: (Duration, Duration),
    max_pending: usize,
    pending: VecDeque<PendingRebroadcast>,
}

impl FloodRouter {
    pub fn new(hop_budget: u8, jitter: (Duration, Duration), max_pending: usize) -> Self {
        Self { hop_budget, jitter, max_pending, pending: VecDeque::with_capacity(max_pending) }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Dedupe-then-forward for one decoded inbound packet. The dedupe check
    /// and insert happen in one call on `&mut` state, so two receipts of the
    /// same pair can never both get through.
    pub fn route<const N: usize>(
        &mut self,
        packet: &ReportPacket,
        now: Instant,
        dedupe: &mut DedupeCache<N>,
        jitter: &mut dyn JitterSource,
    ) -> Routed {
        if !dedupe.check_and_remember(packet.origin_id, packet.sequence, now) {
            trace!(origin = packet.origin_id, seq = packet.sequence, "router: duplicate");
            return Routed::Duplicate;
        }

        if packet.hop_count >= self.hop_budget {
            debug!(origin = packet.origin_id, seq = packet.sequence, hops = packet.hop_count, "router: hop budget reached");
            return Routed::AtBudget;
        }

        if self.pending.len() >= self.max_pending {
            debug!(origin = packet.origin_id, seq = packet.sequence, "router: rebroadcast queue full, dropping relay");
            return Routed::QueueFull;
        }

        let delay = jitter.draw(self.jitter.0, self.jitter.1);
        let fire_at = now + delay;
        self.pending.push_back(PendingRebroadcast { frame: packet.relayed().encode(), fire_at });
        trace!(origin = packet.origin_id, seq = packet.sequence, delay_ms = delay.as_millis() as u64, "router: rebroadcast scheduled");
        Routed::Scheduled { fire_at }
    }

    /// Send every queued rebroadcast whose delay has run out. Each one gets
    /// exactly one attempt; a busy radio simply loses it.
    /// Returns (sent, lost).
    pub fn flush_due(&mut self, now: Instant, radio: &mut dyn Radio) -> (usize, usize) {
        let (mut sent, mut lost) = (0, 0);
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].fire_at > now {
                i += 1;
                continue;
            }
            let Some(p) = self.pending.remove(i) else { break };
            if radio.try_transmit(Path::Mesh, &p.frame) {
                sent += 1;
            } else {
                debug!("router: radio busy, rebroadcast lost");
                lost += 1;
            }
        }
        (sent, lost)
    }
}
