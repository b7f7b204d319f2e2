use boat_proto::ReportPacket;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone)]
struct NearbyEntry {
    last: ReportPacket,
    last_seen: Instant,
}

/// Serializable view of one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyBoat {
    pub origin_id: u16,
    pub lat: f64,
    pub lon: f64,
    pub speed_cms: u16,
    pub heading_cdeg: u16,
    pub battery: u8,
    pub hops: u8,
    pub age_s: u64,
}

/// Latest report per boat heard on the mesh, bounded; the least recently
/// heard boat makes room for a new one.
#[derive(Debug)]
pub struct NearbyTable {
    capacity: usize,
    entries: Vec<NearbyEntry>,
}

impl NearbyTable {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn update(&mut self, packet: &ReportPacket, now: Instant) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.last.origin_id == packet.origin_id) {
            e.last = *packet;
            e.last_seen = now;
            return;
        }
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(i, _)| i)
            {
                self.entries.swap_remove(oldest);
            }
        }
        self.entries.push(NearbyEntry { last: *packet, last_seen: now });
    }

    /// Most recently heard first.
    pub fn entries(&self, now: Instant) -> Vec<NearbyBoat> {
        let mut out: Vec<_> = self.entries.iter().collect();
        out.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        out.into_iter()
            .map(|e| NearbyBoat {
                origin_id: e.last.origin_id,
                lat: e.last.latitude(),
                lon: e.last.longitude(),
                speed_cms: e.last.speed_cms,
                heading_cdeg: e.last.heading_cdeg,
                battery: e.last.battery_pct,
                hops: e.last.hop_count,
                age_s: now.saturating_duration_since(e.last_seen).as_secs(),
            })
            .collect()
    }
}
