use boat_proto::{FixSource, Rejected, ReportPacket};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::bridge::{BridgeOutcome, GatewayBridge};
use crate::dedupe::DedupeCache;
use crate::jitter::JitterSource;
use crate::link::{LinkStatus, MeshActivity};
use crate::nearby::{NearbyBoat, NearbyTable};
use crate::radio::{Path, Radio};
use crate::router::{FloodRouter, Routed};
use crate::scheduler::{choose_path, ReportScheduler};
use crate::status::{Counters, StatusSnapshot};
use crate::{EngineConfig, Identity};

/// The engine behind one lock, for callers that split radio I/O and
/// bridging across tasks.
pub type SharedEngine = Arc<Mutex<MeshEngine>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rejected(Rejected),
    Duplicate,
    /// One of our own reports coming back via a neighbour.
    OwnEcho,
    Accepted { routed: Routed, bridge: BridgeOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub packet: ReportPacket,
    pub path: Path,
    pub sent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PollSummary {
    pub frame: Option<FrameOutcome>,
    pub rebroadcasts_sent: usize,
    pub report: Option<ReportOutcome>,
}

pub struct MeshEngine {
    identity: Identity,
    dedupe: DedupeCache,
    router: FloodRouter,
    bridge: GatewayBridge,
    scheduler: ReportScheduler,
    activity: MeshActivity,
    nearby: NearbyTable,
    jitter: Box<dyn JitterSource>,
    counters: Counters,
}

impl MeshEngine {
    pub fn new(cfg: &EngineConfig, identity: Identity, now: Instant, mut jitter: Box<dyn JitterSource>) -> Self {
        let scheduler = ReportScheduler::new(
            cfg.report_interval(),
            cfg.report_jitter(),
            cfg.paused_recheck(),
            identity.initial_sequence,
            now,
            jitter.as_mut(),
        );
        info!(
            origin = identity.origin_id,
            hop_budget = cfg.hop_budget,
            first_report_in_s = scheduler.next_due().saturating_duration_since(now).as_secs(),
            "engine: started"
        );
        Self {
            identity,
            dedupe: DedupeCache::new(),
            router: FloodRouter::new(cfg.hop_budget, cfg.rebroadcast_jitter(), cfg.max_pending_rebroadcasts),
            bridge: GatewayBridge::new(cfg.bridge_min_interval()),
            scheduler,
            activity: MeshActivity::new(cfg.mesh_stale()),
            nearby: NearbyTable::new(cfg.nearby_capacity),
            jitter,
            counters: Counters::default(),
        }
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// One inbound mesh frame, start to finish.
    pub fn handle_frame(&mut self, frame: &[u8], now: Instant, radio: &mut dyn Radio) -> FrameOutcome {
        self.counters.frames_received += 1;

        let packet = match ReportPacket::decode(frame) {
            Ok(p) => p,
            Err(e) => {
                debug!("engine: dropping frame: {}", e);
                self.counters.frames_rejected += 1;
                return FrameOutcome::Rejected(e);
            }
        };

        if packet.origin_id == self.identity.origin_id {
            trace!(seq = packet.sequence, "engine: own report echoed back");
            self.counters.own_echoes += 1;
            return FrameOutcome::OwnEcho;
        }

        let routed = self.router.route(&packet, now, &mut self.dedupe, self.jitter.as_mut());
        if !routed.is_novel() {
            self.counters.duplicates += 1;
            return FrameOutcome::Duplicate;
        }
        if matches!(routed, Routed::Scheduled { .. }) {
            self.counters.relays_scheduled += 1;
        }

        self.activity.mark(now);
        self.nearby.update(&packet, now);

        let bridge = self.bridge.maybe_bridge(frame, now, radio);
        if bridge == BridgeOutcome::Forwarded {
            self.counters.bridged += 1;
        }
        debug!(
            origin = packet.origin_id,
            seq = packet.sequence,
            hops = packet.hop_count,
            ?routed,
            ?bridge,
            "engine: mesh frame accepted"
        );

        FrameOutcome::Accepted { routed, bridge }
    }

    /// Send rebroadcasts whose jitter delay has elapsed.
    pub fn flush_rebroadcasts(&mut self, now: Instant, radio: &mut dyn Radio) -> usize {
        let (sent, lost) = self.router.flush_due(now, radio);
        self.counters.relays_sent += sent as u64;
        self.counters.relays_lost += lost as u64;
        sent
    }

    /// Scheduler step: when due, build and send this node's own report.
    pub fn tick_report(&mut self, now: Instant, fix: &dyn FixSource, radio: &mut dyn Radio) -> Option<ReportOutcome> {
        if !self.scheduler.is_due(now) {
            return None;
        }
        let current = fix.current_fix();
        let packet = self.scheduler.tick(
            now,
            self.identity.origin_id,
            &current,
            fix.battery_percent(),
            self.jitter.as_mut(),
        )?;

        let mesh_recent = self.activity.is_recent(now);
        let path = choose_path(mesh_recent, radio.is_wide_area_joined());
        if path == Path::Mesh {
            // neighbours will echo it back; make sure we recognise it
            self.dedupe.remember(packet.origin_id, packet.sequence, now);
        }

        let sent = radio.try_transmit(path, &packet.encode());
        if sent {
            self.counters.reports_sent += 1;
        } else {
            self.counters.reports_failed += 1;
        }
        debug!(seq = packet.sequence, ?path, sent, fix_valid = current.valid, "engine: own report");
        Some(ReportOutcome { packet, path, sent })
    }

    /// One turn of the cooperative loop: due rebroadcasts, at most one
    /// inbound frame, then the report timer.
    pub fn poll(&mut self, now: Instant, radio: &mut dyn Radio, fix: &dyn FixSource) -> PollSummary {
        let rebroadcasts_sent = self.flush_rebroadcasts(now, radio);
        let frame = match radio.poll_receive() {
            Some(f) => Some(self.handle_frame(&f, now, radio)),
            None => None,
        };
        let report = self.tick_report(now, fix, radio);
        PollSummary { frame, rebroadcasts_sent, report }
    }

    pub fn mesh_recent(&self, now: Instant) -> bool {
        self.activity.is_recent(now)
    }

    pub fn link_status(&self, now: Instant, radio: &dyn Radio) -> LinkStatus {
        LinkStatus::evaluate(radio.is_wide_area_joined(), self.mesh_recent(now))
    }

    pub fn set_reporting(&mut self, enabled: bool) {
        if self.scheduler.is_enabled() != enabled {
            info!(enabled, "engine: reporting toggled");
        }
        self.scheduler.set_enabled(enabled);
    }

    pub fn sequence(&self) -> u16 {
        self.scheduler.sequence()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn nearby(&self, now: Instant) -> Vec<NearbyBoat> {
        self.nearby.entries(now)
    }

    pub fn status_snapshot(&self, now: Instant, radio: &dyn Radio, fix: &dyn FixSource) -> StatusSnapshot {
        let current = fix.current_fix();
        let wan_joined = radio.is_wide_area_joined();
        let mesh_recent = self.mesh_recent(now);
        StatusSnapshot {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            origin_id: self.identity.origin_id,
            sequence: self.sequence(),
            battery: fix.battery_percent(),
            fix_valid: current.valid,
            lat: current.lat,
            lon: current.lon,
            wan_joined,
            mesh_recent,
            link: LinkStatus::evaluate(wan_joined, mesh_recent),
            reporting: self.scheduler.is_enabled(),
            last_mesh_heard_s: self.activity.last_heard().map(|t| now.saturating_duration_since(t).as_secs()),
            pending_rebroadcasts: self.router.pending(),
            counters: self.counters.clone(),
            nearby: self.nearby.entries(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::FixedJitter;
    use crate::testutil::{RecordingRadio, StaticFix};
    use boat_proto::Fix;
    use std::time::Duration;

    fn engine(now: Instant) -> MeshEngine {
        MeshEngine::new(
            &EngineConfig::default(),
            Identity { origin_id: 1, initial_sequence: 0 },
            now,
            Box::new(FixedJitter(Duration::from_millis(300))),
        )
    }

    fn frame(origin: u16, seq: u16, hops: u8) -> Vec<u8> {
        ReportPacket {
            origin_id: origin,
            sequence: seq,
            latitude_e7: 130_800_000,
            longitude_e7: 802_700_000,
            speed_cms: 0,
            heading_cdeg: 0,
            battery_pct: 70,
            hop_count: hops,
        }
        .encode()
        .to_vec()
    }

    #[test]
    fn garbage_is_rejected_without_side_effects() {
        let t0 = Instant::now();
        let mut e = engine(t0);
        let mut radio = RecordingRadio { joined: true, ..Default::default() };
        assert!(matches!(e.handle_frame(&[0u8; 5], t0, &mut radio), FrameOutcome::Rejected(_)));
        let mut bad = frame(7, 3, 0);
        bad[6] ^= 0xFF;
        assert!(matches!(e.handle_frame(&bad, t0, &mut radio), FrameOutcome::Rejected(_)));
        assert!(!e.mesh_recent(t0));
        assert!(radio.wan.is_empty());
        assert_eq!(e.counters().frames_rejected, 2);
    }

    #[test]
    fn bridge_gets_frame_as_received() {
        let t0 = Instant::now();
        let mut e = engine(t0);
        let mut radio = RecordingRadio { joined: true, ..Default::default() };
        let f = frame(7, 3, 2);
        let out = e.handle_frame(&f, t0, &mut radio);
        assert!(matches!(out, FrameOutcome::Accepted { bridge: BridgeOutcome::Forwarded, .. }));
        assert_eq!(radio.wan, vec![f]);
    }

    #[test]
    fn own_echo_is_ignored() {
        let t0 = Instant::now();
        let mut e = engine(t0);
        let mut radio = RecordingRadio { joined: true, ..Default::default() };
        assert_eq!(e.handle_frame(&frame(1, 9, 1), t0, &mut radio), FrameOutcome::OwnEcho);
        assert!(!e.mesh_recent(t0));
        e.flush_rebroadcasts(t0 + Duration::from_secs(1), &mut radio);
        assert!(radio.mesh.is_empty());
        assert!(radio.wan.is_empty());
    }

    #[test]
    fn novel_frame_feeds_link_status_and_nearby() {
        let t0 = Instant::now();
        let mut e = engine(t0);
        let mut radio = RecordingRadio::default();
        assert_eq!(e.link_status(t0, &radio), LinkStatus::Isolated);
        e.handle_frame(&frame(7, 3, 0), t0, &mut radio);
        assert_eq!(e.link_status(t0, &radio), LinkStatus::MeshOnly);
        radio.joined = true;
        assert_eq!(e.link_status(t0, &radio), LinkStatus::FullyConnected);
        assert_eq!(e.link_status(t0 + Duration::from_secs(600), &radio), LinkStatus::WideAreaOnly);
        assert_eq!(e.nearby(t0).len(), 1);
    }

    #[test]
    fn snapshot_serializes() {
        let t0 = Instant::now();
        let mut e = engine(t0);
        let mut radio = RecordingRadio::default();
        e.handle_frame(&frame(7, 3, 0), t0, &mut radio);
        let fix = StaticFix(Fix { valid: true, lat: 13.08, lon: 80.27, ..Fix::default() }, 77);
        let snap = e.status_snapshot(t0 + Duration::from_secs(3), &radio, &fix);
        assert_eq!(snap.last_mesh_heard_s, Some(3));
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["link"], "mesh_only");
        assert_eq!(json["battery"], 77);
        assert_eq!(json["nearby"][0]["origin_id"], 7);
        assert_eq!(json["pending_rebroadcasts"], 0);
    }
}
