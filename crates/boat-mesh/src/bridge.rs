use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::radio::{Path, Radio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeOutcome {
    Forwarded,
    NotJoined,
    RateLimited,
    Busy,
}

/// Any node with a live wide-area link relays mesh traffic upstream
/// ("anycast gateway"), spaced out because the uplink has far less
/// airtime than the mesh.
#[derive(Debug)]
pub struct GatewayBridge {
    min_interval: Duration,
    last_bridge_at: Option<Instant>,
}

impl GatewayBridge {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_bridge_at: None }
    }

    /// One non-blocking attempt. Only a successful send restarts the
    /// rate-limit window.
    pub fn maybe_bridge(&mut self, frame: &[u8], now: Instant, radio: &mut dyn Radio) -> BridgeOutcome {
        if !radio.is_wide_area_joined() {
            trace!("bridge: wide-area not joined");
            return BridgeOutcome::NotJoined;
        }
        if let Some(t) = self.last_bridge_at {
            if now.saturating_duration_since(t) < self.min_interval {
                trace!("bridge: rate limited");
                return BridgeOutcome::RateLimited;
            }
        }
        if !radio.try_transmit(Path::WideArea, frame) {
            debug!("bridge: uplink busy, frame dropped");
            return BridgeOutcome::Busy;
        }
        self.last_bridge_at = Some(now);
        BridgeOutcome::Forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingRadio;

    const FRAME: [u8; 4] = [1, 2, 3, 4];

    #[test]
    fn not_joined_drops() {
        let mut b = GatewayBridge::new(Duration::from_secs(2));
        let mut radio = RecordingRadio::default();
        assert_eq!(b.maybe_bridge(&FRAME, Instant::now(), &mut radio), BridgeOutcome::NotJoined);
        assert!(radio.wan.is_empty());
    }

    #[test]
    fn second_frame_inside_interval_is_rate_limited() {
        let t0 = Instant::now();
        let mut b = GatewayBridge::new(Duration::from_secs(2));
        let mut radio = RecordingRadio { joined: true, ..Default::default() };
        assert_eq!(b.maybe_bridge(&FRAME, t0, &mut radio), BridgeOutcome::Forwarded);
        assert_eq!(b.maybe_bridge(&FRAME, t0 + Duration::from_millis(1_999), &mut radio), BridgeOutcome::RateLimited);
        assert_eq!(b.maybe_bridge(&FRAME, t0 + Duration::from_secs(2), &mut radio), BridgeOutcome::Forwarded);
        assert_eq!(radio.wan.len(), 2);
    }

    #[test]
    fn busy_attempt_does_not_start_window() {
        let t0 = Instant::now();
        let mut b = GatewayBridge::new(Duration::from_secs(2));
        let mut radio = RecordingRadio { joined: true, wan_busy: true, ..Default::default() };
        assert_eq!(b.maybe_bridge(&FRAME, t0, &mut radio), BridgeOutcome::Busy);
        radio.wan_busy = false;
        assert_eq!(b.maybe_bridge(&FRAME, t0 + Duration::from_millis(10), &mut radio), BridgeOutcome::Forwarded);
    }
}
