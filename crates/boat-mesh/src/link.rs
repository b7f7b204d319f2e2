use serde::Serialize;
use std::time::{Duration, Instant};

/// Reachability summary shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    FullyConnected,
    WideAreaOnly,
    MeshOnly,
    Isolated,
}

impl LinkStatus {
    /// Pure function of the two live signals; no history.
    pub fn evaluate(wide_area_joined: bool, mesh_recent: bool) -> Self {
        match (wide_area_joined, mesh_recent) {
            (true, true) => LinkStatus::FullyConnected,
            (true, false) => LinkStatus::WideAreaOnly,
            (false, true) => LinkStatus::MeshOnly,
            (false, false) => LinkStatus::Isolated,
        }
    }

    /// Status LED convention: green = uplink joined, red = not;
    /// solid = mesh alive when joined, or isolated when not.
    pub fn indicator(&self) -> Indicator {
        match self {
            LinkStatus::FullyConnected => Indicator { color: LedColor::Green, blink: None },
            LinkStatus::WideAreaOnly => Indicator { color: LedColor::Green, blink: Some(Duration::from_millis(400)) },
            LinkStatus::MeshOnly => Indicator { color: LedColor::Red, blink: Some(Duration::from_millis(500)) },
            LinkStatus::Isolated => Indicator { color: LedColor::Red, blink: None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedColor {
    Green,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub color: LedColor,
    /// Half-period of the blink; `None` is solid.
    pub blink: Option<Duration>,
}

impl Indicator {
    pub fn lit_at(&self, elapsed: Duration) -> bool {
        match self.blink {
            None => true,
            Some(half) if half.is_zero() => true,
            Some(half) => (elapsed.as_millis() / half.as_millis()) % 2 == 0,
        }
    }
}

/// When the mesh was last heard from.
#[derive(Debug, Clone)]
pub struct MeshActivity {
    last_heard: Option<Instant>,
    staleness: Duration,
}

impl MeshActivity {
    pub fn new(staleness: Duration) -> Self {
        Self { last_heard: None, staleness }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_heard = Some(now);
    }

    pub fn is_recent(&self, now: Instant) -> bool {
        match self.last_heard {
            Some(t) => now.saturating_duration_since(t) < self.staleness,
            None => false,
        }
    }

    pub fn last_heard(&self) -> Option<Instant> {
        self.last_heard
    }
}
