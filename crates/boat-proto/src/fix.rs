use serde::{Deserialize, Serialize};

use crate::packet::ReportPacket;

/// Latest position sample from whatever positioning hardware is attached.
/// `valid == false` means lat/lon are meaningless; the frame cannot tell,
/// so the flag has to travel with the fix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fix {
    pub valid: bool,
    pub lat: f64,
    pub lon: f64,
    pub speed_mps: f64,
    pub heading_deg: f64,
}

pub trait FixSource {
    fn current_fix(&self) -> Fix;
    fn battery_percent(&self) -> u8;
}

impl Fix {
    pub fn latitude_e7(&self) -> i32 {
        if self.valid { to_e7(self.lat) } else { 0 }
    }

    pub fn longitude_e7(&self) -> i32 {
        if self.valid { to_e7(self.lon) } else { 0 }
    }

    pub fn speed_cms(&self) -> u16 {
        let cms = (self.speed_mps * 100.0).round();
        if cms.is_nan() || cms <= 0.0 { 0 } else { cms.min(u16::MAX as f64) as u16 }
    }

    /// Centidegrees folded into [0, 36000).
    pub fn heading_cdeg(&self) -> u16 {
        if !self.heading_deg.is_finite() {
            return 0;
        }
        let deg = self.heading_deg.max(0.0) % 360.0;
        let cdeg = (deg * 100.0).round() as u32;
        (cdeg % 36_000) as u16
    }
}

fn to_e7(deg: f64) -> i32 {
    let v = (deg * 1e7).round();
    if v.is_nan() { 0 } else { v.clamp(i32::MIN as f64, i32::MAX as f64) as i32 }
}

impl ReportPacket {
    /// Fresh own report; origin always starts at hop 0.
    pub fn from_fix(origin_id: u16, sequence: u16, fix: &Fix, battery_pct: u8) -> Self {
        Self {
            origin_id,
            sequence,
            latitude_e7: fix.latitude_e7(),
            longitude_e7: fix.longitude_e7(),
            speed_cms: fix.speed_cms(),
            heading_cdeg: fix.heading_cdeg(),
            battery_pct: battery_pct.min(100),
            hop_count: 0,
        }
    }
}
