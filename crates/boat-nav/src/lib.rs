pub mod battery;
pub mod doctor;
pub mod gnss;

use boat_proto::{Fix, FixSource};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::battery::BatteryGauge;
use crate::gnss::GnssFix;

/// Latest GNSS fix, shared between the reader task and the engine.
pub type LatestFix = Arc<Mutex<Option<GnssFix>>>;

/// Location + battery inputs as the engine sees them. A fix older than
/// `max_fix_age` is reported as invalid.
pub struct NavInputs {
    latest: LatestFix,
    battery: BatteryGauge,
    max_fix_age: Duration,
}

impl NavInputs {
    pub fn new(latest: LatestFix, battery: BatteryGauge, max_fix_age: Duration) -> Self {
        Self { latest, battery, max_fix_age }
    }
}

impl FixSource for NavInputs {
    fn current_fix(&self) -> Fix {
        let guard = match self.latest.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(g) if !stale_after(Instant::now(), g, self.max_fix_age) => g.fix,
            Some(g) => Fix { valid: false, ..g.fix },
            None => Fix::default(),
        }
    }

    fn battery_percent(&self) -> u8 {
        self.battery.percent()
    }
}

pub fn stale_after(now: Instant, fix: &GnssFix, max_age: Duration) -> bool {
    now.saturating_duration_since(fix.received_at) > max_age
}
