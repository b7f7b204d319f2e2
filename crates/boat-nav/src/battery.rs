use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::warn;

/// Single-cell Li-ion: empty below 3.20 V, full above 4.15 V.
pub const CELL_EMPTY_V: f32 = 3.20;
pub const CELL_FULL_V: f32 = 4.15;

/// Linear state-of-charge estimate for one cell, rounded to whole percent.
pub fn percent_from_voltage(volts: f32) -> u8 {
    if !volts.is_finite() || volts <= CELL_EMPTY_V {
        return 0;
    }
    if volts >= CELL_FULL_V {
        return 100;
    }
    let frac = (volts - CELL_EMPTY_V) / (CELL_FULL_V - CELL_EMPTY_V);
    (frac * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatteryCfg {
    /// "fixed" or "sysfs"
    pub source: String,
    #[serde(default = "default_fixed_percent")]
    pub fixed_percent: u8,
    /// e.g. /sys/class/power_supply/battery/voltage_now (microvolts)
    pub voltage_path: Option<String>,
}

fn default_fixed_percent() -> u8 { 100 }

impl Default for BatteryCfg {
    fn default() -> Self {
        Self { source: "fixed".into(), fixed_percent: default_fixed_percent(), voltage_path: None }
    }
}

impl BatteryCfg {
    pub fn gauge(&self) -> Result<BatteryGauge> {
        match self.source.as_str() {
            "fixed" => Ok(BatteryGauge::Fixed(self.fixed_percent.min(100))),
            "sysfs" => {
                let path = self.voltage_path.clone().context("battery.voltage_path missing")?;
                Ok(BatteryGauge::sysfs(path))
            }
            other => anyhow::bail!("unknown battery.source {}", other),
        }
    }
}

pub enum BatteryGauge {
    Fixed(u8),
    Sysfs { path: String, last: Mutex<u8> },
}

impl BatteryGauge {
    pub fn sysfs(path: String) -> Self {
        Self::Sysfs { path, last: Mutex::new(0) }
    }

    /// Current percent. A failed sysfs read keeps the last good value.
    pub fn percent(&self) -> u8 {
        match self {
            BatteryGauge::Fixed(p) => (*p).min(100),
            BatteryGauge::Sysfs { path, last } => {
                let mut last = match last.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match read_voltage(path) {
                    Ok(v) => *last = percent_from_voltage(v),
                    Err(e) => warn!(error = %e, "battery: read failed, keeping last value"),
                }
                *last
            }
        }
    }
}

/// Reads a power_supply style microvolt value and returns volts.
pub fn read_voltage(path: &str) -> Result<f32> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read battery voltage {}", path))?;
    let microvolts: i64 = content.trim()
        .parse()
        .context("parse voltage value")?;
    Ok(microvolts as f32 / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_curve_endpoints_and_middle() {
        assert_eq!(percent_from_voltage(3.0), 0);
        assert_eq!(percent_from_voltage(3.2), 0);
        assert_eq!(percent_from_voltage(4.15), 100);
        assert_eq!(percent_from_voltage(4.3), 100);
        assert_eq!(percent_from_voltage(3.675), 50);
        assert_eq!(percent_from_voltage(f32::NAN), 0);
    }

    #[test]
    fn sysfs_gauge_reads_and_keeps_last_good() {
        let dir = std::env::temp_dir().join(format!("boatnode-batt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("voltage_now");
        std::fs::write(&path, "4150000\n").unwrap();

        let gauge = BatteryGauge::sysfs(path.to_string_lossy().into_owned());
        assert_eq!(gauge.percent(), 100);

        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(gauge.percent(), 100);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fixed_gauge_clamps() {
        assert_eq!(BatteryGauge::Fixed(150).percent(), 100);
        let cfg = BatteryCfg { source: "fixed".into(), fixed_percent: 77, voltage_path: None };
        assert_eq!(cfg.gauge().unwrap().percent(), 77);
        let bad = BatteryCfg { source: "sysfs".into(), fixed_percent: 0, voltage_path: None };
        assert!(bad.gauge().is_err());
    }
}
