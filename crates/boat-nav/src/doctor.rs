use anyhow::Result;
use crate::battery::BatteryCfg;
use crate::gnss::GnssCfg;

pub fn check_gnss(cfg: &GnssCfg) -> Result<()> {
    anyhow::ensure!(cfg.min_sats <= 12, "gnss.min_sats too high");
    anyhow::ensure!(cfg.max_fix_age_s >= 1 && cfg.max_fix_age_s <= 60, "gnss.max_fix_age_s should be 1..60");
    match cfg.source.as_str() {
        "serial" => {
            anyhow::ensure!(cfg.nmea_device.is_some(), "gnss.nmea_device required for serial source");
            anyhow::ensure!(cfg.nmea_baud >= 4800, "gnss.nmea_baud too low");
        }
        "file" => anyhow::ensure!(cfg.nmea_file.is_some(), "gnss.nmea_file required for file source"),
        "static" => {
            let lat = cfg.static_lat.unwrap_or(f64::NAN);
            let lon = cfg.static_lon.unwrap_or(f64::NAN);
            anyhow::ensure!(lat.abs() <= 90.0 && lon.abs() <= 180.0, "gnss static coordinates invalid");
        }
        other => anyhow::bail!("unknown gnss.source {}", other),
    }
    Ok(())
}

pub fn check_battery(cfg: &BatteryCfg) -> Result<()> {
    anyhow::ensure!(cfg.fixed_percent <= 100, "battery.fixed_percent above 100");
    cfg.gauge()?;
    if let Some(path) = cfg.voltage_path.as_deref().filter(|_| cfg.source == "sysfs") {
        let v = crate::battery::read_voltage(path)?;
        anyhow::ensure!(v > 2.5 && v < 4.5, "battery voltage {:.2} V implausible", v);
    }
    Ok(())
}
