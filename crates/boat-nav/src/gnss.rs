use anyhow::{Context, Result};
use boat_proto::Fix;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

const KNOTS_TO_MPS: f64 = 0.514_444;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixQuality {
    pub sats: u8,
    pub hdop: f32,
}

#[derive(Debug, Clone)]
pub struct GnssFix {
    pub fix: Fix,
    pub quality: FixQuality,
    pub received_at: Instant,
}

/// Minimal NMEA reader:
/// - GGA: satellites + hdop, remembered until the next RMC
/// - RMC: validity, lat/lon, speed over ground, course
#[derive(Debug, Clone)]
pub struct NmeaParser {
    min_sats: u8,
    last_gga: Option<FixQuality>,
}

impl NmeaParser {
    pub fn new(min_sats: u8) -> Self {
        Self { min_sats, last_gga: None }
    }

    pub fn parse_line(&mut self, s: &str) -> Option<GnssFix> {
        let s = s.trim();
        let body = s.split('*').next().unwrap_or(s);
        let parts: Vec<&str> = body.split(',').collect();
        let tag = parts.first().copied().unwrap_or("");

        if tag.ends_with("GGA") && tag.starts_with('$') {
            if parts.len() > 8 {
                let sats: u8 = parts[7].parse().unwrap_or(0);
                let hdop: f32 = parts[8].parse().unwrap_or(99.9);
                self.last_gga = Some(FixQuality { sats, hdop });
            }
            return None;
        }

        if tag.ends_with("RMC") && tag.starts_with('$') && parts.len() > 8 {
            // parts[2]=A/V, [3]=lat ddmm.mmmm, [4]=N/S, [5]=lon dddmm.mmmm, [6]=E/W,
            // [7]=speed knots, [8]=course deg
            let quality = self.last_gga.unwrap_or(FixQuality { sats: 0, hdop: 99.9 });
            let lat = parse_deg_min(parts[3], parts[4]);
            let lon = parse_deg_min(parts[5], parts[6]);
            let active = parts[2] == "A";
            let enough_sats = self.min_sats == 0 || self.last_gga.is_none() || quality.sats >= self.min_sats;

            let fix = match (lat, lon) {
                (Some(lat), Some(lon)) => Fix {
                    valid: active && enough_sats,
                    lat,
                    lon,
                    speed_mps: parts[7].parse::<f64>().map(|k| k * KNOTS_TO_MPS).unwrap_or(0.0),
                    heading_deg: parts[8].parse().unwrap_or(0.0),
                },
                _ => Fix::default(),
            };
            trace!(valid = fix.valid, sats = quality.sats, "gnss: rmc");
            return Some(GnssFix { fix, quality, received_at: Instant::now() });
        }

        None
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() { return None; }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.')?;
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" { out = -out; }
    Some(out)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GnssCfg {
    /// "serial", "file" or "static"
    pub source: String,
    pub nmea_device: Option<String>,
    #[serde(default = "default_baud")]
    pub nmea_baud: u32,
    pub nmea_file: Option<String>,
    pub static_lat: Option<f64>,
    pub static_lon: Option<f64>,
    pub min_sats: u8,
    pub max_fix_age_s: u64,
}

fn default_baud() -> u32 { 9600 }

impl GnssCfg {
    pub fn open(&self) -> Result<GnssSource> {
        match self.source.as_str() {
            "serial" => {
                let dev = self.nmea_device.as_deref().context("gnss.nmea_device missing")?;
                GnssSource::serial(dev, self.nmea_baud, self.min_sats)
            }
            "file" => {
                let path = self.nmea_file.as_deref().context("gnss.nmea_file missing")?;
                GnssSource::file(path, self.min_sats)
            }
            "static" => {
                let lat = self.static_lat.context("gnss.static_lat missing")?;
                let lon = self.static_lon.context("gnss.static_lon missing")?;
                Ok(GnssSource::fixed(lat, lon))
            }
            other => anyhow::bail!("unknown gnss.source {}", other),
        }
    }

    pub fn max_fix_age(&self) -> Duration {
        Duration::from_secs(self.max_fix_age_s)
    }
}

pub enum GnssSource {
    Serial(BufReader<SerialStream>, NmeaParser),
    File(BufReader<File>, NmeaParser),
    /// Fixed position, for bench nodes without a receiver.
    Static(Fix),
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32, min_sats: u8) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self::Serial(BufReader::new(port), NmeaParser::new(min_sats)))
    }

    pub fn file(path: &str, min_sats: u8) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        Ok(Self::File(BufReader::new(File::from_std(f)), NmeaParser::new(min_sats)))
    }

    pub fn fixed(lat: f64, lon: f64) -> Self {
        Self::Static(Fix { valid: true, lat, lon, speed_mps: 0.0, heading_deg: 0.0 })
    }

    pub async fn next_fix(&mut self) -> Result<GnssFix> {
        let mut line = String::new();
        loop {
            line.clear();
            match self {
                GnssSource::Serial(r, p) => {
                    r.read_line(&mut line).await.context("read gnss serial")?;
                    if let Some(fix) = p.parse_line(&line) { return Ok(fix); }
                }
                GnssSource::File(r, p) => {
                    let n = r.read_line(&mut line).await.context("read nmea file")?;
                    if n == 0 {
                        // replay from the top
                        r.rewind().await.context("rewind nmea file")?;
                        debug!("gnss: nmea file exhausted, rewinding");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                    if let Some(fix) = p.parse_line(&line) {
                        // pace the replay roughly like a 1 Hz receiver
                        tokio::time::sleep(Duration::from_millis(1000)).await;
                        return Ok(fix);
                    }
                }
                GnssSource::Static(fix) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    return Ok(GnssFix {
                        fix: *fix,
                        quality: FixQuality { sats: 12, hdop: 0.8 },
                        received_at: Instant::now(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,1304.800,N,08016.200,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,1304.800,N,08016.200,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn rmc_after_gga_yields_valid_fix() {
        let mut p = NmeaParser::new(4);
        assert!(p.parse_line(GGA).is_none());
        let g = p.parse_line(RMC).unwrap();
        assert!(g.fix.valid);
        assert!((g.fix.lat - 13.08).abs() < 1e-9);
        assert!((g.fix.lon - 80.27).abs() < 1e-9);
        assert!((g.fix.speed_mps - 22.4 * KNOTS_TO_MPS).abs() < 1e-9);
        assert!((g.fix.heading_deg - 84.4).abs() < 1e-9);
        assert_eq!(g.quality, FixQuality { sats: 8, hdop: 0.9 });
    }

    #[test]
    fn void_rmc_is_invalid() {
        let mut p = NmeaParser::new(4);
        let g = p.parse_line(&RMC.replace(",A,", ",V,")).unwrap();
        assert!(!g.fix.valid);
    }

    #[test]
    fn too_few_sats_is_invalid() {
        let mut p = NmeaParser::new(10);
        p.parse_line(GGA);
        assert!(!p.parse_line(RMC).unwrap().fix.valid);
    }

    #[test]
    fn southern_western_hemispheres_are_negative() {
        let mut p = NmeaParser::new(0);
        let line = "$GNRMC,000000,A,3352.000,S,15112.000,W,0.0,0.0,010120,,";
        let g = p.parse_line(line).unwrap();
        assert!((g.fix.lat + 33.8666666).abs() < 1e-6);
        assert!((g.fix.lon + 151.2).abs() < 1e-9);
    }

    #[test]
    fn empty_position_gives_default_fix() {
        let mut p = NmeaParser::new(0);
        let g = p.parse_line("$GPRMC,,V,,,,,,,,,,N").unwrap();
        assert!(!g.fix.valid);
        assert_eq!(g.fix.lat, 0.0);
    }

    #[test]
    fn other_sentences_are_ignored() {
        let mut p = NmeaParser::new(0);
        assert!(p.parse_line("$GPGSV,3,1,11,03,03,111,00*74").is_none());
        assert!(p.parse_line("garbage").is_none());
    }
}
