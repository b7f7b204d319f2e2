mod radio;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use boat_mesh::jitter::ThreadRngJitter;
use boat_mesh::status::StatusSnapshot;
use boat_mesh::{doctor as mesh_doctor, EngineConfig, FrameOutcome, Identity, LinkStatus, MeshEngine, Radio, SharedEngine};
use boat_nav::battery::BatteryCfg;
use boat_nav::gnss::GnssCfg;
use boat_nav::{doctor as nav_doctor, LatestFix, NavInputs};
use boat_proto::{Rejected, ReportPacket};
use boat_uplink::{doctor as uplink_doctor, UplinkCfg, UplinkStatus, WanUplink};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::radio::{NodeRadio, UdpMeshRadio};

/// Frames handled per drain on top of the one `poll` takes.
const MAX_FRAMES_PER_DRAIN: usize = 16;

#[derive(Debug, Parser)]
#[command(name = "boatnode", version, about = "BoatNode - mesh relay & gateway bridge for boat trackers")]
struct Cli {
    #[arg(long, default_value = "/etc/boatnode/boatnode.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate configuration and local hardware.
    Doctor,
    /// Run the node: relay mesh traffic, bridge to the gateway, send own reports.
    Run,
    /// Decode one hex-encoded 20-byte frame.
    Decode { hex: String },
    /// Print the last status snapshot written by `run`.
    Status,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    node: NodeCfg,
    #[serde(default)]
    engine: EngineConfig,
    mesh_radio: MeshRadioCfg,
    #[serde(default)]
    uplink: UplinkCfg,
    gnss: GnssCfg,
    #[serde(default)]
    battery: BatteryCfg,
    #[serde(default)]
    status: StatusCfg,
}

#[derive(Debug, serde::Deserialize)]
struct NodeCfg {
    origin_id: u16,
    #[serde(default)]
    initial_sequence: u16,
    #[serde(default = "default_true")]
    reporting: bool,
    #[serde(default = "default_poll_ms")]
    poll_ms: u64,
}

#[derive(Debug, serde::Deserialize)]
struct MeshRadioCfg {
    bind: String,
    peers: Vec<String>,
    #[serde(default)]
    broadcast: bool,
}

#[derive(Debug, serde::Deserialize)]
struct StatusCfg {
    path: Option<String>,
    #[serde(default = "default_status_interval_s")]
    interval_s: u64,
}

impl Default for StatusCfg {
    fn default() -> Self {
        Self { path: None, interval_s: default_status_interval_s() }
    }
}

fn default_true() -> bool { true }
fn default_poll_ms() -> u64 { 10 }
fn default_status_interval_s() -> u64 { 10 }

impl NodeCfg {
    fn identity(&self) -> Identity {
        Identity { origin_id: self.origin_id, initial_sequence: self.initial_sequence }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Doctor => doctor(&load_config(&cli.config)?).await?,
        Command::Run => run(&load_config(&cli.config)?).await?,
        Command::Decode { hex } => decode(&hex)?,
        Command::Status => status(&load_config(&cli.config)?)?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    mesh_doctor::check_identity(&cfg.node.identity())?;
    mesh_doctor::check_engine(&cfg.engine)?;
    nav_doctor::check_gnss(&cfg.gnss)?;
    nav_doctor::check_battery(&cfg.battery).or_else(|e| {
        warn!("battery gauge unusable: {:#}", e);
        Ok::<(), anyhow::Error>(())
    })?;
    uplink_doctor::check_endpoint(&cfg.uplink)?;

    radio::parse_peers(&cfg.mesh_radio.peers)?;
    if cfg.mesh_radio.peers.is_empty() {
        warn!("doctor: mesh_radio.peers is empty; mesh transmissions will all fail");
    }
    anyhow::ensure!(cfg.node.poll_ms >= 1 && cfg.node.poll_ms <= 1000, "node.poll_ms should be 1..1000");
    anyhow::ensure!(cfg.status.interval_s >= 1, "status.interval_s must be >= 1");

    info!("doctor: OK");
    Ok(())
}

fn lock(engine: &SharedEngine) -> MutexGuard<'_, MeshEngine> {
    match engine.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting as origin {}", cfg.node.origin_id);
    mesh_doctor::check_identity(&cfg.node.identity())?;
    mesh_doctor::check_engine(&cfg.engine)?;

    let mut src = cfg.gnss.open()?;
    let latest: LatestFix = Arc::new(Mutex::new(None));
    {
        let latest = latest.clone();
        tokio::spawn(async move {
            loop {
                match src.next_fix().await {
                    Ok(fix) => {
                        let mut slot = match latest.lock() {
                            Ok(g) => g,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        *slot = Some(fix);
                    }
                    Err(e) => {
                        warn!("gnss: {:#}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }
    let inputs = NavInputs::new(latest, cfg.battery.gauge()?, cfg.gnss.max_fix_age());

    let wan = if cfg.uplink.enable {
        Some(WanUplink::spawn(&cfg.uplink)?)
    } else {
        info!("run: uplink disabled, mesh only");
        None
    };
    let mesh = UdpMeshRadio::bind(&cfg.mesh_radio.bind, &cfg.mesh_radio.peers, cfg.mesh_radio.broadcast).await?;
    info!("run: mesh listening on {}", mesh.local_addr()?);
    let mut radio = NodeRadio { mesh, wan };

    let started = Instant::now();
    let engine = MeshEngine::new(&cfg.engine, cfg.node.identity(), started, Box::new(ThreadRngJitter)).into_shared();
    if !cfg.node.reporting {
        lock(&engine).set_reporting(false);
        info!("run: own reporting paused by config");
    }

    let mut poll_tick = tokio::time::interval(Duration::from_millis(cfg.node.poll_ms.max(1)));
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut status_tick = tokio::time::interval(Duration::from_secs(cfg.status.interval_s.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_link: Option<LinkStatus> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("run: shutdown requested");
                break;
            }
            readable = radio.mesh.readable() => {
                if let Err(e) = readable {
                    warn!("mesh: socket error: {:#}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                let now = Instant::now();
                let mut eng = lock(&engine);
                drain_inbound(&mut eng, now, &mut radio);
            }
            _ = poll_tick.tick() => {
                let now = Instant::now();
                let mut eng = lock(&engine);
                let summary = eng.poll(now, &mut radio, &inputs);
                if let Some(FrameOutcome::Rejected(r)) = &summary.frame {
                    debug!("mesh: dropped frame: {}", r);
                }
                if let Some(report) = &summary.report {
                    info!(
                        seq = report.packet.sequence,
                        path = ?report.path,
                        sent = report.sent,
                        "report: tick"
                    );
                }
                drain_inbound(&mut eng, now, &mut radio);

                let link = eng.link_status(now, &radio);
                if last_link != Some(link) {
                    let led = link.indicator();
                    info!(link = ?link, led = ?led.color, blink = ?led.blink, "link: status changed");
                    last_link = Some(link);
                }
            }
            _ = status_tick.tick() => {
                if let Some(path) = &cfg.status.path {
                    let json = {
                        let eng = lock(&engine);
                        status_json(&eng, Instant::now(), &radio, &inputs)?
                    };
                    if let Err(e) = write_status(path, &json).await {
                        warn!("status: write {} failed: {:#}", path, e);
                    }
                }
            }
        }
    }

    let eng = lock(&engine);
    let c = eng.counters();
    info!(
        received = c.frames_received,
        relayed = c.relays_sent,
        bridged = c.bridged,
        reports = c.reports_sent,
        uptime_s = started.elapsed().as_secs(),
        "run: stopped"
    );
    Ok(())
}

/// Hands queued mesh frames to the engine, bounded per call so a chatty
/// neighbour cannot starve the report timer. Returns frames handled.
fn drain_inbound(eng: &mut MeshEngine, now: Instant, radio: &mut NodeRadio) -> usize {
    let mut handled = 0;
    while handled < MAX_FRAMES_PER_DRAIN {
        match radio.poll_receive() {
            Some(frame) => {
                eng.handle_frame(&frame, now, radio);
                handled += 1;
            }
            None => break,
        }
    }
    handled
}

/// What `run` writes to `[status] path`.
#[derive(Debug, serde::Serialize)]
struct NodeStatus {
    #[serde(flatten)]
    engine: StatusSnapshot,
    uplink: Option<UplinkStatus>,
}

fn status_json(eng: &MeshEngine, now: Instant, radio: &NodeRadio, inputs: &NavInputs) -> Result<Vec<u8>> {
    let status = NodeStatus {
        engine: eng.status_snapshot(now, radio, inputs),
        uplink: radio.wan.as_ref().map(|w| w.status()),
    };
    Ok(serde_json::to_vec_pretty(&status)?)
}

/// Writes via a temp file so `boatnode status` never sees a torn snapshot.
async fn write_status(path: &str, json: &[u8]) -> Result<()> {
    let tmp = format!("{}.tmp", path);
    tokio::fs::write(&tmp, json).await.with_context(|| format!("write {}", tmp))?;
    tokio::fs::rename(&tmp, path).await.with_context(|| format!("rename {}", tmp))?;
    Ok(())
}

fn decode_hex(s: &str) -> Result<std::result::Result<ReportPacket, Rejected>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    let bytes = hex::decode(&cleaned).context("frame is not valid hex")?;
    Ok(ReportPacket::decode(&bytes))
}

fn decode(s: &str) -> Result<()> {
    match decode_hex(s)? {
        Ok(p) => {
            println!("origin={} seq={} hops={}", p.origin_id, p.sequence, p.hop_count);
            println!("lat={:.7} lon={:.7}", p.latitude(), p.longitude());
            println!("speed={:.2} m/s heading={:.2} deg", p.speed_cms as f64 / 100.0, p.heading_cdeg as f64 / 100.0);
            println!("battery={}%", p.battery_pct);
            Ok(())
        }
        Err(r) => anyhow::bail!("rejected: {}", r),
    }
}

fn status(cfg: &Config) -> Result<()> {
    let path = cfg.status.path.as_deref().context("status.path not configured")?;
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    let v: serde_json::Value = serde_json::from_str(&s).context("parse status json")?;
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_parses() {
        let cfg = parse_config(include_str!("../../../config/boatnode.example.toml")).unwrap();
        assert_eq!(cfg.node.origin_id, 0x0A11);
        assert_eq!(cfg.engine.hop_budget, 4);
        assert_eq!(cfg.gnss.source, "serial");
        assert!(cfg.uplink.enable);
        assert!(mesh_doctor::check_engine(&cfg.engine).is_ok());
        assert!(uplink_doctor::check_endpoint(&cfg.uplink).is_ok());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg = parse_config(
            r#"
            [node]
            origin_id = 7

            [mesh_radio]
            bind = "0.0.0.0:4700"
            peers = []

            [gnss]
            source = "static"
            static_lat = 13.08
            static_lon = 80.27
            min_sats = 4
            max_fix_age_s = 5
            "#,
        )
        .unwrap();
        assert!(cfg.node.reporting);
        assert_eq!(cfg.engine.report_interval_s, 120);
        assert!(!cfg.uplink.enable);
        assert_eq!(cfg.battery.source, "fixed");
        assert!(cfg.status.path.is_none());
    }

    fn report(origin_id: u16, sequence: u16) -> ReportPacket {
        ReportPacket {
            origin_id,
            sequence,
            latitude_e7: 130_800_000,
            longitude_e7: 802_700_000,
            speed_cms: 120,
            heading_cdeg: 4_500,
            battery_pct: 90,
            hop_count: 0,
        }
    }

    #[tokio::test]
    async fn inbound_frames_reach_engine_and_status_json() {
        use boat_mesh::jitter::FixedJitter;
        use boat_mesh::Path;
        use boat_nav::battery::BatteryGauge;

        let node = UdpMeshRadio::bind("127.0.0.1:0", &[], false).await.unwrap();
        let node_addr = node.local_addr().unwrap().to_string();
        let neighbour = UdpMeshRadio::bind("127.0.0.1:0", &[node_addr], false).await.unwrap();
        let mut tx = NodeRadio { mesh: neighbour, wan: None };
        let mut rx = NodeRadio { mesh: node, wan: None };

        let t0 = Instant::now();
        let mut eng = MeshEngine::new(
            &EngineConfig::default(),
            Identity { origin_id: 1, initial_sequence: 0 },
            t0,
            Box::new(FixedJitter(Duration::from_millis(300))),
        );
        for seq in 1..=3 {
            assert!(tx.try_transmit(Path::Mesh, &report(7, seq).encode()));
        }

        let mut handled = 0;
        for _ in 0..50 {
            rx.mesh.readable().await.unwrap();
            handled += drain_inbound(&mut eng, t0, &mut rx);
            if handled >= 3 {
                break;
            }
        }
        assert_eq!(handled, 3);
        assert_eq!(eng.counters().frames_received, 3);

        let inputs = NavInputs::new(Arc::new(Mutex::new(None)), BatteryGauge::Fixed(64), Duration::from_secs(5));
        let json: serde_json::Value = serde_json::from_slice(&status_json(&eng, t0, &rx, &inputs).unwrap()).unwrap();
        assert_eq!(json["origin_id"], 1);
        assert_eq!(json["battery"], 64);
        assert_eq!(json["counters"]["frames_received"], 3);
        assert_eq!(json["nearby"][0]["origin_id"], 7);
        assert!(json["uplink"].is_null());

        // nothing listens on port 9 of the loopback
        let cfg = UplinkCfg { enable: true, endpoint: "tcp://127.0.0.1:9".into(), ..UplinkCfg::default() };
        rx.wan = Some(WanUplink::spawn(&cfg).unwrap());
        let json: serde_json::Value = serde_json::from_slice(&status_json(&eng, t0, &rx, &inputs).unwrap()).unwrap();
        assert_eq!(json["uplink"]["joined"], false);
        assert_eq!(json["uplink"]["frames_sent"], 0);
        assert_eq!(json["wan_joined"], false);
    }

    #[test]
    fn every_subcommand_has_help() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        cmd.clone().debug_assert();
        for sub in cmd.get_subcommands() {
            assert!(sub.get_about().is_some(), "{} has no help text", sub.get_name());
        }
    }

    #[test]
    fn decode_accepts_spaced_hex() {
        let p = ReportPacket {
            origin_id: 0x0A11,
            sequence: 3,
            latitude_e7: 130_800_000,
            longitude_e7: 802_700_000,
            speed_cms: 250,
            heading_cdeg: 9_000,
            battery_pct: 88,
            hop_count: 1,
        };
        let hex_str = hex::encode(p.encode());
        let spaced: String = hex_str.as_bytes().chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(decode_hex(&spaced).unwrap().unwrap(), p);
        assert!(decode_hex("zz").is_err());
        assert!(matches!(decode_hex("0011").unwrap(), Err(Rejected::Length { got: 2 })));
    }
}
