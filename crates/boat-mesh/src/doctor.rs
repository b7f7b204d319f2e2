use anyhow::Result;

use crate::{EngineConfig, Identity};

pub fn check_engine(cfg: &EngineConfig) -> Result<()> {
    anyhow::ensure!(cfg.hop_budget >= 1 && cfg.hop_budget <= 8, "engine.hop_budget should be 1..8");
    anyhow::ensure!(
        cfg.rebroadcast_jitter_min_ms < cfg.rebroadcast_jitter_max_ms,
        "engine.rebroadcast_jitter_min_ms must be below rebroadcast_jitter_max_ms"
    );
    anyhow::ensure!(cfg.rebroadcast_jitter_min_ms > 0, "engine.rebroadcast_jitter_min_ms must be > 0 (collision avoidance)");
    anyhow::ensure!(cfg.bridge_min_interval_ms >= 500, "engine.bridge_min_interval_ms too small; uplink airtime is scarce");
    anyhow::ensure!(cfg.report_interval_s >= 10, "engine.report_interval_s too small");
    anyhow::ensure!(cfg.report_interval_s <= 86_400, "engine.report_interval_s should be at most one day");
    anyhow::ensure!(cfg.mesh_stale_s <= 7 * 86_400, "engine.mesh_stale_s should be at most one week");
    anyhow::ensure!(cfg.rebroadcast_jitter_max_ms <= 60_000, "engine.rebroadcast_jitter_max_ms should be at most 60000");
    anyhow::ensure!(cfg.bridge_min_interval_ms <= 3_600_000, "engine.bridge_min_interval_ms should be at most one hour");
    anyhow::ensure!(
        cfg.paused_recheck_s >= 1 && cfg.paused_recheck_s <= 3_600,
        "engine.paused_recheck_s should be 1..3600"
    );
    anyhow::ensure!(cfg.report_jitter_s < cfg.report_interval_s, "engine.report_jitter_s must be below report_interval_s");
    anyhow::ensure!(
        cfg.mesh_stale_s > cfg.report_interval_s,
        "engine.mesh_stale_s should exceed report_interval_s or the mesh always looks dead"
    );
    anyhow::ensure!(cfg.max_pending_rebroadcasts >= 1, "engine.max_pending_rebroadcasts must be >= 1");
    Ok(())
}

pub fn check_identity(id: &Identity) -> Result<()> {
    anyhow::ensure!(id.origin_id != 0, "node.origin_id 0 means unpaired; provision the node first");
    Ok(())
}
