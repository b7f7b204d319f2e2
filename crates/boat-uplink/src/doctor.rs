use anyhow::Result;
use crate::{Endpoint, UplinkCfg};

pub fn check_endpoint(cfg: &UplinkCfg) -> Result<()> {
    if !cfg.enable {
        return Ok(());
    }
    let ep = Endpoint::parse(&cfg.endpoint)?;
    if !ep.tls {
        tracing::warn!("uplink.endpoint {} is plaintext; use tls:// outside the bench", cfg.endpoint);
    }
    anyhow::ensure!(cfg.queue_depth >= 1 && cfg.queue_depth <= 256, "uplink.queue_depth should be 1..256");
    anyhow::ensure!(cfg.max_backoff_s >= 1, "uplink.max_backoff_s must be >= 1");
    Ok(())
}
