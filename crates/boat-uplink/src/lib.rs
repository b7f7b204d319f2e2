pub mod doctor;
pub mod framing;

use anyhow::{Context, Result};
use bytes::Bytes;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct UplinkCfg {
    pub enable: bool,
    /// tls://host:port, or tcp://host:port on the bench
    pub endpoint: String,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_max_backoff_s")]
    pub max_backoff_s: u64,
}

fn default_queue_depth() -> usize { 8 }
fn default_max_backoff_s() -> u64 { 300 }

impl Default for UplinkCfg {
    fn default() -> Self {
        Self {
            enable: false,
            endpoint: String::new(),
            queue_depth: default_queue_depth(),
            max_backoff_s: default_max_backoff_s(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub tls: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(s: &str) -> Result<Self> {
        let (tls, rest) = if let Some(r) = s.strip_prefix("tls://") {
            (true, r)
        } else if let Some(r) = s.strip_prefix("tcp://") {
            (false, r)
        } else {
            anyhow::bail!("endpoint must start with tls:// or tcp://: {}", s);
        };
        let (host, port) = rest.rsplit_once(':').context("endpoint missing port")?;
        anyhow::ensure!(!host.is_empty(), "endpoint missing host");
        let port = port.parse().with_context(|| format!("bad endpoint port {}", port))?;
        Ok(Self { tls, host: host.to_string(), port })
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LinkHealth {
    pub rtt_ms: Option<u32>,
    pub consecutive_failures: u32,
    pub connected_since: Option<time::OffsetDateTime>,
    pub frames_sent: u64,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self {
            rtt_ms: None,
            consecutive_failures: 0,
            connected_since: None,
            frames_sent: 0,
        }
    }
}

impl LinkHealth {
    /// Exponential backoff after consecutive failures: 1s, 2s, 4s ... capped.
    pub fn backoff(&self, cap: Duration) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::from_secs(1).min(cap);
        }
        let secs = 1u64 << self.consecutive_failures.min(16);
        Duration::from_secs(secs).min(cap)
    }
}

/// Uplink view for the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UplinkStatus {
    pub joined: bool,
    pub connected_since_unix_s: Option<i64>,
    pub rtt_ms: Option<u32>,
    pub consecutive_failures: u32,
    pub frames_sent: u64,
}

impl UplinkStatus {
    pub fn from_health(health: &LinkHealth, joined: bool) -> Self {
        Self {
            joined,
            connected_since_unix_s: health.connected_since.map(|t| t.unix_timestamp()),
            rtt_ms: health.rtt_ms,
            consecutive_failures: health.consecutive_failures,
            frames_sent: health.frames_sent,
        }
    }
}

trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

/// Wide-area uplink to the shore gateway.
///
/// A background task owns the connection and reconnects with backoff.
/// `is_joined` and `try_send` never block, so the mesh engine can call them
/// while holding its lock.
pub struct WanUplink {
    tx: mpsc::Sender<Bytes>,
    joined: Arc<AtomicBool>,
    health: Arc<Mutex<LinkHealth>>,
}

impl WanUplink {
    /// Must be called from inside a tokio runtime.
    pub fn spawn(cfg: &UplinkCfg) -> Result<Self> {
        let endpoint = Endpoint::parse(&cfg.endpoint)?;
        let tls = if endpoint.tls { Some(tls_connector()) } else { None };
        let (tx, rx) = mpsc::channel(cfg.queue_depth.max(1));
        let joined = Arc::new(AtomicBool::new(false));
        let health = Arc::new(Mutex::new(LinkHealth::default()));

        let worker = Worker {
            endpoint,
            tls,
            rx,
            joined: joined.clone(),
            health: health.clone(),
            max_backoff: Duration::from_secs(cfg.max_backoff_s.max(1)),
        };
        tokio::spawn(worker.run());

        Ok(Self { tx, joined, health })
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }

    /// Queues one frame. Returns false when not joined or the queue is full.
    pub fn try_send(&self, frame: &[u8]) -> bool {
        if !self.is_joined() {
            return false;
        }
        match self.tx.try_send(Bytes::copy_from_slice(frame)) {
            Ok(()) => true,
            Err(e) => {
                debug!("uplink: queue refused frame: {}", e);
                false
            }
        }
    }

    pub fn status(&self) -> UplinkStatus {
        let joined = self.is_joined();
        match self.health.lock() {
            Ok(h) => UplinkStatus::from_health(&h, joined),
            Err(poisoned) => UplinkStatus::from_health(&poisoned.into_inner(), joined),
        }
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let cfg = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    TlsConnector::from(Arc::new(cfg))
}

struct Worker {
    endpoint: Endpoint,
    tls: Option<TlsConnector>,
    rx: mpsc::Receiver<Bytes>,
    joined: Arc<AtomicBool>,
    health: Arc<Mutex<LinkHealth>>,
    max_backoff: Duration,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let start = std::time::Instant::now();
            match tokio::time::timeout(CONNECT_TIMEOUT, self.connect()).await {
                Ok(Ok(conn)) => {
                    let rtt = start.elapsed().as_millis() as u32;
                    self.update(|h| {
                        h.rtt_ms = Some(rtt);
                        h.consecutive_failures = 0;
                        h.connected_since = Some(time::OffsetDateTime::now_utc());
                    });
                    self.joined.store(true, Ordering::Release);
                    info!("uplink: joined {} (connect {}ms)", self.endpoint.addr(), rtt);

                    let res = self.session(conn).await;
                    self.joined.store(false, Ordering::Release);
                    self.update(|h| h.connected_since = None);
                    match res {
                        Ok(()) => {
                            debug!("uplink: all handles dropped, stopping");
                            return;
                        }
                        Err(e) => warn!("uplink: link lost: {:#}", e),
                    }
                }
                Ok(Err(e)) => {
                    self.update(|h| h.consecutive_failures += 1);
                    warn!("uplink: connect to {} failed: {:#}", self.endpoint.addr(), e);
                }
                Err(_) => {
                    self.update(|h| h.consecutive_failures += 1);
                    warn!("uplink: connect to {} timed out", self.endpoint.addr());
                }
            }

            let wait = self.health_snapshot().backoff(self.max_backoff);
            debug!("uplink: retry in {:?}", wait);
            let sleep = tokio::time::sleep(wait);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    msg = self.rx.recv() => match msg {
                        // frame queued just before the link dropped
                        Some(_) => trace!("uplink: dropping frame while not joined"),
                        None => return,
                    },
                }
            }
        }
    }

    async fn connect(&self) -> Result<Box<dyn Conn>> {
        let tcp = TcpStream::connect(self.endpoint.addr()).await.context("tcp connect")?;
        tcp.set_nodelay(true).ok();
        match &self.tls {
            Some(tls) => {
                let name = ServerName::try_from(self.endpoint.host.clone()).context("server name")?;
                let stream = tls.connect(name, tcp).await.context("tls handshake")?;
                Ok(Box::new(stream))
            }
            None => Ok(Box::new(tcp)),
        }
    }

    /// Ok(()) when every sender is gone, Err when the link broke.
    async fn session(&mut self, conn: Box<dyn Conn>) -> Result<()> {
        let (mut rd, mut wr) = tokio::io::split(conn);
        let mut scratch = [0u8; 64];
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(blob) => {
                        framing::write_frame(&mut wr, &blob).await?;
                        trace!("uplink: sent {}", hex::encode(&blob));
                        self.update(|h| h.frames_sent += 1);
                    }
                    None => return Ok(()),
                },
                n = rd.read(&mut scratch) => {
                    // the gateway does not talk back; only EOF matters
                    if n.context("read")? == 0 {
                        anyhow::bail!("gateway closed the connection");
                    }
                }
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut LinkHealth)) {
        match self.health.lock() {
            Ok(mut h) => f(&mut *h),
            Err(poisoned) => {
                let mut h = poisoned.into_inner();
                f(&mut *h)
            }
        }
    }

    fn health_snapshot(&self) -> LinkHealth {
        match self.health.lock() {
            Ok(h) => h.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
