//! ICMP echo probe engine.
//!
//! Sends trains of echo requests to one target and reports replies and
//! cycle boundaries on the engine event channel.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence, SurgeError};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::CampaignConfig;
use crate::engine::{
    EngineError, EngineEvent, EngineEvents, ProbeEngine, Reply, Transport, event_channel,
};

/// Payload size used when no size pattern is configured.
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Engine settings for one target.
#[derive(Debug, Clone)]
pub struct IcmpConfig {
    /// Target address.
    pub target: IpAddr,
    /// Optional source address to bind.
    pub source: Option<IpAddr>,
    /// Socket flavour.
    pub transport: Transport,
    /// Probes per cycle.
    pub train_size: u32,
    /// Spacing between probes of one train.
    pub train_interval: Duration,
    /// Gap between cycles when no jitter or rate is set.
    pub interval: Duration,
    /// Uniform jitter bound on the cycle gap.
    pub jitter: Duration,
    /// Average cycles per minute; 0 keeps fixed spacing.
    pub rate: f64,
    /// Payload sizes cycled across probes.
    pub pattern: Vec<usize>,
}

impl IcmpConfig {
    /// Create engine settings for `target` with a single probe per cycle.
    pub fn new(target: IpAddr) -> Self {
        Self::from_campaign(&CampaignConfig::default(), target)
    }

    /// Derive engine settings from a campaign configuration.
    pub fn from_campaign(config: &CampaignConfig, target: IpAddr) -> Self {
        Self {
            target,
            source: config.source,
            transport: config.transport,
            train_size: config.train_size.max(1),
            train_interval: config.train_interval,
            interval: config.interval,
            jitter: config.jitter,
            rate: config.rate,
            pattern: config.pattern.clone(),
        }
    }

    /// Payload size for the probe with the given sequence number.
    pub fn size_for(&self, sequence: u64) -> usize {
        if self.pattern.is_empty() {
            DEFAULT_PAYLOAD_SIZE
        } else {
            self.pattern[(sequence % self.pattern.len() as u64) as usize]
        }
    }

    /// Draw the gap to wait after a train before the cycle boundary.
    ///
    /// With a rate set, gaps are exponential with mean `60s / rate`.
    /// Otherwise the interval is offset by uniform jitter in `[-jitter, +jitter]`.
    pub fn cycle_gap<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.rate > 0.0 {
            let mean = 60.0 / self.rate;
            let u: f64 = rng.random();
            return Duration::from_secs_f64(-(1.0 - u).ln() * mean);
        }

        if self.jitter.is_zero() {
            return self.interval;
        }

        let bound = self.jitter.as_secs_f64();
        let offset = rng.random_range(-bound..=bound);
        Duration::from_secs_f64((self.interval.as_secs_f64() + offset).max(0.0))
    }

    /// Reply deadline for the `index`-th echo of a train followed by `gap`.
    ///
    /// Equals the time left until the cycle's `Idle`, so a reply is either
    /// reported within its own cycle or counted as lost.
    pub fn reply_deadline(&self, index: u32, gap: Duration) -> Duration {
        let remaining = self.train_size.saturating_sub(index + 1);
        self.train_interval * remaining + gap
    }

    fn socket_config(&self) -> Config {
        let mut builder = Config::builder().sock_type_hint(match self.transport {
            Transport::Raw => socket2::Type::RAW,
            Transport::Datagram => socket2::Type::DGRAM,
        });
        if self.target.is_ipv6() {
            builder = builder.kind(ICMP::V6);
        }
        if let Some(source) = self.source {
            builder = builder.bind(SocketAddr::new(source, 0));
        }
        builder.build()
    }
}

/// Resolve hostname to IP address.
///
/// IP literals are returned as is. A `:` in the name selects an IPv6 address,
/// otherwise an IPv4 address is preferred.
pub async fn resolve_host(host: &str) -> Result<IpAddr, std::io::Error> {
    // First, try to parse as an IP address directly
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let want_v6 = host.contains(':');
    let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
    addrs
        .map(|addr| addr.ip())
        .find(|ip| ip.is_ipv6() == want_v6)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("lookup {host}: no addresses found"),
            )
        })
}

/// ICMP probe engine backed by `surge-ping`.
pub struct IcmpEngine {
    config: IcmpConfig,
    transmitted: Arc<AtomicU64>,
    driver: Option<JoinHandle<()>>,
}

impl IcmpEngine {
    pub fn new(config: IcmpConfig) -> Self {
        Self {
            config,
            transmitted: Arc::new(AtomicU64::new(0)),
            driver: None,
        }
    }
}

impl std::fmt::Debug for IcmpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpEngine")
            .field("config", &self.config)
            .field("transmitted", &self.transmitted())
            .field("running", &self.driver.is_some())
            .finish()
    }
}

impl ProbeEngine for IcmpEngine {
    fn start(&mut self) -> Result<EngineEvents, EngineError> {
        if self.driver.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let client = Client::new(&self.config.socket_config())?;
        let (tx, rx) = event_channel();

        let driver = Driver {
            client,
            config: self.config.clone(),
            ident: PingIdentifier(rand::random()),
            transmitted: Arc::clone(&self.transmitted),
            tx,
        };
        self.driver = Some(tokio::spawn(driver.run()));

        tracing::info!(
            target_addr = %self.config.target,
            transport = %self.config.transport,
            train_size = self.config.train_size,
            "Probe engine started"
        );
        Ok(rx)
    }

    fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    fn payload_size(&self) -> usize {
        self.config.size_for(0)
    }

    fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            tracing::info!(
                target_addr = %self.config.target,
                transmitted = self.transmitted(),
                "Probe engine stopped"
            );
        }
    }
}

impl Drop for IcmpEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Background task transmitting trains until aborted or failed.
struct Driver {
    client: Client,
    config: IcmpConfig,
    ident: PingIdentifier,
    transmitted: Arc<AtomicU64>,
    tx: mpsc::Sender<EngineEvent>,
}

impl Driver {
    async fn run(self) {
        // Dropping the set on abort cancels every in-flight probe.
        let mut probes = JoinSet::new();
        let mut sequence: u64 = 0;

        loop {
            let gap = self.config.cycle_gap(&mut rand::rng());

            for i in 0..self.config.train_size {
                probes.spawn(probe(
                    self.client.clone(),
                    self.config.target,
                    self.ident,
                    sequence,
                    self.config.size_for(sequence),
                    self.config.reply_deadline(i, gap),
                    self.tx.clone(),
                ));
                self.transmitted.fetch_add(1, Ordering::Relaxed);
                sequence += 1;

                if i + 1 < self.config.train_size {
                    tokio::time::sleep(self.config.train_interval).await;
                }
            }

            tokio::time::sleep(gap).await;

            while let Some(joined) = probes.try_join_next() {
                if let Ok(Err(e)) = joined {
                    tracing::warn!(
                        target_addr = %self.config.target,
                        error = %e,
                        "Probe transport failed"
                    );
                    let _ = self.tx.send(EngineEvent::Done(Some(e))).await;
                    return;
                }
            }

            if self.tx.send(EngineEvent::Idle).await.is_err() {
                tracing::debug!("Event reader dropped, driver exiting");
                return;
            }
        }
    }
}

/// Send one echo request and report its reply.
///
/// A timeout is loss, not a failure.
async fn probe(
    client: Client,
    target: IpAddr,
    ident: PingIdentifier,
    sequence: u64,
    size: usize,
    deadline: Duration,
    tx: mpsc::Sender<EngineEvent>,
) -> Result<(), EngineError> {
    let payload = vec![0u8; size];
    let mut pinger = client.pinger(target, ident).await;
    pinger.timeout(deadline);

    match pinger.ping(PingSequence(sequence as u16), &payload).await {
        Ok((packet, rtt)) => {
            let addr = match packet {
                IcmpPacket::V4(p) => IpAddr::V4(p.get_source()),
                IcmpPacket::V6(p) => IpAddr::V6(p.get_source()),
            };
            tracing::debug!(%addr, sequence, rtt_ms = rtt.as_secs_f64() * 1000.0, "Echo reply");
            let _ = tx
                .send(EngineEvent::Reply(Reply::new(addr, rtt, sequence)))
                .await;
            Ok(())
        }
        Err(SurgeError::Timeout { .. }) => {
            tracing::debug!(target_addr = %target, sequence, "Probe timed out");
            Ok(())
        }
        Err(e) => Err(EngineError::Transport(e.to_string())),
    }
}
