//! Core probe engine traits and types.

use std::net::IpAddr;
use std::time::Duration;

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a probe engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to open the echo socket.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Transmission failed while the engine was running.
    #[error("transport error: {0}")]
    Transport(String),

    /// `start()` was called on an engine that is already running.
    #[error("engine already started")]
    AlreadyStarted,
}

/// Transport used to carry echo probes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Transport {
    /// Privileged raw ICMP socket.
    #[default]
    Raw,
    /// Unprivileged datagram-oriented ICMP socket.
    Datagram,
}

/// A single echo reply delivered by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reply {
    /// Address the echo reply came from.
    pub addr: IpAddr,
    /// Measured round-trip time.
    pub rtt: Duration,
    /// Sequence number of the probe this reply answers.
    pub sequence: u64,
}

impl Reply {
    pub fn new(addr: IpAddr, rtt: Duration, sequence: u64) -> Self {
        Self {
            addr,
            rtt,
            sequence,
        }
    }

    /// RTT in fractional milliseconds.
    pub fn rtt_ms(&self) -> f64 {
        duration_ms(self.rtt)
    }
}

/// Convert a duration to fractional milliseconds.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Events produced by a running engine, in the order the engine produced them.
#[derive(Debug)]
pub enum EngineEvent {
    /// An echo reply arrived.
    Reply(Reply),
    /// A train (or single-probe cycle) boundary passed.
    Idle,
    /// The engine terminated on its own, optionally with a failure cause.
    Done(Option<EngineError>),
}

/// Receiving half of the engine event stream.
///
/// A closed channel is treated as `EngineEvent::Done(None)`.
pub type EngineEvents = mpsc::Receiver<EngineEvent>;

/// Capacity of the event channel between an engine and its reader.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Create an event channel with the default capacity.
pub fn event_channel() -> (mpsc::Sender<EngineEvent>, EngineEvents) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Probe engine consumed by the campaign controller.
///
/// The engine owns all transmission, timing and socket I/O. The controller
/// only starts it, reads its event stream and stops it.
///
/// # Contract
///
/// - `start()` is non-blocking and returns the event stream.
/// - Each received echo produces at most one `Reply` event.
/// - One `Idle` event is produced per completed cycle, answered or not.
/// - `stop()` is idempotent and safe after completion or interrupt.
pub trait ProbeEngine: Send {
    /// Begin transmitting probes.
    fn start(&mut self) -> Result<EngineEvents, EngineError>;

    /// Total number of probes transmitted so far.
    fn transmitted(&self) -> u64;

    /// Nominal payload size in bytes.
    fn payload_size(&self) -> usize;

    /// Release engine resources.
    fn stop(&mut self);
}
