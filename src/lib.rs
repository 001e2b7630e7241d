//! trainping - latency measurement campaigns over trains of echo probes
//!
//! This crate drives repeated bursts ("trains") of ICMP echo probes toward a
//! single target, collects per-probe round-trip times, and reports aggregate
//! latency statistics plus a sequence-to-RTT export. It can be used as a
//! library, or run with the `trainping` executable.
//!
//! # Architecture
//!
//! - **Engine**: Probe transmission and timing behind the [`ProbeEngine`] trait
//! - **Campaign**: Event-loop controller enforcing a [`TerminationPolicy`]
//! - **Tracker**: Per-cycle reply bookkeeping for bounded campaigns
//! - **Stats**: RTT summary statistics
//! - **Export**: Sequence-ordered RTT file written by train captures

pub mod campaign;
pub mod config;
pub mod engine;
pub mod export;
pub mod signal;
pub mod stats;
pub mod tracker;

pub use campaign::{
    CampaignController, CampaignError, CampaignReport, CampaignState, ElapsedUnit,
    TerminationPolicy, TerminationReason,
};
pub use config::{CampaignConfig, ConfigError, parse_size_pattern};
pub use engine::icmp::{IcmpConfig, IcmpEngine, resolve_host};
pub use engine::{EngineError, EngineEvent, EngineEvents, ProbeEngine, Reply, Transport};
pub use export::{ExportError, SequenceExport};
pub use signal::{Interrupt, NoInterrupt, SignalGuard};
pub use stats::{StatsAggregator, Summary};
pub use tracker::ReplyTracker;
