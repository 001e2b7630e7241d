//! Probe Engine Layer
//!
//! The engine owns transmission, train timing and socket I/O. It reports what
//! it observes on a single ordered event channel consumed by the campaign
//! controller.
//!
//! # Architecture
//!
//! - [`ProbeEngine`]: Contract the controller drives (start, counters, stop)
//! - [`EngineEvent`]: Reply, idle (cycle boundary) and completion events
//! - [`icmp::IcmpEngine`]: ICMP echo implementation

pub mod icmp;
mod traits;

pub use traits::{
    EVENT_CHANNEL_CAPACITY, EngineError, EngineEvent, EngineEvents, ProbeEngine, Reply, Transport,
    duration_ms, event_channel,
};
