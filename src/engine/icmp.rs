//! ICMP echo engine for probing a target with trains of echo requests.
//!
//! - [`IcmpEngine`]: `surge-ping` backed [`ProbeEngine`](crate::engine::ProbeEngine)

mod engine;

pub use engine::{DEFAULT_PAYLOAD_SIZE, IcmpConfig, IcmpEngine, resolve_host};
