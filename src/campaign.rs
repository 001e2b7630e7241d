//! Campaign Layer
//!
//! A campaign starts a probe engine, consumes its events until a termination
//! condition or operator interrupt, and prints ping-style reply lines plus a
//! final statistics block.
//!
//! # Termination policies
//!
//! - [`TerminationPolicy::BoundedCycles`]: one probe per cycle, replies are
//!   reported at each cycle boundary and the run ends after `count` cycles.
//! - [`TerminationPolicy::TrainCapture`]: trains of probes, replies are
//!   reported as they arrive and exported by sequence number at the end.
//!
//! # Example
//!
//! ```rust,no_run
//! use trainping::{CampaignConfig, CampaignController, IcmpConfig, IcmpEngine, SignalGuard};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CampaignConfig::new("192.0.2.1").with_count(5);
//! let target = "192.0.2.1".parse()?;
//! let engine = IcmpEngine::new(IcmpConfig::from_campaign(&config, target));
//! let mut controller = CampaignController::new(&config, target, engine, std::io::stdout());
//! let report = controller.run(SignalGuard::install()?).await?;
//! println!("received {}", report.received);
//! # Ok(())
//! # }
//! ```

mod controller;
mod policy;
mod report;

pub use controller::{CampaignController, CampaignError, CampaignState};
pub use policy::TerminationPolicy;
pub use report::{CampaignReport, ElapsedUnit, TerminationReason};
