//! Final campaign report.

use std::io::Write;
use std::time::Duration;

use crate::stats::Summary;

/// Why a campaign stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Operator interrupt (SIGINT/SIGTERM).
    Interrupted,
    /// The termination policy was satisfied.
    PolicySatisfied,
    /// The engine finished on its own without a failure cause.
    EngineCompleted,
    /// The engine finished with a failure cause.
    EngineFailed(String),
}

/// Unit used for the elapsed time in the report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedUnit {
    Millis,
    Secs,
}

/// Statistics printed at the end of a campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignReport {
    pub host: String,
    pub transmitted: u64,
    pub received: u64,
    pub elapsed: Duration,
    pub elapsed_unit: ElapsedUnit,
    /// Number of unreachable lines printed during the run.
    pub unreachable: u64,
    pub summary: Option<Summary>,
    pub reason: TerminationReason,
}

impl CampaignReport {
    /// Lost fraction of transmitted probes.
    ///
    /// This is a fraction in `[0, 1]` even though the report labels it with
    /// `%`; the value is not scaled by 100. Zero transmitted yields NaN.
    pub fn loss_fraction(&self) -> f64 {
        (self.transmitted as f64 - self.received as f64) / self.transmitted as f64
    }

    fn elapsed_display(&self) -> String {
        match self.elapsed_unit {
            ElapsedUnit::Millis => format!("{} ms", self.elapsed.as_millis()),
            ElapsedUnit::Secs => format!("{} secs", self.elapsed.as_secs()),
        }
    }

    /// Write the ping-style statistics block.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "--- {} ping statistics ---", self.host)?;
        writeln!(
            out,
            "{} packets transmitted, {} received, {:.2}% packet loss, time {}",
            self.transmitted,
            self.received,
            self.loss_fraction(),
            self.elapsed_display()
        )?;
        if let Some(s) = &self.summary {
            writeln!(
                out,
                "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
                s.min, s.mean, s.max, s.mdev
            )?;
        }
        Ok(())
    }
}
