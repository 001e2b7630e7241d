//! Campaign controller.
//!
//! Single-task event loop that multiplexes operator interrupts and engine
//! events (replies, cycle boundaries, completion) and enforces the selected
//! termination policy. Exactly one event is handled at a time, so the
//! tracker, statistics and sequence table are owned without locking.

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::campaign::policy::{PolicyState, TerminationPolicy, capture_complete};
use crate::campaign::report::{CampaignReport, ElapsedUnit, TerminationReason};
use crate::config::CampaignConfig;
use crate::engine::{EngineError, EngineEvent, EngineEvents, ProbeEngine, Reply, duration_ms};
use crate::export::{ExportError, SequenceExport};
use crate::signal::Interrupt;
use crate::stats::StatsAggregator;

/// TTL shown in reply lines.
const DISPLAY_TTL: u8 = 128;

/// ICMP echo header length added to the payload in reply lines.
const ICMP_HEADER_LEN: usize = 8;

/// IPv4 plus ICMP header length shown in the banner.
const IP_ICMP_HEADER_LEN: usize = 28;

/// Errors that abort a campaign.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// The engine could not be started.
    #[error("failed to start probe engine: {0}")]
    Engine(#[from] EngineError),

    /// The sequence export could not be written.
    #[error("sequence export failed: {0}")]
    Export(#[from] ExportError),

    /// Writing the report output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// `run()` was called on a controller that already ran.
    #[error("campaign already ran")]
    AlreadyRan,
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CampaignState {
    Starting,
    Running,
    Draining,
    Terminated,
}

/// Drives one measurement campaign against a single target.
pub struct CampaignController<E, W> {
    host: String,
    target: IpAddr,
    engine: E,
    out: W,
    export_path: PathBuf,
    policy: TerminationPolicy,
    state: CampaignState,
    counters: PolicyState,
    stats: StatsAggregator,
    unreachable: u64,
}

impl<E: ProbeEngine, W: Write> CampaignController<E, W> {
    /// Create a controller for `target` (resolved from `config.host`).
    ///
    /// Report lines are written to `out`.
    pub fn new(config: &CampaignConfig, target: IpAddr, engine: E, out: W) -> Self {
        let policy = TerminationPolicy::from_config(config);
        Self {
            host: config.host.clone(),
            target,
            engine,
            out,
            export_path: config.export_path.clone(),
            policy,
            state: CampaignState::Starting,
            counters: PolicyState::new(policy, target),
            stats: StatsAggregator::new(),
            unreachable: 0,
        }
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Captured sequence table (train capture only).
    pub fn export(&self) -> Option<&SequenceExport> {
        self.counters.export()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run the campaign to completion.
    ///
    /// `interrupt` is held only for the duration of the run and released
    /// before the engine is stopped, on every exit path. A train capture
    /// flushes its sequence export on every exit path too; the first error
    /// encountered is returned.
    pub async fn run<I: Interrupt>(
        &mut self,
        mut interrupt: I,
    ) -> Result<CampaignReport, CampaignError> {
        if self.state != CampaignState::Starting {
            return Err(CampaignError::AlreadyRan);
        }

        let mut events = self.engine.start()?;
        let started = Instant::now();

        let result = self.drive(&mut events, &mut interrupt).await;

        drop(interrupt);
        self.transition(CampaignState::Draining);
        self.engine.stop();
        let elapsed = started.elapsed();

        let finished = match result {
            Ok(reason) => self.finish(reason, elapsed),
            Err(e) => Err(e),
        };
        let exported = self.flush_export();
        self.transition(CampaignState::Terminated);

        let report = finished?;
        exported?;
        Ok(report)
    }

    async fn drive<I: Interrupt>(
        &mut self,
        events: &mut EngineEvents,
        interrupt: &mut I,
    ) -> Result<TerminationReason, CampaignError> {
        let size = self.engine.payload_size();
        writeln!(
            self.out,
            "PING {} ({}) {}({}) bytes of data",
            self.host,
            self.target,
            size,
            size + IP_ICMP_HEADER_LEN
        )?;
        self.transition(CampaignState::Running);

        loop {
            if self.counters.cycles_exhausted() {
                return Ok(TerminationReason::PolicySatisfied);
            }

            let event = tokio::select! {
                biased;
                _ = interrupt.wait() => {
                    if !self.policy.captures_sequences() {
                        writeln!(self.out, "get interrupted")?;
                    }
                    return Ok(TerminationReason::Interrupted);
                }
                event = events.recv() => event.unwrap_or(EngineEvent::Done(None)),
            };

            let reason = match event {
                EngineEvent::Reply(reply) => self.on_reply(reply)?,
                EngineEvent::Idle => self.on_idle()?,
                EngineEvent::Done(None) => Some(TerminationReason::EngineCompleted),
                EngineEvent::Done(Some(e)) => {
                    writeln!(self.out, "Ping failed: {e}")?;
                    tracing::warn!(host = %self.host, error = %e, "Probe engine failed");
                    Some(TerminationReason::EngineFailed(e.to_string()))
                }
            };

            if let Some(reason) = reason {
                return Ok(reason);
            }
        }
    }

    fn on_reply(&mut self, reply: Reply) -> Result<Option<TerminationReason>, CampaignError> {
        let rtt_ms = reply.rtt_ms();
        self.stats.add_sample(rtt_ms);

        match &mut self.counters {
            PolicyState::Bounded {
                received, tracker, ..
            } => {
                *received += 1;
                if !tracker.record_reply(reply.addr, reply) {
                    tracing::debug!(addr = %reply.addr, "Ignoring reply from unknown address");
                }
                Ok(None)
            }
            PolicyState::Capture {
                count,
                train_size,
                received,
                crec,
                export,
                ..
            } => {
                *received += 1;
                *crec += 1;
                export.record(reply.sequence, rtt_ms);

                let (count, train_size, received) = (*count, *train_size, *received);
                self.write_reply_line(reply.addr, reply.sequence, reply.rtt)?;

                if capture_complete(self.engine.transmitted(), received, count, train_size) {
                    writeln!(self.out)?;
                    return Ok(Some(TerminationReason::PolicySatisfied));
                }
                Ok(None)
            }
        }
    }

    fn on_idle(&mut self) -> Result<Option<TerminationReason>, CampaignError> {
        match &mut self.counters {
            PolicyState::Bounded { sent, tracker, .. } => {
                let observed = tracker.drain_cycle();
                *sent += observed.len() as u64;

                for (target, reply) in observed {
                    match reply {
                        Some(r) => self.write_reply_line(target, r.sequence + 1, r.rtt)?,
                        None => self.write_unreachable(&target.to_string())?,
                    }
                }
                Ok(None)
            }
            PolicyState::Capture {
                count,
                train_size,
                sent,
                received,
                crec,
                ..
            } => {
                if capture_complete(self.engine.transmitted(), *received, *count, *train_size) {
                    return Ok(Some(TerminationReason::PolicySatisfied));
                }

                *sent += *train_size;
                let silent = *crec == 0;
                *crec = 0;

                if silent {
                    let host = self.host.clone();
                    self.write_unreachable(&host)?;
                }
                Ok(None)
            }
        }
    }

    fn write_reply_line(
        &mut self,
        addr: IpAddr,
        icmp_seq: u64,
        rtt: Duration,
    ) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{} bytes from {}: icmp_seq={} ttl={} time={:.2} ms",
            self.engine.payload_size() + ICMP_HEADER_LEN,
            addr,
            icmp_seq,
            DISPLAY_TTL,
            duration_ms(rtt)
        )
    }

    fn write_unreachable(&mut self, target: &str) -> std::io::Result<()> {
        self.unreachable += 1;
        writeln!(self.out, "{target} : unreachable")
    }

    fn finish(
        &mut self,
        reason: TerminationReason,
        elapsed: Duration,
    ) -> Result<CampaignReport, CampaignError> {
        let (transmitted, elapsed_unit) = match self.policy {
            TerminationPolicy::BoundedCycles { .. } => (self.counters.sent(), ElapsedUnit::Millis),
            TerminationPolicy::TrainCapture { .. } => {
                (self.engine.transmitted(), ElapsedUnit::Secs)
            }
        };

        let report = CampaignReport {
            host: self.host.clone(),
            transmitted,
            received: self.counters.received(),
            elapsed,
            elapsed_unit,
            unreachable: self.unreachable,
            summary: self.stats.summarize(),
            reason,
        };
        report.write_to(&mut self.out)?;
        self.out.flush()?;

        tracing::info!(
            host = %self.host,
            transmitted = report.transmitted,
            received = report.received,
            reason = ?report.reason,
            "Campaign finished"
        );

        Ok(report)
    }

    fn flush_export(&self) -> Result<(), CampaignError> {
        if let Some(export) = self.counters.export() {
            export.flush(&self.export_path)?;
        }
        Ok(())
    }

    fn transition(&mut self, next: CampaignState) {
        tracing::debug!(from = %self.state, to = %next, "Campaign state change");
        self.state = next;
    }
}

impl<E: std::fmt::Debug, W> std::fmt::Debug for CampaignController<E, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignController")
            .field("host", &self.host)
            .field("target", &self.target)
            .field("engine", &self.engine)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
