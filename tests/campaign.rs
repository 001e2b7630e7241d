//! Campaign Controller Integration Tests
//!
//! Drives the controller with a scripted engine that replays a fixed event
//! sequence, and checks the printed report, statistics and export file.

use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use trainping::{
    CampaignConfig, CampaignController, CampaignError, CampaignState, ElapsedUnit, EngineError,
    EngineEvent, EngineEvents, NoInterrupt, ProbeEngine, Reply, TerminationPolicy,
    TerminationReason,
};

// =============================================================================
// Test Helpers
// =============================================================================

const HOST: &str = "target.example";
const TARGET: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
const STRANGER: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));

/// One step of an engine script.
enum Step {
    /// Reply from the target: (sequence, rtt in ms).
    Reply(u64, f64),
    /// Reply from an arbitrary address.
    ReplyFrom(IpAddr, u64, f64),
    Idle,
    Done(Option<&'static str>),
    /// Fire the operator interrupt once every earlier event was consumed.
    Interrupt,
    /// Set the transmitted counter once every earlier event was consumed.
    Transmitted(u64),
}

/// Wait until the controller has taken every queued event and handled it.
async fn drained(tx: &mpsc::Sender<EngineEvent>) {
    while tx.capacity() < tx.max_capacity() {
        tokio::task::yield_now().await;
    }
    // Let the controller finish handling the last event.
    tokio::task::yield_now().await;
}

fn reply(addr: IpAddr, sequence: u64, ms: f64) -> EngineEvent {
    EngineEvent::Reply(Reply::new(
        addr,
        Duration::from_micros((ms * 1000.0).round() as u64),
        sequence,
    ))
}

/// Engine replaying a script over the event channel.
struct ScriptedEngine {
    script: Option<Vec<Step>>,
    interrupt: Option<oneshot::Sender<()>>,
    hold_open: bool,
    transmitted: Arc<AtomicU64>,
    stops: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedEngine {
    fn new(script: Vec<Step>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let engine = Self {
            script: Some(script),
            interrupt: Some(tx),
            hold_open: true,
            transmitted: Arc::new(AtomicU64::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            task: None,
        };
        (engine, rx)
    }

    fn with_transmitted(self, n: u64) -> Self {
        self.transmitted.store(n, Ordering::Relaxed);
        self
    }

    /// Close the event channel once the script is exhausted.
    fn closing(mut self) -> Self {
        self.hold_open = false;
        self
    }

    fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }
}

impl ProbeEngine for ScriptedEngine {
    fn start(&mut self) -> Result<EngineEvents, EngineError> {
        let script = self.script.take().ok_or(EngineError::AlreadyStarted)?;
        let mut interrupt = self.interrupt.take();
        let hold_open = self.hold_open;
        let transmitted = Arc::clone(&self.transmitted);
        let (tx, rx) = mpsc::channel(64);

        self.task = Some(tokio::spawn(async move {
            for step in script {
                let event = match step {
                    Step::Reply(seq, ms) => reply(TARGET, seq, ms),
                    Step::ReplyFrom(addr, seq, ms) => reply(addr, seq, ms),
                    Step::Idle => EngineEvent::Idle,
                    Step::Done(cause) => {
                        EngineEvent::Done(cause.map(|c| EngineError::Transport(c.to_string())))
                    }
                    Step::Interrupt => {
                        drained(&tx).await;
                        if let Some(int) = interrupt.take() {
                            let _ = int.send(());
                        }
                        continue;
                    }
                    Step::Transmitted(n) => {
                        drained(&tx).await;
                        transmitted.store(n, Ordering::Relaxed);
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
        }));
        Ok(rx)
    }

    fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    fn payload_size(&self) -> usize {
        56
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn bounded(count: u64) -> CampaignConfig {
    CampaignConfig::new(HOST).with_count(count)
}

fn capture(count: u64, train_size: u32, export: &Path) -> CampaignConfig {
    CampaignConfig::new(HOST)
        .with_count(count)
        .with_train(train_size, Duration::from_millis(10))
        .with_export_path(export)
}

/// Stdout stand-in that fails every write after `lines` complete lines.
struct ClosedAfter {
    lines: usize,
    written: Vec<u8>,
}

impl ClosedAfter {
    fn new(lines: usize) -> Self {
        Self {
            lines,
            written: Vec::new(),
        }
    }
}

impl Write for ClosedAfter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written.iter().filter(|&&b| b == b'\n').count() >= self.lines {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn text(controller: &CampaignController<ScriptedEngine, Vec<u8>>) -> String {
    String::from_utf8(controller.output().clone()).unwrap()
}

// =============================================================================
// Bounded Cycles
// =============================================================================

#[tokio::test]
async fn test_bounded_three_equal_replies() {
    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 10.0),
        Step::Idle,
        Step::Reply(1, 10.0),
        Step::Idle,
        Step::Reply(2, 10.0),
        Step::Idle,
        // Past count: never consumed.
        Step::Reply(3, 99.0),
        Step::Idle,
    ]);
    let config = bounded(3);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());
    assert_eq!(
        controller.policy(),
        TerminationPolicy::BoundedCycles { count: 3 }
    );

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::PolicySatisfied);
    assert_eq!(report.transmitted, 3);
    assert_eq!(report.received, 3);
    assert_eq!(report.unreachable, 0);
    assert_eq!(report.elapsed_unit, ElapsedUnit::Millis);
    let summary = report.summary.unwrap();
    assert_eq!(summary.min, 10.0);
    assert_eq!(summary.max, 10.0);
    assert!((summary.mean - 10.0).abs() < 1e-9);
    assert!(summary.mdev.abs() < 1e-9);
    assert_eq!(controller.stats().len(), 3);

    let out = text(&controller);
    assert!(out.starts_with("PING target.example (192.0.2.1) 56(84) bytes of data\n"));
    assert!(out.contains("64 bytes from 192.0.2.1: icmp_seq=1 ttl=128 time=10.00 ms\n"));
    assert!(out.contains("64 bytes from 192.0.2.1: icmp_seq=3 ttl=128 time=10.00 ms\n"));
    assert!(!out.contains("icmp_seq=4"));
    assert!(out.contains("--- target.example ping statistics ---\n"));
    assert!(out.contains("3 packets transmitted, 3 received, 0.00% packet loss, time "));
    assert!(out.contains("rtt min/avg/max/mdev = 10.000/10.000/10.000/0.000 ms\n"));

    assert_eq!(controller.state(), CampaignState::Terminated);
    assert_eq!(controller.engine().stop_calls(), 1);
    assert!(controller.export().is_none());
}

#[tokio::test]
async fn test_bounded_reply_then_silent_cycle() {
    let (engine, _int) =
        ScriptedEngine::new(vec![Step::Reply(0, 5.0), Step::Idle, Step::Idle]);
    let config = bounded(2);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.transmitted, 2);
    assert_eq!(report.received, 1);
    assert_eq!(report.unreachable, 1);

    let out = text(&controller);
    assert_eq!(out.matches(" : unreachable").count(), 1);
    assert!(out.contains("192.0.2.1 : unreachable\n"));
    // Loss is a fraction under a percent label.
    assert!(out.contains("2 packets transmitted, 1 received, 0.50% packet loss"));
    assert!(out.contains("rtt min/avg/max/mdev = 5.000/5.000/5.000/0.000 ms"));
}

#[tokio::test]
async fn test_bounded_sent_never_exceeds_count() {
    let mut script = Vec::new();
    for seq in 0..10 {
        script.push(Step::Reply(seq, 1.0 + seq as f64));
        script.push(Step::Idle);
    }
    let (engine, _int) = ScriptedEngine::new(script);
    let config = bounded(4);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.transmitted, 4);
    assert_eq!(report.received, 4);
    assert_eq!(controller.stats().samples(), &[1.0, 2.0, 3.0, 4.0]);
}

#[tokio::test]
async fn test_bounded_unknown_address_counts_but_not_tracked() {
    let (engine, _int) =
        ScriptedEngine::new(vec![Step::ReplyFrom(STRANGER, 0, 2.0), Step::Idle]);
    let config = bounded(1);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.received, 1);
    assert_eq!(report.transmitted, 1);
    assert_eq!(report.unreachable, 1);
    let out = text(&controller);
    assert!(out.contains("192.0.2.1 : unreachable"));
    assert!(!out.contains("bytes from 198.51.100.7"));
}

#[tokio::test]
async fn test_bounded_statistics_over_all_replies() {
    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 2.0),
        Step::Reply(1, 4.0),
        Step::Idle,
        Step::Reply(2, 6.0),
        Step::Idle,
    ]);
    let config = bounded(2);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();
    let summary = report.summary.unwrap();

    assert_eq!(report.received, 3);
    assert_eq!(summary.min, 2.0);
    assert_eq!(summary.max, 6.0);
    assert!((summary.mean - 4.0).abs() < 1e-9);
    // Population variance: (4 + 0 + 4) / 3.
    assert!((summary.mdev - 8.0 / 3.0).abs() < 1e-9);

    // Only the latest reply of a cycle is printed at the boundary.
    let out = text(&controller);
    assert!(!out.contains("icmp_seq=1 "));
    assert!(out.contains("icmp_seq=2 ttl=128 time=4.00 ms"));
    assert!(out.contains("icmp_seq=3 ttl=128 time=6.00 ms"));
}

// =============================================================================
// Train Capture
// =============================================================================

#[tokio::test]
async fn test_capture_full_run_exports_every_reply() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Sequence_RTTs.txt");

    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(2, 3.0),
        Step::Reply(0, 1.0),
        Step::Reply(1, 2.0),
        Step::Idle,
        Step::Reply(5, 6.5),
        Step::Reply(3, 4.25),
        Step::Reply(4, 5.0),
        // Never consumed: the last reply completes the run.
        Step::Idle,
    ]);
    let engine = engine.with_transmitted(6);
    let config = capture(2, 3, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::PolicySatisfied);
    assert_eq!(report.transmitted, 6);
    assert_eq!(report.received, 6);
    assert_eq!(report.unreachable, 0);
    assert_eq!(report.elapsed_unit, ElapsedUnit::Secs);
    assert_eq!(
        controller.stats().samples(),
        &[3.0, 1.0, 2.0, 6.5, 4.25, 5.0]
    );

    let exported = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        exported,
        "0\t1.00\n1\t2.00\n2\t3.00\n3\t4.25\n4\t5.00\n5\t6.50\n"
    );

    let out = text(&controller);
    // Replies are printed as they arrive with the engine's sequence numbers.
    assert!(out.contains("64 bytes from 192.0.2.1: icmp_seq=2 ttl=128 time=3.00 ms\n"));
    assert!(out.contains("64 bytes from 192.0.2.1: icmp_seq=0 ttl=128 time=1.00 ms\n"));
    assert!(out.contains("time=5.00 ms\n\n--- target.example ping statistics ---\n"));
    assert!(out.contains("6 packets transmitted, 6 received, 0.00% packet loss, time 0 secs"));
    assert!(out.contains("rtt min/avg/max/mdev = 1.000/"));
}

#[tokio::test]
async fn test_capture_silent_train_reports_host_unreachable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) =
        ScriptedEngine::new(vec![Step::Idle, Step::Reply(2, 7.0), Step::Reply(3, 8.0)]);
    let engine = engine.with_transmitted(4);
    let config = capture(1, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.unreachable, 1);
    assert_eq!(report.received, 2);
    assert!(text(&controller).contains("target.example : unreachable\n"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "2\t7.00\n3\t8.00\n");
}

#[tokio::test]
async fn test_capture_loss_never_satisfies_policy_current_behavior() {
    // One reply of a two-probe train lost: received / train_size never
    // reaches count, so only the engine ending stops the run.
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 1.0),
        Step::Idle,
        Step::Idle,
        Step::Idle,
    ]);
    let engine = engine.with_transmitted(2).closing();
    let config = capture(1, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::EngineCompleted);
    assert_eq!(report.transmitted, 2);
    assert_eq!(report.received, 1);
    assert_eq!(report.unreachable, 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\t1.00\n");
}

#[tokio::test]
async fn test_capture_duplicate_sequence_overwrites() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 1.0),
        Step::Reply(0, 9.0),
        Step::Idle,
    ]);
    let engine = engine.with_transmitted(2).closing();
    let config = capture(5, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.received, 2);
    assert_eq!(controller.export().unwrap().len(), 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\t9.00\n");
}

#[tokio::test]
async fn test_capture_export_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![Step::Reply(0, 1.0), Step::Reply(1, 1.0)]);
    let engine = engine.with_transmitted(2);
    let config = capture(1, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let err = controller.run(NoInterrupt).await.unwrap_err();

    assert!(matches!(err, CampaignError::Export(_)));
    // The statistics were still printed before the export failed.
    assert!(text(&controller).contains("2 packets transmitted, 2 received"));
    assert_eq!(controller.engine().stop_calls(), 1);
}

#[tokio::test]
async fn test_capture_completes_at_cycle_boundary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 1.0),
        Step::Reply(1, 2.0),
        // The engine reports the full train only after both replies.
        Step::Transmitted(2),
        Step::Idle,
        // Never consumed: the boundary completes the run.
        Step::Reply(2, 9.0),
        Step::Idle,
    ]);
    let config = capture(1, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::PolicySatisfied);
    assert_eq!(report.transmitted, 2);
    assert_eq!(report.received, 2);
    assert_eq!(report.unreachable, 0);
    assert_eq!(controller.stats().samples(), &[1.0, 2.0]);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\t1.00\n1\t2.00\n");

    let out = text(&controller);
    assert!(!out.contains("icmp_seq=2"));
    assert!(out.contains("2 packets transmitted, 2 received, 0.00% packet loss"));
}

#[tokio::test]
async fn test_capture_exports_when_stdout_closes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 1.0),
        Step::Reply(1, 2.5),
        Step::Idle,
    ]);
    let engine = engine.with_transmitted(2);
    let config = capture(1, 2, &path);
    // Banner and first reply line go through, then the pipe closes.
    let mut controller =
        CampaignController::new(&config, TARGET, engine, ClosedAfter::new(2));

    let err = controller.run(NoInterrupt).await.unwrap_err();

    assert!(matches!(
        err,
        CampaignError::Output(ref e) if e.kind() == io::ErrorKind::BrokenPipe
    ));
    assert_eq!(controller.export().unwrap().len(), 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\t1.00\n1\t2.50\n");
    assert_eq!(controller.state(), CampaignState::Terminated);
    assert_eq!(controller.engine().stop_calls(), 1);
    assert!(!String::from_utf8_lossy(&controller.output().written).contains("statistics"));
}

// =============================================================================
// Interrupts and Engine Completion
// =============================================================================

#[tokio::test]
async fn test_interrupt_mid_run_stops_processing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, interrupt) = ScriptedEngine::new(vec![
        Step::Reply(0, 1.0),
        Step::Reply(1, 2.0),
        Step::Interrupt,
        Step::Reply(2, 3.0),
        Step::Idle,
        Step::Reply(3, 4.0),
    ]);
    let engine = engine.with_transmitted(4);
    let config = capture(10, 2, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(interrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::Interrupted);
    assert_eq!(report.received, 2);
    assert_eq!(controller.stats().samples(), &[1.0, 2.0]);
    assert!(!text(&controller).contains("get interrupted"));
    // Export is still flushed.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\t1.00\n1\t2.00\n");
    assert_eq!(controller.engine().stop_calls(), 1);
}

#[tokio::test]
async fn test_interrupt_wins_over_pending_events() {
    let (engine, interrupt) = ScriptedEngine::new(vec![Step::Reply(0, 1.0), Step::Idle]);
    let config = bounded(5);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let (tx, rx) = oneshot::channel();
    tx.send(()).unwrap();
    drop(interrupt);

    let report = controller.run(rx).await.unwrap();

    assert_eq!(report.reason, TerminationReason::Interrupted);
    assert_eq!(report.received, 0);
    assert!(report.summary.is_none());
    let out = text(&controller);
    assert!(out.contains("bytes of data\nget interrupted\n--- target.example ping statistics"));
    assert!(!out.contains("rtt min/avg/max/mdev"));
}

#[tokio::test]
async fn test_interrupt_with_no_samples_flushes_empty_export() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.txt");

    let (engine, _int) = ScriptedEngine::new(vec![]);
    let config = capture(3, 4, &path);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let (tx, rx) = oneshot::channel();
    tx.send(()).unwrap();
    let report = controller.run(rx).await.unwrap();

    assert!(report.summary.is_none());
    assert!(path.exists());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}

#[tokio::test]
async fn test_engine_failure_reported_with_statistics() {
    let (engine, _int) = ScriptedEngine::new(vec![
        Step::Reply(0, 3.0),
        Step::Idle,
        Step::Done(Some("network is unreachable")),
        Step::Idle,
    ]);
    let config = bounded(5);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(
        report.reason,
        TerminationReason::EngineFailed("transport error: network is unreachable".to_string())
    );
    assert_eq!(report.transmitted, 1);
    assert!(report.summary.is_some());

    let out = text(&controller);
    assert!(out.contains("Ping failed: transport error: network is unreachable\n"));
    assert!(out.contains("rtt min/avg/max/mdev = 3.000/3.000/3.000/0.000 ms"));
}

#[tokio::test]
async fn test_engine_channel_closed_is_completion() {
    let (engine, _int) = ScriptedEngine::new(vec![]);
    let engine = engine.closing();
    let config = bounded(5);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    let report = controller.run(NoInterrupt).await.unwrap();

    assert_eq!(report.reason, TerminationReason::EngineCompleted);
    assert_eq!(report.transmitted, 0);
    // 0 transmitted: the fraction is undefined.
    assert!(text(&controller).contains("0 packets transmitted, 0 received, NaN% packet loss"));
}

#[tokio::test]
async fn test_campaign_runs_once() {
    let (engine, _int) = ScriptedEngine::new(vec![Step::Idle]);
    let config = bounded(1);
    let mut controller = CampaignController::new(&config, TARGET, engine, Vec::new());

    controller.run(NoInterrupt).await.unwrap();
    let err = controller.run(NoInterrupt).await.unwrap_err();

    assert!(matches!(err, CampaignError::AlreadyRan));
    assert_eq!(controller.engine().stop_calls(), 1);
}
