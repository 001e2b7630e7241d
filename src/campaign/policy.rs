//! Termination policies and their per-run bookkeeping.

use std::net::IpAddr;

use crate::config::CampaignConfig;
use crate::export::SequenceExport;
use crate::tracker::ReplyTracker;

/// How a campaign decides it is done, selected once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// One probe per cycle; stop after `count` cycles.
    BoundedCycles { count: u64 },
    /// Trains of `train_size` probes; stop once `count` full trains were
    /// transmitted and answered. Every reply is captured for export.
    TrainCapture { count: u64, train_size: u64 },
}

impl TerminationPolicy {
    /// Select the policy: train capture when trains hold more than one probe.
    pub fn from_config(config: &CampaignConfig) -> Self {
        if config.trains_enabled() {
            Self::TrainCapture {
                count: config.count,
                train_size: u64::from(config.train_size),
            }
        } else {
            Self::BoundedCycles {
                count: config.count,
            }
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            Self::BoundedCycles { count } | Self::TrainCapture { count, .. } => *count,
        }
    }

    /// Whether replies are captured into the sequence export.
    pub fn captures_sequences(&self) -> bool {
        matches!(self, Self::TrainCapture { .. })
    }
}

/// Counters and per-policy state for one run.
#[derive(Debug, Clone)]
pub(crate) enum PolicyState {
    Bounded {
        count: u64,
        sent: u64,
        received: u64,
        tracker: ReplyTracker,
    },
    Capture {
        count: u64,
        train_size: u64,
        sent: u64,
        received: u64,
        /// Replies within the current cycle.
        crec: u64,
        export: SequenceExport,
    },
}

impl PolicyState {
    pub(crate) fn new(policy: TerminationPolicy, target: IpAddr) -> Self {
        match policy {
            TerminationPolicy::BoundedCycles { count } => Self::Bounded {
                count,
                sent: 0,
                received: 0,
                tracker: ReplyTracker::new([target]),
            },
            TerminationPolicy::TrainCapture { count, train_size } => Self::Capture {
                count,
                train_size,
                sent: train_size,
                received: 0,
                crec: 0,
                export: SequenceExport::new(),
            },
        }
    }

    pub(crate) fn sent(&self) -> u64 {
        match self {
            Self::Bounded { sent, .. } | Self::Capture { sent, .. } => *sent,
        }
    }

    pub(crate) fn received(&self) -> u64 {
        match self {
            Self::Bounded { received, .. } | Self::Capture { received, .. } => *received,
        }
    }

    /// Bounded campaigns are done once `sent` reached `count`.
    pub(crate) fn cycles_exhausted(&self) -> bool {
        match self {
            Self::Bounded { count, sent, .. } => sent >= count,
            Self::Capture { .. } => false,
        }
    }

    pub(crate) fn export(&self) -> Option<&SequenceExport> {
        match self {
            Self::Capture { export, .. } => Some(export),
            Self::Bounded { .. } => None,
        }
    }
}

/// Train capture completion check.
///
/// Reproduces the observed rule verbatim: at least `count` trains' worth of
/// probes transmitted and exactly `count` trains' worth of replies received,
/// both by integer division. A run with any loss in its final train never
/// satisfies the second half and keeps running until interrupted.
pub(crate) fn capture_complete(
    transmitted: u64,
    received: u64,
    count: u64,
    train_size: u64,
) -> bool {
    transmitted / train_size >= count && received / train_size == count
}
