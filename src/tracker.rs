//! Per-cycle reply bookkeeping for bounded campaigns.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::engine::Reply;

/// Tracks, per target, whether the current cycle produced a reply.
///
/// Slots exist only for the targets given at construction. Replies from any
/// other address are ignored.
#[derive(Debug, Clone)]
pub struct ReplyTracker {
    slots: BTreeMap<IpAddr, Option<Reply>>,
}

impl ReplyTracker {
    /// Create a tracker with one empty slot per target.
    pub fn new(targets: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            slots: targets.into_iter().map(|t| (t, None)).collect(),
        }
    }

    /// Number of tracked targets.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fill the slot for `addr`.
    ///
    /// Returns `false` when `addr` is not a known target.
    pub fn record_reply(&mut self, addr: IpAddr, reply: Reply) -> bool {
        match self.slots.get_mut(&addr) {
            Some(slot) => {
                *slot = Some(reply);
                true
            }
            None => false,
        }
    }

    /// Take this cycle's observations and reset every slot.
    ///
    /// A `None` observation means the target was unreachable this cycle.
    pub fn drain_cycle(&mut self) -> Vec<(IpAddr, Option<Reply>)> {
        self.slots
            .iter_mut()
            .map(|(target, slot)| (*target, slot.take()))
            .collect()
    }
}
