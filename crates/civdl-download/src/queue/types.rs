//! Queue item types (internal implementation).

use std::time::Instant;

use civdl_core::download::TaskId;

use crate::executor::TransferPlan;

/// Admission lane.
///
/// Test traffic gets its own slots so it never holds up real downloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    Main,
    Test,
}

impl Lane {
    pub const fn for_task(is_test: bool) -> Self {
        if is_test { Self::Test } else { Self::Main }
    }
}

/// A queued task waiting for a slot.
#[derive(Clone, Debug)]
pub struct QueuedItem {
    pub id: TaskId,
    pub lane: Lane,
    /// Transfer details captured at creation time.
    pub plan: TransferPlan,
    /// When this item was queued (for ordering/debugging).
    pub queued_at: Instant,
}

impl QueuedItem {
    pub fn new(id: TaskId, lane: Lane, plan: TransferPlan) -> Self {
        Self {
            id,
            lane,
            plan,
            queued_at: Instant::now(),
        }
    }
}

/// Running counts or capacities, per lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneCounts {
    pub main: usize,
    pub test: usize,
}

impl LaneCounts {
    pub const fn get(&self, lane: Lane) -> usize {
        match lane {
            Lane::Main => self.main,
            Lane::Test => self.test,
        }
    }
}
