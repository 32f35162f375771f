//! Admission queue.
//!
//! A pure state machine: strict FIFO per lane, no I/O, no locking. The
//! manager owns synchronization and decides when to ask for the next item.

mod types;

use std::collections::VecDeque;

use civdl_core::download::TaskId;

pub use types::{Lane, LaneCounts, QueuedItem};

/// Pending tasks, one FIFO per lane.
#[derive(Default)]
pub struct AdmissionQueue {
    main: VecDeque<QueuedItem>,
    test: VecDeque<QueuedItem>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut VecDeque<QueuedItem> {
        match lane {
            Lane::Main => &mut self.main,
            Lane::Test => &mut self.test,
        }
    }

    /// Append to the back of the item's lane.
    pub fn enqueue(&mut self, item: QueuedItem) {
        self.lane_mut(item.lane).push_back(item);
    }

    /// Take a pending item out of the queue, wherever it is.
    pub fn remove(&mut self, id: TaskId) -> Option<QueuedItem> {
        for lane in [Lane::Main, Lane::Test] {
            let queue = self.lane_mut(lane);
            if let Some(pos) = queue.iter().position(|item| item.id == id) {
                return queue.remove(pos);
            }
        }
        None
    }

    /// Pop the oldest item of any lane with a free slot.
    pub fn next_admissible(
        &mut self,
        running: LaneCounts,
        capacity: LaneCounts,
    ) -> Option<QueuedItem> {
        [Lane::Main, Lane::Test]
            .into_iter()
            .filter(|lane| running.get(*lane) < capacity.get(*lane))
            .find_map(|lane| self.lane_mut(lane).pop_front())
    }

    /// Empty both lanes, oldest first.
    pub fn drain_all(&mut self) -> Vec<QueuedItem> {
        self.main.drain(..).chain(self.test.drain(..)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use crate::executor::TransferPlan;
    use crate::manager::DownloadDestination;

    fn item(lane: Lane) -> QueuedItem {
        let plan = TransferPlan {
            url: "https://example.com/file".to_string(),
            destination: DownloadDestination::plan(Path::new("/models"), None, "f.bin").unwrap(),
            api_key: None,
            proxy: None,
            timeout: Duration::from_secs(30),
            delegate: None,
        };
        QueuedItem::new(TaskId::new(), lane, plan)
    }

    const CAPS: LaneCounts = LaneCounts { main: 2, test: 1 };

    #[test]
    fn test_fifo_within_lane() {
        let mut queue = AdmissionQueue::new();
        let a = item(Lane::Main);
        let b = item(Lane::Main);
        let (id_a, id_b) = (a.id, b.id);
        queue.enqueue(a);
        queue.enqueue(b);

        let none = LaneCounts::default();
        assert_eq!(queue.next_admissible(none, CAPS).unwrap().id, id_a);
        assert_eq!(queue.next_admissible(none, CAPS).unwrap().id, id_b);
        assert!(queue.next_admissible(none, CAPS).is_none());
    }

    #[test]
    fn test_respects_capacity() {
        let mut queue = AdmissionQueue::new();
        queue.enqueue(item(Lane::Main));
        let full = LaneCounts { main: 2, test: 0 };
        assert!(queue.next_admissible(full, CAPS).is_none());
        assert_eq!(queue.drain_all().len(), 1);
    }

    #[test]
    fn test_lane_admits_when_main_full() {
        let mut queue = AdmissionQueue::new();
        queue.enqueue(item(Lane::Main));
        let t = item(Lane::Test);
        let test_id = t.id;
        queue.enqueue(t);

        let main_full = LaneCounts { main: 2, test: 0 };
        assert_eq!(queue.next_admissible(main_full, CAPS).unwrap().id, test_id);
        assert!(queue.next_admissible(LaneCounts { main: 2, test: 1 }, CAPS).is_none());
    }

    #[test]
    fn test_remove_from_middle() {
        let mut queue = AdmissionQueue::new();
        let items: Vec<_> = (0..3).map(|_| item(Lane::Main)).collect();
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        for i in items {
            queue.enqueue(i);
        }

        assert_eq!(queue.remove(ids[1]).map(|i| i.id), Some(ids[1]));
        assert!(queue.remove(ids[1]).is_none());
        let drained: Vec<_> = queue.drain_all().into_iter().map(|i| i.id).collect();
        assert_eq!(drained, vec![ids[0], ids[2]]);
    }
}
