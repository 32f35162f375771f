//! Byte-counter publication gate for streaming transfers.

use std::time::{Duration, Instant};

/// Decides which chunk readings a streaming transfer publishes.
///
/// A reading goes out when the counter moved and either the interval has
/// elapsed since the last published one or the transfer just reached its
/// expected total. The first reading always goes out.
#[derive(Debug)]
pub struct PublishGate {
    interval: Duration,
    last: Option<(Instant, u64)>,
}

impl PublishGate {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn admit(&mut self, downloaded: u64, total: Option<u64>) -> bool {
        self.admit_at(Instant::now(), downloaded, total)
    }

    fn admit_at(&mut self, now: Instant, downloaded: u64, total: Option<u64>) -> bool {
        let open = match self.last {
            None => true,
            Some((_, published)) if downloaded <= published => false,
            Some((at, _)) => {
                total.is_some_and(|total| downloaded >= total)
                    || now.duration_since(at) >= self.interval
            }
        };
        if open {
            self.last = Some((now, downloaded));
        }
        open
    }
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
