//! Progress, speed and ETA computation.
//!
//! Pure arithmetic over `(instant, bytes)` samples; the caller owns the clock.

use std::time::Instant;

/// Weight of the newest instantaneous rate in the moving average.
const EWA_SMOOTHING: f64 = 0.3;

/// Percentage of `total` covered by `downloaded`, clamped to `[0, 100]`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Seconds remaining at `speed` bytes/s.
///
/// `None` when the total is unknown or the speed is not positive. A counter
/// that overshoots the total yields zero rather than a negative value.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn eta_seconds(downloaded: u64, total: Option<u64>, speed: f64) -> Option<u64> {
    let total = total?;
    if !speed.is_finite() || speed <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(downloaded) as f64;
    Some((remaining / speed).ceil().max(0.0) as u64)
}

/// One derived progress reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
}

/// Smoothed byte-rate tracker for a single transfer.
///
/// The first rate observed is taken as-is; later ones are blended with an
/// exponential weighted average.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: Option<(Instant, u64)>,
    speed: Option<f64>,
}

impl ProgressTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: None,
            speed: None,
        }
    }

    /// Feed a byte counter reading taken at `at`.
    ///
    /// When `reported_rate` is given (an external downloader measures its own
    /// rate) it is smoothed instead of the rate derived from the counter delta.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(
        &mut self,
        at: Instant,
        downloaded: u64,
        total: Option<u64>,
        reported_rate: Option<f64>,
    ) -> ProgressSample {
        let instant_rate = reported_rate.or_else(|| {
            let (last_at, last_bytes) = self.last?;
            let elapsed = at.checked_duration_since(last_at)?.as_secs_f64();
            (elapsed > 0.0).then(|| downloaded.saturating_sub(last_bytes) as f64 / elapsed)
        });

        if let Some(rate) = instant_rate.filter(|r| r.is_finite() && *r >= 0.0) {
            self.speed = Some(match self.speed {
                None => rate,
                Some(prev) => EWA_SMOOTHING.mul_add(rate, (1.0 - EWA_SMOOTHING) * prev),
            });
        }
        self.last = Some((at, downloaded));

        ProgressSample {
            bytes_downloaded: downloaded,
            bytes_total: total,
            speed: self.speed,
            eta: self.speed.and_then(|s| eta_seconds(downloaded, total, s)),
        }
    }
}
