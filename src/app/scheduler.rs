use std::time::{Duration, Instant};

/// How many data intervals without a fresh sample before the controller is
/// reported unresponsive.
const UNRESPONSIVE_INTERVALS: u32 = 3;

/// Decides, each loop iteration, between waiting for a client and talking
/// to the controller. Two cadences: the check interval bounds the client
/// wait and paces routine polls; the data interval paces measurement
/// requests and feeds the staleness watchdog.
pub struct PollScheduler {
    check_interval: Duration,
    data_interval: Duration,
    last_poll: Instant,
    last_sample: Instant,
    poll_requested: bool,
    stale_reported: bool,
}

impl PollScheduler {
    pub fn new(check_interval: Duration, data_interval: Duration, now: Instant) -> Self {
        Self {
            check_interval,
            data_interval,
            // Backdate both marks so the first iteration polls and
            // requests a measurement immediately.
            last_poll: now.checked_sub(check_interval).unwrap_or(now),
            last_sample: now.checked_sub(data_interval).unwrap_or(now),
            poll_requested: false,
            stale_reported: false,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn set_data_interval(&mut self, interval: Duration) {
        self.data_interval = interval;
    }

    /// A dispatched command wants its forwarded write answered before the
    /// next client wait.
    pub fn request_poll(&mut self) {
        self.poll_requested = true;
    }

    pub fn poll_pending(&self) -> bool {
        self.poll_requested
    }

    /// Routine poll due: a full check interval has passed since the last.
    pub fn poll_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_poll) >= self.check_interval
    }

    pub fn mark_polled(&mut self, now: Instant) {
        self.last_poll = now;
        self.poll_requested = false;
    }

    pub fn mark_fresh_sample(&mut self, now: Instant) {
        self.last_sample = now;
        self.stale_reported = false;
    }

    pub fn staleness(&self, now: Instant) -> Duration {
        now.duration_since(self.last_sample)
    }

    /// Measurement request due: at least one data interval since the last
    /// fresh sample.
    pub fn sample_due(&self, now: Instant) -> bool {
        self.staleness(now) >= self.data_interval
    }

    /// True exactly once per outage, when staleness crosses the watchdog
    /// threshold; a fresh sample re-arms it.
    pub fn report_unresponsive(&mut self, now: Instant) -> bool {
        if self.stale_reported {
            return false;
        }
        if self.staleness(now) > self.data_interval * UNRESPONSIVE_INTERVALS {
            self.stale_reported = true;
            return true;
        }
        false
    }
}
