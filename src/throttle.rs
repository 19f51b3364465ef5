use std::time::{Duration, Instant};

/// Trailing-edge throttle. Releases, including early ones through `flush`, are
/// always at least `threshold` apart.
#[derive(Debug)]
pub struct Throttle<T> {
    threshold: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    released: Option<Instant>,
}

impl<T> Throttle<T> {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: None,
            deadline: None,
            released: None,
        }
    }

    pub fn call(&mut self, now: Instant, payload: T) {
        self.pending = Some(payload);
        self.arm(now);
    }

    pub fn merge(&mut self, now: Instant, payload: T, combine: impl FnOnce(&mut T, T)) {
        match self.pending.as_mut() {
            Some(pending) => combine(pending, payload),
            None => self.pending = Some(payload),
        }
        self.arm(now);
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.release(now),
            _ => None,
        }
    }

    /// Releases the pending payload before its window closes, unless the last
    /// release was less than `threshold` ago. Then the payload stays queued.
    pub fn flush(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_none() || !self.ready(now) {
            return None;
        }
        self.release(now)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    pub fn pending_mut(&mut self) -> Option<&mut T> {
        self.pending.as_mut()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn ready(&self, now: Instant) -> bool {
        self.released
            .map_or(true, |at| now.saturating_duration_since(at) >= self.threshold)
    }

    fn release(&mut self, now: Instant) -> Option<T> {
        let payload = self.cancel();
        if payload.is_some() {
            self.released = Some(now);
        }
        payload
    }

    fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.threshold);
        }
    }
}
