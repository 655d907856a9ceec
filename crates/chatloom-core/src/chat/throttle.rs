//! Leading/trailing flush throttle for streamed text.
//!
//! Fragments are buffered and released at most once per window. With both
//! edges enabled, the first fragment after an idle period is released at
//! once and whatever accumulates during the window is released when it
//! closes. The throttle never sleeps itself; the caller asks for the next
//! [`FlushThrottle::deadline`] and calls [`FlushThrottle::poll`] then.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Time source for the throttle.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock. Honors paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottleOptions {
    pub window: Duration,
    pub leading: bool,
    pub trailing: bool,
}

impl ThrottleOptions {
    pub fn leading_trailing(window: Duration) -> Self {
        Self {
            window,
            leading: true,
            trailing: true,
        }
    }
}

/// Buffers text fragments and decides when to release them.
#[derive(Debug)]
pub struct FlushThrottle<C: Clock> {
    clock: C,
    options: ThrottleOptions,
    pending: String,
    window_start: Option<Instant>,
    stopped: bool,
}

impl<C: Clock> FlushThrottle<C> {
    pub fn new(clock: C, options: ThrottleOptions) -> Self {
        Self {
            clock,
            options,
            pending: String::new(),
            window_start: None,
            stopped: false,
        }
    }

    /// Buffer a fragment. Returns the text to flush now when a leading
    /// flush is due.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if self.stopped {
            return None;
        }
        self.pending.push_str(fragment);

        let now = self.clock.now();
        if self.window_open(now) {
            return None;
        }
        self.window_start = Some(now);
        if self.options.leading {
            self.take()
        } else {
            None
        }
    }

    /// Release the trailing flush if the window has closed.
    pub fn poll(&mut self) -> Option<String> {
        if self.stopped {
            return None;
        }
        let now = self.clock.now();
        let start = self.window_start?;
        if now < start + self.options.window {
            return None;
        }
        if self.options.trailing && !self.pending.is_empty() {
            // A trailing flush opens the next window.
            self.window_start = Some(now);
            self.take()
        } else {
            self.window_start = None;
            None
        }
    }

    /// When the next trailing flush is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if self.stopped || !self.options.trailing || self.pending.is_empty() {
            return None;
        }
        self.window_start.map(|start| start + self.options.window)
    }

    /// Release everything buffered, regardless of the window.
    pub fn flush(&mut self) -> Option<String> {
        if self.stopped {
            return None;
        }
        self.take()
    }

    /// Discard buffered text and ignore all further input.
    pub fn stop(&mut self) {
        self.pending.clear();
        self.window_start = None;
        self.stopped = true;
    }

    fn window_open(&self, now: Instant) -> bool {
        self.window_start
            .is_some_and(|start| now < start + self.options.window)
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn throttle() -> (ManualClock, FlushThrottle<ManualClock>) {
        let clock = ManualClock::new();
        let throttle = FlushThrottle::new(clock.clone(), ThrottleOptions::leading_trailing(WINDOW));
        (clock, throttle)
    }

    #[test]
    fn test_leading_flush_is_immediate() {
        let (_clock, mut throttle) = throttle();
        assert_eq!(throttle.push("Hi"), Some("Hi".to_string()));
        assert_eq!(throttle.deadline(), None);
    }

    #[test]
    fn test_fragments_within_window_wait_for_trailing_flush() {
        let (clock, mut throttle) = throttle();
        throttle.push("Hi");
        clock.advance(Duration::from_millis(10));
        assert_eq!(throttle.push(" th"), None);
        clock.advance(Duration::from_millis(10));
        assert_eq!(throttle.push("ere"), None);
        assert!(throttle.deadline().is_some());

        assert_eq!(throttle.poll(), None);
        clock.advance(Duration::from_millis(80));
        assert_eq!(throttle.poll(), Some(" there".to_string()));
        assert_eq!(throttle.deadline(), None);
    }

    #[test]
    fn test_trailing_flush_opens_next_window() {
        let (clock, mut throttle) = throttle();
        throttle.push("a");
        throttle.push("b");
        clock.advance(WINDOW);
        assert_eq!(throttle.poll(), Some("b".to_string()));

        clock.advance(Duration::from_millis(50));
        assert_eq!(throttle.push("c"), None);
        clock.advance(Duration::from_millis(50));
        assert_eq!(throttle.poll(), Some("c".to_string()));
    }

    #[test]
    fn test_push_after_idle_window_is_leading_again() {
        let (clock, mut throttle) = throttle();
        throttle.push("a");
        clock.advance(Duration::from_millis(500));
        assert_eq!(throttle.poll(), None);
        assert_eq!(throttle.push("b"), Some("b".to_string()));
    }

    #[test]
    fn test_flush_releases_pending_and_stop_discards() {
        let (_clock, mut throttle) = throttle();
        throttle.push("a");
        throttle.push("b");
        assert_eq!(throttle.flush(), Some("b".to_string()));
        assert_eq!(throttle.flush(), None);

        throttle.push("c");
        throttle.stop();
        assert_eq!(throttle.flush(), None);
        assert_eq!(throttle.push("d"), None);
        assert_eq!(throttle.poll(), None);
    }

    #[test]
    fn test_trailing_only() {
        let clock = ManualClock::new();
        let mut throttle = FlushThrottle::new(
            clock.clone(),
            ThrottleOptions {
                window: WINDOW,
                leading: false,
                trailing: true,
            },
        );
        assert_eq!(throttle.push("a"), None);
        clock.advance(WINDOW);
        assert_eq!(throttle.poll(), Some("a".to_string()));
    }

    #[test]
    fn test_concatenated_flushes_equal_input() {
        let (clock, mut throttle) = throttle();
        let mut out = String::new();
        for (i, fragment) in ["The ", "quick ", "brown ", "fox"].iter().enumerate() {
            clock.advance(Duration::from_millis(30 * i as u64));
            out.extend(throttle.poll());
            out.extend(throttle.push(fragment));
        }
        out.extend(throttle.flush());
        assert_eq!(out, "The quick brown fox");
    }
}
