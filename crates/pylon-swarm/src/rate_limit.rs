//! Per-IP sliding-window rate limiting for connection admission.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window limiter: at most `max_events` per IP inside `window`.
/// Timestamps outside the window are discarded on every check, so the
/// window slides rather than resetting in steps.
pub struct SlidingWindow {
    events: Mutex<HashMap<IpAddr, Vec<Instant>>>,
    max_events: usize,
    window: Duration,
}

impl SlidingWindow {
    /// New limiter allowing `max_events` per `window` per IP.
    #[must_use]
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            max_events,
            window,
        }
    }

    /// Record an event from `ip` and report whether it is within limits.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let mut events = self.events.lock().unwrap();
        let now = Instant::now();

        let history = events.entry(ip).or_default();
        history.retain(|&t| now.duration_since(t) < self.window);

        if history.len() >= self.max_events {
            return false;
        }

        history.push(now);
        true
    }

    /// Drop IPs whose whole history has aged out.
    pub fn cleanup(&self) {
        let mut events = self.events.lock().unwrap();
        let now = Instant::now();
        events.retain(|_, history| {
            history.retain(|&t| now.duration_since(t) < self.window);
            !history.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(n: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, n])
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = SlidingWindow::new(3, Duration::from_secs(60));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
    }

    #[test]
    fn test_limits_are_per_ip() {
        let limiter = SlidingWindow::new(1, Duration::from_secs(60));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(2)));
        assert!(!limiter.allow(ip(1)));
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindow::new(2, Duration::from_millis(30));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow(ip(1)), "old events aged out");
    }

    #[test]
    fn test_cleanup_drops_idle_ips() {
        let limiter = SlidingWindow::new(5, Duration::from_millis(10));
        limiter.allow(ip(1));
        std::thread::sleep(Duration::from_millis(20));
        limiter.cleanup();
        assert!(limiter.events.lock().unwrap().is_empty());
    }
}
