use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window of accepted connections per client IP.
pub struct RateLimiter {
    connections: HashMap<IpAddr, VecDeque<Instant>>,
    max_per_minute: usize,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_per_minute,
        }
    }

    pub fn check_and_add(&mut self, ip: IpAddr) -> bool {
        self.check_and_add_at(ip, Instant::now())
    }

    fn check_and_add_at(&mut self, ip: IpAddr, now: Instant) -> bool {
        let entries = self.connections.entry(ip).or_default();

        while let Some(&time) = entries.front() {
            if now.duration_since(time) > WINDOW {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.max_per_minute {
            false
        } else {
            entries.push_back(now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn limits_per_ip_within_the_window() {
        let mut limiter = RateLimiter::new(2);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let start = Instant::now();

        assert!(limiter.check_and_add_at(a, start));
        assert!(limiter.check_and_add_at(a, start));
        assert!(!limiter.check_and_add_at(a, start));
        assert!(limiter.check_and_add_at(b, start));

        let later = start + WINDOW + Duration::from_secs(1);
        assert!(limiter.check_and_add_at(a, later));
    }
}
