use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// `"<requests>/<period>"`, where only the period's first letter counts
/// (`s`, `m`, `h`, `d`), so `"60/minute"` and `"60/m"` are the same rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub requests: u64,
    pub period: Duration,
}

impl Rate {
    pub fn per_second(&self) -> f64 {
        self.requests as f64 / self.period.as_secs_f64()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateParseError(String);

impl fmt::Display for RateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rate '{}', expected '<requests>/<s|m|h|d>'", self.0)
    }
}

impl FromStr for Rate {
    type Err = RateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RateParseError(s.to_string());
        let (num, period) = s.split_once('/').ok_or_else(err)?;
        let requests: u64 = num.trim().parse().map_err(|_| err())?;
        let secs = match period.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3600,
            Some('d') => 86400,
            _ => return Err(err()),
        };
        if requests == 0 {
            return Err(err());
        }
        Ok(Rate { requests, period: Duration::from_secs(secs) })
    }
}

/// A token bucket which allows fractional tokens for precise refill
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: Rate) -> Self {
        Self {
            capacity: rate.requests as f64,
            tokens: rate.requests as f64,
            refill_per_sec: rate.per_second(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Small epsilon to avoid fp surprises
    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens + 1e-12 >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_token(&self) -> u64 {
        let needed = (1.0 - self.tokens).max(0.0);
        ((needed / self.refill_per_sec).ceil() as u64).max(1)
    }
}

/// Weighted two-window counter for the sustained rate.
#[derive(Debug)]
pub struct SlidingWindow {
    window_size: Duration,
    limit: u64,
    current_window_start: Instant,
    current_count: u64,
    prev_count: u64,
}

impl SlidingWindow {
    fn new(rate: Rate) -> Self {
        Self {
            window_size: rate.period,
            limit: rate.requests,
            current_window_start: Instant::now(),
            current_count: 0,
            prev_count: 0,
        }
    }

    fn roll(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.current_window_start);
        if elapsed >= self.window_size * 2 {
            self.prev_count = 0;
            self.current_count = 0;
            self.current_window_start = now;
        } else if elapsed >= self.window_size {
            self.prev_count = self.current_count;
            self.current_count = 0;
            self.current_window_start += self.window_size;
        }
    }

    fn effective(&self) -> f64 {
        let elapsed = Instant::now().duration_since(self.current_window_start);
        let weight = (elapsed.as_secs_f64() / self.window_size.as_secs_f64()).min(1.0);
        (self.prev_count as f64) * (1.0 - weight) + (self.current_count as f64)
    }

    fn has_room(&mut self) -> bool {
        self.roll();
        self.effective() < self.limit as f64
    }

    fn record(&mut self) {
        self.current_count += 1;
    }

    fn seconds_until_room(&self) -> u64 {
        let elapsed = Instant::now().duration_since(self.current_window_start);
        self.window_size.saturating_sub(elapsed).as_secs().max(1)
    }
}

/// Burst bucket and sustained window; a request must pass both.
#[derive(Debug)]
struct ScopeLimiter {
    bucket: TokenBucket,
    window: SlidingWindow,
    last_seen: Instant,
}

impl ScopeLimiter {
    fn new(burst: Rate, sustained: Rate) -> Self {
        Self {
            bucket: TokenBucket::new(burst),
            window: SlidingWindow::new(sustained),
            last_seen: Instant::now(),
        }
    }

    /// `Ok(())` when allowed, otherwise the seconds to wait.
    fn check(&mut self) -> Result<(), u64> {
        self.last_seen = Instant::now();

        if !self.window.has_room() {
            return Err(self.window.seconds_until_room());
        }
        if !self.bucket.try_consume() {
            return Err(self.bucket.seconds_until_token());
        }
        self.window.record();
        Ok(())
    }
}

type Key = String;

/// Per-client limiters for one throttle scope.
#[derive(Clone)]
pub struct RateLimiterStore {
    map: Arc<DashMap<Key, Arc<Mutex<ScopeLimiter>>>>,
    burst: Rate,
    sustained: Rate,
    bucket_ttl: Duration,
}

impl RateLimiterStore {
    pub fn new(burst: Rate, sustained: Rate) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            burst,
            sustained,
            bucket_ttl: sustained.period.max(burst.period),
        }
    }

    /// Drops limiters idle longer than the longest configured period.
    /// Needs a running tokio runtime.
    pub fn spawn_eviction(&self) {
        let map = self.map.clone();
        let ttl = self.bucket_ttl;
        tokio::spawn(async move {
            let interval = Duration::from_secs(30);
            loop {
                sleep(interval).await;
                let now = Instant::now();
                let before = map.len();
                map.retain(|_, limiter| now.duration_since(limiter.lock().last_seen) <= ttl);
                let evicted = before.saturating_sub(map.len());
                if evicted > 0 {
                    debug!(evicted, "evicted idle rate limiters");
                }
            }
        });
    }

    fn limiter(&self, key: &str) -> Arc<Mutex<ScopeLimiter>> {
        if let Some(existing) = self.map.get(key) {
            return existing.clone();
        }
        self.map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ScopeLimiter::new(self.burst, self.sustained))))
            .clone()
    }

    /// `Ok(())` when `key` may proceed, otherwise `Err(retry_after_secs)`.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.limiter(key).lock().check()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(s: &str) -> Rate {
        s.parse().unwrap()
    }

    #[test]
    fn parses_drf_style_rates() {
        assert_eq!(rate("60/minute"), Rate { requests: 60, period: Duration::from_secs(60) });
        assert_eq!(rate("5/s"), Rate { requests: 5, period: Duration::from_secs(1) });
        assert_eq!(rate("1000/day").period, Duration::from_secs(86400));
        assert!("ten/minute".parse::<Rate>().is_err());
        assert!("10/fortnight".parse::<Rate>().is_err());
        assert!("10".parse::<Rate>().is_err());
        assert!("0/m".parse::<Rate>().is_err());
    }

    #[test]
    fn burst_is_enforced() {
        let store = RateLimiterStore::new(rate("3/minute"), rate("100/day"));
        for _ in 0..3 {
            assert!(store.check("1.2.3.4").is_ok());
        }
        let retry = store.check("1.2.3.4").unwrap_err();
        assert!(retry >= 1);
        assert!(store.check("5.6.7.8").is_ok());
    }

    #[test]
    fn sustained_is_enforced_independently() {
        let store = RateLimiterStore::new(rate("100/s"), rate("2/hour"));
        assert!(store.check("k").is_ok());
        assert!(store.check("k").is_ok());
        assert!(store.check("k").is_err());
        assert_eq!(store.len(), 1);
    }
}
