//! Adaptive rate limiting: burst bucket + sustained window + bans.
//!
//! # Algorithm
//! ```text
//! request(key, weight)
//!     → banned?            yes → Banned (state untouched)
//!     → burst bucket       quantized refill, take `weight` tokens
//!     → sustained window   push `weight` hits, count ≤ ceiling
//!     → either failed?     ban key, Rejected
//!     → Admitted
//!
//! then, only for admitted requests:
//!     → legacy per-minute counters (per IP, per token)
//! ```
//!
//! # Design Decisions
//! - All state is in-memory and per process; no cross-instance coordination
//! - Every time-dependent method takes `now` explicitly
//! - Burst refill is quantized: only whole intervals count, and the refill
//!   clock advances by exactly those intervals so partial progress is kept
//! - Sustained hits are recorded even when the request is rejected
//! - Bucket, window and ban of a key share one map entry, so the whole
//!   decision for a key happens under one shard lock
//! - State changes are commit-on-attempt; nothing is rolled back

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Limiter settings in runtime units.
#[derive(Debug, Clone)]
pub struct LimiterPolicy {
    pub burst_capacity: f64,
    pub burst_refill_tokens: f64,
    pub burst_refill_interval: Duration,
    pub sustained_window: Duration,
    pub sustained_max: usize,
    pub ban: Duration,
    pub max_weight: u32,
    pub max_risk_weight: u32,
    pub legacy: LegacyPolicy,
}

/// Fixed per-window ceilings kept for backward compatibility.
#[derive(Debug, Clone)]
pub struct LegacyPolicy {
    pub window: Duration,
    pub ip_only_max: usize,
    pub ip_max: usize,
    pub token_max: usize,
}

impl From<&RateLimitConfig> for LimiterPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            burst_capacity: config.burst_capacity as f64,
            burst_refill_tokens: config.burst_refill_tokens as f64,
            burst_refill_interval: Duration::from_millis(config.burst_refill_interval_ms),
            sustained_window: Duration::from_secs(config.sustained_window_secs),
            sustained_max: config.sustained_max,
            ban: Duration::from_secs(config.ban_secs),
            max_weight: config.max_weight,
            max_risk_weight: config.max_risk_weight,
            legacy: LegacyPolicy {
                window: Duration::from_secs(config.legacy.window_secs),
                ip_only_max: config.legacy.ip_only_per_min,
                ip_max: config.legacy.ip_per_min,
                token_max: config.legacy.token_per_min,
            },
        }
    }
}

impl Default for LimiterPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl LimiterPolicy {
    /// Cost of a request: route weight plus capped bot risk, capped overall.
    pub fn request_weight(&self, route_weight: u32, risk_score: u32) -> u32 {
        (route_weight + risk_score.min(self.max_risk_weight)).min(self.max_weight)
    }
}

/// Token bucket with step-wise refill.
#[derive(Debug, Clone)]
struct BurstBucket {
    tokens: f64,
    last_refill: Instant,
}

impl BurstBucket {
    fn full(policy: &LimiterPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.burst_capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, policy: &LimiterPolicy, now: Instant) {
        let interval = policy.burst_refill_interval.as_nanos();
        if interval == 0 {
            self.tokens = policy.burst_capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let steps = elapsed / interval;
        if steps > 0 {
            self.tokens = (self.tokens + steps as f64 * policy.burst_refill_tokens)
                .min(policy.burst_capacity);
            // steps * interval <= elapsed, so this fits whatever elapsed fits in.
            self.last_refill += Duration::from_nanos((steps * interval) as u64);
        }
    }

    fn try_take(&mut self, weight: u32, policy: &LimiterPolicy, now: Instant) -> bool {
        self.refill(policy, now);
        let weight = weight as f64;
        if self.tokens >= weight {
            self.tokens -= weight;
            true
        } else {
            false
        }
    }

    fn is_full(&self, policy: &LimiterPolicy) -> bool {
        self.tokens >= policy.burst_capacity
    }
}

/// Drop timestamps older than `now - window`.
fn prune(hits: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    let Some(cutoff) = now.checked_sub(window) else {
        return;
    };
    while hits.front().is_some_and(|t| *t < cutoff) {
        hits.pop_front();
    }
}

#[derive(Debug, Clone)]
struct ClientState {
    bucket: BurstBucket,
    sustained: VecDeque<Instant>,
    banned_until: Option<Instant>,
}

impl ClientState {
    fn new(policy: &LimiterPolicy, now: Instant) -> Self {
        Self {
            bucket: BurstBucket::full(policy, now),
            sustained: VecDeque::new(),
            banned_until: None,
        }
    }

    /// Clears an expired ban. Returns whether the key is still banned.
    fn check_ban(&mut self, now: Instant) -> bool {
        match self.banned_until {
            Some(until) if now > until => {
                self.banned_until = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn record_sustained(&mut self, weight: u32, policy: &LimiterPolicy, now: Instant) -> bool {
        prune(&mut self.sustained, policy.sustained_window, now);
        for _ in 0..weight {
            self.sustained.push_back(now);
        }
        self.sustained.len() <= policy.sustained_max
    }

    fn is_idle(&mut self, policy: &LimiterPolicy, now: Instant) -> bool {
        if self.check_ban(now) {
            return false;
        }
        prune(&mut self.sustained, policy.sustained_window, now);
        self.bucket.refill(policy, now);
        self.sustained.is_empty() && self.bucket.is_full(policy)
    }
}

/// Outcome of the adaptive admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Key is cooling down; nothing was evaluated.
    Banned,
    /// At least one check failed and the key is now banned.
    Rejected { burst_ok: bool, sustained_ok: bool },
}

impl Admission {
    /// Metric label for a non-admitted outcome.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Admission::Admitted => None,
            Admission::Banned => Some("banned"),
            Admission::Rejected { burst_ok: false, .. } => Some("burst"),
            Admission::Rejected { .. } => Some("sustained"),
        }
    }
}

/// Outcome of the legacy per-minute checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyVerdict {
    Allowed,
    /// IP without a valid token exceeded its ceiling.
    IpOnlyExceeded,
    /// IP presenting a valid token exceeded its ceiling.
    IpExceeded,
    /// A single token exceeded its ceiling.
    TokenExceeded,
}

impl LegacyVerdict {
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            LegacyVerdict::Allowed => None,
            LegacyVerdict::IpOnlyExceeded => Some("legacy_ip_only"),
            LegacyVerdict::IpExceeded => Some("legacy_ip"),
            LegacyVerdict::TokenExceeded => Some("legacy_token"),
        }
    }
}

/// Process-wide limiter state.
#[derive(Debug, Default)]
pub struct AdaptiveLimiter {
    clients: DashMap<String, ClientState>,
    ip_hits: DashMap<String, VecDeque<Instant>>,
    token_hits: DashMap<String, VecDeque<Instant>>,
}

impl AdaptiveLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the ban, burst and sustained checks for `key`.
    pub fn admit(&self, key: &str, weight: u32, policy: &LimiterPolicy, now: Instant) -> Admission {
        let mut state = self
            .clients
            .entry(key.to_string())
            .or_insert_with(|| ClientState::new(policy, now));

        if state.check_ban(now) {
            return Admission::Banned;
        }

        // Both checks always run so the window records every attempt.
        let burst_ok = state.bucket.try_take(weight, policy, now);
        let sustained_ok = state.record_sustained(weight, policy, now);

        if burst_ok && sustained_ok {
            Admission::Admitted
        } else {
            state.banned_until = Some(now + policy.ban);
            Admission::Rejected {
                burst_ok,
                sustained_ok,
            }
        }
    }

    /// Record the legacy per-window hits and check their ceilings.
    ///
    /// `jti` is the verified token id, if any.
    pub fn check_legacy(
        &self,
        ip: &str,
        jti: Option<&str>,
        policy: &LimiterPolicy,
        now: Instant,
    ) -> LegacyVerdict {
        let legacy = &policy.legacy;
        let ip_count = take_hit(&self.ip_hits, ip, legacy.window, now);

        let Some(jti) = jti else {
            return if ip_count > legacy.ip_only_max {
                LegacyVerdict::IpOnlyExceeded
            } else {
                LegacyVerdict::Allowed
            };
        };

        if ip_count > legacy.ip_max {
            return LegacyVerdict::IpExceeded;
        }
        if take_hit(&self.token_hits, jti, legacy.window, now) > legacy.token_max {
            return LegacyVerdict::TokenExceeded;
        }
        LegacyVerdict::Allowed
    }

    /// Whether `key` is currently banned. Does not create state.
    pub fn is_banned(&self, key: &str, now: Instant) -> bool {
        self.clients
            .get_mut(key)
            .is_some_and(|mut state| state.check_ban(now))
    }

    /// Remove state that carries no information any more: no active ban,
    /// empty windows and a full bucket. Returns the number of entries removed.
    pub fn sweep(&self, policy: &LimiterPolicy, now: Instant) -> usize {
        let before = self.tracked_keys();

        self.clients.retain(|_, state| !state.is_idle(policy, now));
        for hits in [&self.ip_hits, &self.token_hits] {
            hits.retain(|_, window| {
                prune(window, policy.legacy.window, now);
                !window.is_empty()
            });
        }

        before.saturating_sub(self.tracked_keys())
    }

    /// Number of entries across all maps.
    pub fn tracked_keys(&self) -> usize {
        self.clients.len() + self.ip_hits.len() + self.token_hits.len()
    }
}

fn take_hit(
    map: &DashMap<String, VecDeque<Instant>>,
    key: &str,
    window: Duration,
    now: Instant,
) -> usize {
    let mut hits = map.entry(key.to_string()).or_default();
    prune(&mut hits, window, now);
    hits.push_back(now);
    hits.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LimiterPolicy {
        LimiterPolicy::default()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_weight_formula() {
        let p = policy();
        assert_eq!(p.request_weight(1, 0), 1);
        assert_eq!(p.request_weight(2, 0), 2);
        assert_eq!(p.request_weight(1, 6), 4);
        assert_eq!(p.request_weight(2, 3), 5);
        assert_eq!(p.request_weight(2, 6), 5);
    }

    #[test]
    fn test_capacity_over_weight_admitted_then_rejected() {
        let p = policy();
        for weight in 1..=5u32 {
            let limiter = AdaptiveLimiter::new();
            let now = Instant::now();
            let allowed = 25 / weight;
            for i in 0..allowed {
                assert_eq!(
                    limiter.admit("k", weight, &p, now),
                    Admission::Admitted,
                    "weight {} request {}",
                    weight,
                    i + 1
                );
            }
            assert!(matches!(
                limiter.admit("k", weight, &p, now),
                Admission::Rejected { burst_ok: false, .. }
            ));
        }
    }

    #[test]
    fn test_burst_failure_bans_without_touching_bucket() {
        let p = policy();
        let limiter = AdaptiveLimiter::new();
        let t0 = Instant::now();

        for _ in 0..25 {
            assert_eq!(limiter.admit("k", 1, &p, t0), Admission::Admitted);
        }
        let rejected = limiter.admit("k", 1, &p, t0);
        assert_eq!(
            rejected,
            Admission::Rejected {
                burst_ok: false,
                sustained_ok: true
            }
        );
        assert_eq!(rejected.reason(), Some("burst"));

        let window_len = limiter.clients.get("k").unwrap().sustained.len();
        assert_eq!(limiter.admit("k", 1, &p, t0 + secs(1)), Admission::Banned);
        assert_eq!(limiter.clients.get("k").unwrap().sustained.len(), window_len);
    }

    #[test]
    fn test_ban_expiry() {
        let p = policy();
        let limiter = AdaptiveLimiter::new();
        let t0 = Instant::now();

        for _ in 0..26 {
            limiter.admit("k", 1, &p, t0);
        }
        assert!(limiter.is_banned("k", t0 + secs(29)));
        assert_eq!(limiter.admit("k", 1, &p, t0 + secs(29)), Admission::Banned);
        assert!(limiter.is_banned("k", t0 + secs(30)));

        // After the ban the bucket has refilled (3 whole intervals), so the
        // request is evaluated normally and admitted.
        assert!(!limiter.is_banned("k", t0 + secs(31)));
        assert_eq!(limiter.admit("k", 1, &p, t0 + secs(31)), Admission::Admitted);
    }

    #[test]
    fn test_keys_are_independent() {
        let p = policy();
        let limiter = AdaptiveLimiter::new();
        let now = Instant::now();

        for _ in 0..26 {
            limiter.admit("a", 1, &p, now);
        }
        assert_eq!(limiter.admit("a", 1, &p, now), Admission::Banned);
        assert_eq!(limiter.admit("b", 1, &p, now), Admission::Admitted);
        assert!(!limiter.is_banned("b", now));
    }

    #[test]
    fn test_quantized_refill_keeps_partial_progress() {
        let mut p = policy();
        p.burst_refill_tokens = 5.0;
        let t0 = Instant::now();
        let mut bucket = BurstBucket::full(&p, t0);

        assert!(bucket.try_take(25, &p, t0));
        // 9.9s: no whole interval yet.
        assert!(!bucket.try_take(1, &p, t0 + Duration::from_millis(9_900)));
        // 15s: one step, clock moves to 10s not 15s.
        assert!(bucket.try_take(5, &p, t0 + secs(15)));
        assert_eq!(bucket.last_refill, t0 + secs(10));
        // 20s: a second step is due only because partial progress was kept.
        assert!(bucket.try_take(5, &p, t0 + secs(20)));
        assert_eq!(bucket.last_refill, t0 + secs(20));
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let p = policy();
        let t0 = Instant::now();
        let mut bucket = BurstBucket::full(&p, t0);
        assert!(bucket.try_take(10, &p, t0));
        bucket.refill(&p, t0 + secs(3600));
        assert_eq!(bucket.tokens, 25.0);
    }

    #[test]
    fn test_sustained_ceiling_counts_rejected_hits() {
        let mut p = policy();
        p.burst_capacity = 1_000.0;
        p.burst_refill_tokens = 1_000.0;
        p.sustained_max = 10;
        p.ban = Duration::ZERO;
        let limiter = AdaptiveLimiter::new();
        let t0 = Instant::now();

        for _ in 0..2 {
            assert_eq!(limiter.admit("k", 5, &p, t0), Admission::Admitted);
        }
        let rejected = limiter.admit("k", 5, &p, t0);
        assert_eq!(rejected.reason(), Some("sustained"));
        // The rejected attempt still occupies the window.
        assert_eq!(limiter.clients.get("k").unwrap().sustained.len(), 15);

        // Once the window has passed, everything is pruned.
        let later = t0 + secs(601);
        assert_eq!(limiter.admit("k", 5, &p, later), Admission::Admitted);
        assert_eq!(limiter.clients.get("k").unwrap().sustained.len(), 5);
    }

    #[test]
    fn test_legacy_unauthenticated_ceiling() {
        let p = policy();
        let limiter = AdaptiveLimiter::new();
        let t0 = Instant::now();

        for _ in 0..10 {
            assert_eq!(limiter.check_legacy("1.1.1.1", None, &p, t0), LegacyVerdict::Allowed);
        }
        assert_eq!(
            limiter.check_legacy("1.1.1.1", None, &p, t0),
            LegacyVerdict::IpOnlyExceeded
        );
        // A minute later the window has emptied.
        assert_eq!(
            limiter.check_legacy("1.1.1.1", None, &p, t0 + secs(61)),
            LegacyVerdict::Allowed
        );
    }

    #[test]
    fn test_legacy_token_ceilings() {
        let mut p = policy();
        p.legacy.ip_max = 3;
        p.legacy.token_max = 2;
        let limiter = AdaptiveLimiter::new();
        let now = Instant::now();

        assert_eq!(limiter.check_legacy("ip", Some("j1"), &p, now), LegacyVerdict::Allowed);
        assert_eq!(limiter.check_legacy("ip", Some("j1"), &p, now), LegacyVerdict::Allowed);
        assert_eq!(
            limiter.check_legacy("ip", Some("j1"), &p, now),
            LegacyVerdict::TokenExceeded
        );
        assert_eq!(limiter.check_legacy("ip", Some("j2"), &p, now), LegacyVerdict::IpExceeded);
    }

    #[test]
    fn test_sweep_drops_only_idle_state() {
        let p = policy();
        let limiter = AdaptiveLimiter::new();
        let t0 = Instant::now();

        limiter.admit("idle", 1, &p, t0);
        for _ in 0..26 {
            limiter.admit("banned", 1, &p, t0 + secs(590));
        }
        limiter.check_legacy("ip", None, &p, t0);
        assert_eq!(limiter.tracked_keys(), 3);

        // 11 minutes on: "idle" has an empty window and a full bucket, the
        // legacy counter is empty, "banned" is still cooling down.
        let removed = limiter.sweep(&p, t0 + secs(611));
        assert_eq!(removed, 2);
        assert!(limiter.clients.contains_key("banned"));
        assert!(!limiter.clients.contains_key("idle"));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
