use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window limiter, local to this process. Deployments that scale
/// out horizontally get per-pod budgets, which is acceptable for abuse
/// control (the goal is stopping floods, not exact global accounting).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
    enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            hits: Arc::new(DashMap::new()),
            enabled,
        }
    }

    /// Records a hit for `key` and reports whether it stayed within
    /// `limit` hits per `window`. A disabled limiter admits everything.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut bucket = self.hits.entry(key.to_string()).or_default();
        bucket.retain(|hit| now.duration_since(*hit) < window);
        if bucket.len() >= limit {
            return false;
        }
        bucket.push_back(now);
        true
    }
}

/// Per-action budgets, overridable through `RL_*` environment variables.
/// Login throttles by submitted email (pre-auth), the write actions by the
/// authenticated user id.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub login_limit: usize,
    pub login_window: Duration,
    pub message_limit: usize,
    pub message_window: Duration,
    pub report_limit: usize,
    pub report_window: Duration,
    pub upload_limit: usize,
    pub upload_window: Duration,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            login_limit: env_parse("RL_LOGIN_LIMIT", 10),
            login_window: Duration::from_secs(env_parse("RL_LOGIN_WINDOW", 300)),
            message_limit: env_parse("RL_MESSAGE_LIMIT", 30),
            message_window: Duration::from_secs(env_parse("RL_MESSAGE_WINDOW", 60)),
            report_limit: env_parse("RL_REPORT_LIMIT", 30),
            report_window: Duration::from_secs(env_parse("RL_REPORT_WINDOW", 300)),
            upload_limit: env_parse("RL_UPLOAD_LIMIT", 10),
            upload_window: Duration::from_secs(env_parse("RL_UPLOAD_WINDOW", 3600)),
        }
    }
}

/// What the handlers call. Each action gets its own key space so a user
/// exhausting the message budget can still upload report attachments.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    fn allow(&self, action: &str, id: &str, limit: usize, window: Duration) -> bool {
        self.limiter.check(&format!("{action}:{id}"), limit, window)
    }

    pub fn allow_login(&self, email: &str) -> bool {
        self.allow("login", email, self.cfg.login_limit, self.cfg.login_window)
    }

    pub fn allow_message(&self, user: &str) -> bool {
        self.allow("message", user, self.cfg.message_limit, self.cfg.message_window)
    }

    pub fn allow_report(&self, user: &str) -> bool {
        self.allow("report", user, self.cfg.report_limit, self.cfg.report_window)
    }

    pub fn allow_upload(&self, user: &str) -> bool {
        self.allow("upload", user, self.cfg.upload_limit, self.cfg.upload_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_capped_at_limit() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(rl.check("a", 3, window));
        }
        assert!(!rl.check("a", 3, window));
    }

    #[test]
    fn keys_do_not_share_budgets() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_secs(60);
        assert!(rl.check("a", 1, window));
        assert!(!rl.check("a", 1, window));
        assert!(rl.check("b", 1, window));
    }
}
