use std::sync::Arc;
use std::time::Duration;

use match_core::config::DaemonConfig;

/// 重试策略
///
/// 决定Supervisor是否开始下一次轮询尝试、永久退出时是否告警，以及退避时间如何增长。
/// 实现必须是确定性的且没有副作用。
pub trait RetryPolicy: Send + Sync {
    /// 第 `attempt_count` 次尝试结束后是否继续
    fn should_retry(&self, attempt_count: u64) -> bool;

    /// 因拒绝重试而永久退出时是否需要通知运维
    fn should_alert(&self) -> bool;

    /// 根据当前退避时间计算下一次的退避时间
    fn next_backoff(&self, current: Duration) -> Duration;
}

/// 默认重试策略：无限重试，指数退避并封顶
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    /// 指数退避倍数
    multiplier: u32,
    /// 最大退避时间
    max_backoff: Duration,
    alert: bool,
}

impl DefaultRetryPolicy {
    pub fn new(multiplier: u32, max_backoff: Duration) -> Self {
        Self {
            multiplier: multiplier.max(1),
            max_backoff,
            alert: true,
        }
    }

    pub fn with_alert(mut self, alert: bool) -> Self {
        self.alert = alert;
        self
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.backoff_multiplier, config.backoff_max()).with_alert(config.alert_on_exit)
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(20_000))
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, _attempt_count: u64) -> bool {
        true
    }

    fn should_alert(&self) -> bool {
        self.alert
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current
            .checked_mul(self.multiplier)
            .map_or(self.max_backoff, |next| next.min(self.max_backoff))
    }
}

/// 尝试次数有上限的重试策略，其余决定交给内部策略
#[derive(Debug, Clone)]
pub struct BoundedRetryPolicy<P> {
    inner: P,
    max_attempts: u64,
}

impl<P: RetryPolicy> BoundedRetryPolicy<P> {
    pub fn new(inner: P, max_attempts: u64) -> Self {
        Self {
            inner,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }
}

impl<P: RetryPolicy> RetryPolicy for BoundedRetryPolicy<P> {
    fn should_retry(&self, attempt_count: u64) -> bool {
        attempt_count < self.max_attempts && self.inner.should_retry(attempt_count)
    }

    fn should_alert(&self) -> bool {
        self.inner.should_alert()
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        self.inner.next_backoff(current)
    }
}

/// 按 `daemon.max_attempts` 选择重试策略
pub fn policy_from_config(config: &DaemonConfig) -> Arc<dyn RetryPolicy> {
    let policy = DefaultRetryPolicy::from_config(config);
    match config.max_attempts {
        Some(max_attempts) => Arc::new(BoundedRetryPolicy::new(policy, max_attempts)),
        None => Arc::new(policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = DefaultRetryPolicy::new(2, ms(4000));
        let mut backoff = ms(500);
        let mut sequence = vec![backoff];
        for _ in 0..5 {
            backoff = policy.next_backoff(backoff);
            sequence.push(backoff);
        }
        assert_eq!(
            sequence,
            vec![ms(500), ms(1000), ms(2000), ms(4000), ms(4000), ms(4000)]
        );
    }

    #[test]
    fn test_backoff_is_stable_at_cap() {
        let policy = DefaultRetryPolicy::new(3, ms(20_000));
        assert_eq!(policy.next_backoff(ms(20_000)), ms(20_000));
        assert_eq!(policy.next_backoff(policy.next_backoff(ms(20_000))), ms(20_000));
    }

    #[test]
    fn test_backoff_overflow_saturates_at_cap() {
        let policy = DefaultRetryPolicy::new(u32::MAX, ms(20_000));
        assert_eq!(policy.next_backoff(Duration::MAX), ms(20_000));
    }

    #[test]
    fn test_unit_multiplier_keeps_backoff() {
        let policy = DefaultRetryPolicy::new(1, ms(20_000));
        assert_eq!(policy.next_backoff(ms(500)), ms(500));
    }

    #[test]
    fn test_default_policy_retries_forever_and_alerts() {
        let policy = DefaultRetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(u64::MAX));
        assert!(policy.should_alert());
        assert!(!policy.clone().with_alert(false).should_alert());
    }

    #[test]
    fn test_bounded_policy_stops_after_max_attempts() {
        let policy = BoundedRetryPolicy::new(DefaultRetryPolicy::default(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.next_backoff(ms(500)), ms(1000));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = DaemonConfig::default();
        assert!(policy_from_config(&config).should_retry(1_000_000));

        config.max_attempts = Some(2);
        config.alert_on_exit = false;
        let policy = policy_from_config(&config);
        assert!(!policy.should_retry(2));
        assert!(!policy.should_alert());
    }
}
