//! Rate limiter unit tests

use chrono::Duration;
use pretty_assertions::assert_eq;
use rstest::*;
use std::sync::Arc;

use market_proxy::{
    clock::ManualClock,
    config::RateLimitConfig,
    rate_limiter::{RateDecision, RateLimiter},
};

use super::helpers::manual_clock;

#[fixture]
fn limit_config() -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        window_seconds: 15 * 60,
        max_requests: 100,
        trust_forwarded_headers: false,
    }
}

fn limiter_with(config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
    let clock = manual_clock();
    (RateLimiter::new(config, clock.clone()), clock)
}

#[rstest]
fn test_quota_then_rejection_then_new_window(limit_config: RateLimitConfig) {
    let (limiter, clock) = limiter_with(limit_config);

    for _ in 0..100 {
        assert!(limiter.admit("10.0.0.1").is_allowed());
    }

    assert_eq!(
        limiter.admit("10.0.0.1"),
        RateDecision::Rejected {
            limit: 100,
            retry_after_secs: 900,
        }
    );

    clock.advance(Duration::minutes(15));
    assert_eq!(
        limiter.admit("10.0.0.1"),
        RateDecision::Allowed {
            limit: 100,
            remaining: 99,
            reset_after_secs: 900,
        }
    );
}

#[rstest]
fn test_remaining_counts_down(mut limit_config: RateLimitConfig) {
    limit_config.max_requests = 3;
    let (limiter, clock) = limiter_with(limit_config);

    let remaining: Vec<u32> = (0..3)
        .map(|_| match limiter.admit("client") {
            RateDecision::Allowed { remaining, .. } => remaining,
            RateDecision::Rejected { .. } => panic!("rejected within quota"),
        })
        .collect();
    assert_eq!(remaining, vec![2, 1, 0]);

    clock.advance(Duration::seconds(600));
    assert_eq!(
        limiter.admit("client"),
        RateDecision::Rejected {
            limit: 3,
            retry_after_secs: 300,
        }
    );
}

#[rstest]
fn test_rejections_do_not_extend_window(mut limit_config: RateLimitConfig) {
    limit_config.max_requests = 1;
    let (limiter, clock) = limiter_with(limit_config);

    assert!(limiter.admit("client").is_allowed());
    for _ in 0..10 {
        clock.advance(Duration::seconds(60));
        assert!(!limiter.admit("client").is_allowed());
    }

    clock.advance(Duration::seconds(300));
    assert!(limiter.admit("client").is_allowed());
}

#[rstest]
fn test_clients_are_isolated(mut limit_config: RateLimitConfig) {
    limit_config.max_requests = 2;
    let (limiter, _clock) = limiter_with(limit_config);

    assert!(limiter.admit("a").is_allowed());
    assert!(limiter.admit("a").is_allowed());
    assert!(!limiter.admit("a").is_allowed());

    assert!(limiter.admit("b").is_allowed());
    assert!(limiter.admit("b").is_allowed());
}

#[rstest]
fn test_disabled_limiter_admits_everything(mut limit_config: RateLimitConfig) {
    limit_config.enabled = false;
    limit_config.max_requests = 1;
    let (limiter, _clock) = limiter_with(limit_config);

    assert!(!limiter.is_enabled());
    for _ in 0..50 {
        assert!(limiter.admit("client").is_allowed());
    }
    assert_eq!(limiter.get_stats().tracked_clients, 0);
}

#[rstest]
fn test_cleanup_drops_elapsed_windows(limit_config: RateLimitConfig) {
    let (limiter, clock) = limiter_with(limit_config);

    limiter.admit("early");
    clock.advance(Duration::minutes(10));
    limiter.admit("late");

    clock.advance(Duration::minutes(5));
    assert_eq!(limiter.cleanup_idle(), 1);

    let stats = limiter.get_stats();
    assert_eq!(stats.tracked_clients, 1);
    assert_eq!(stats.max_requests, 100);
    assert_eq!(stats.window_seconds, 900);
}

#[rstest]
#[case(900, "15 minutes")]
#[case(60, "1 minute")]
#[case(90, "2 minutes")]
fn test_rejection_message_rounds_up_minutes(
    mut limit_config: RateLimitConfig,
    #[case] window_seconds: u64,
    #[case] expected: &str,
) {
    limit_config.window_seconds = window_seconds;
    let (limiter, _clock) = limiter_with(limit_config);

    assert!(limiter.rejection_message().ends_with(expected));
}
