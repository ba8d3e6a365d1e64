//! crates/blog_pipeline_core/src/rate_limit.rs
//!
//! Per-user, per-operation hourly quotas. The counting itself happens in the store as
//! a single conditional upsert; this module owns the quota table, the hour bucketing,
//! and the fail-open policy.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::ports::RateLimitStore;

/// Every operation that is metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeteredOperation {
    CollectResource,
    ExtractInsights,
    DeepResearch,
    GenerateOutline,
    WriteDraft,
    AnalyzeContent,
    SearchNews,
}

impl MeteredOperation {
    /// The counter key stored alongside the user id.
    pub fn function_name(self) -> &'static str {
        match self {
            Self::CollectResource => "collect-resource",
            Self::ExtractInsights => "extract-insights",
            Self::DeepResearch => "deep-research",
            Self::GenerateOutline => "generate-outline",
            Self::WriteDraft => "write-draft",
            Self::AnalyzeContent => "analyze-seo",
            Self::SearchNews => "search-news",
        }
    }

    /// Calls allowed per user per clock hour.
    pub fn hourly_limit(self) -> u32 {
        match self {
            Self::CollectResource => 30,
            Self::ExtractInsights => 10,
            Self::DeepResearch => 5,
            Self::GenerateOutline => 10,
            Self::WriteDraft => 5,
            Self::AnalyzeContent => 20,
            Self::SearchNews => 20,
        }
    }
}

/// The caller used up the hourly quota for an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded. {function_name} allows {limit} calls per hour.")]
pub struct RateLimitExceeded {
    pub function_name: &'static str,
    pub limit: u32,
}

/// Truncates a timestamp to the start of its UTC hour.
pub fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Counts one call for `user_id` in the current hour.
    pub async fn check_and_increment(
        &self,
        user_id: Uuid,
        operation: MeteredOperation,
    ) -> Result<(), RateLimitExceeded> {
        self.check_and_increment_at(user_id, operation, Utc::now())
            .await
    }

    /// Same as `check_and_increment`, with the clock supplied by the caller.
    ///
    /// A store failure lets the call through and is logged.
    pub async fn check_and_increment_at(
        &self,
        user_id: Uuid,
        operation: MeteredOperation,
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitExceeded> {
        let function_name = operation.function_name();
        let limit = operation.hourly_limit();

        match self
            .store
            .increment_within(user_id, function_name, hour_bucket(now), limit)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(%user_id, function_name, limit, "hourly quota exhausted");
                Err(RateLimitExceeded {
                    function_name,
                    limit,
                })
            }
            Err(e) => {
                error!(%user_id, function_name, "rate limit store failed, allowing call: {:?}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCounters {
        counts: Mutex<HashMap<(Uuid, String, DateTime<Utc>), u32>>,
    }

    #[async_trait]
    impl RateLimitStore for MemoryCounters {
        async fn increment_within(
            &self,
            user_id: Uuid,
            function_name: &str,
            bucket: DateTime<Utc>,
            limit: u32,
        ) -> PortResult<bool> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts
                .entry((user_id, function_name.to_string(), bucket))
                .or_insert(0);
            if *count >= limit {
                return Ok(false);
            }
            *count += 1;
            Ok(true)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn increment_within(
            &self,
            _user_id: Uuid,
            _function_name: &str,
            _bucket: DateTime<Utc>,
            _limit: u32,
        ) -> PortResult<bool> {
            Err(PortError::Unexpected("connection refused".into()))
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn buckets_truncate_to_the_hour() {
        assert_eq!(hour_bucket(at(9, 59)), at(9, 0));
        assert_eq!(hour_bucket(at(10, 0)), at(10, 0));
    }

    #[tokio::test]
    async fn allows_up_to_the_limit_then_refuses() {
        let limiter = RateLimiter::new(Arc::new(MemoryCounters::default()));
        let user = Uuid::new_v4();
        let op = MeteredOperation::DeepResearch;

        for n in 1..=op.hourly_limit() {
            assert!(
                limiter.check_and_increment_at(user, op, at(9, n)).await.is_ok(),
                "call {n} should pass"
            );
        }
        let err = limiter
            .check_and_increment_at(user, op, at(9, 30))
            .await
            .unwrap_err();
        assert_eq!(err.limit, 5);
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. deep-research allows 5 calls per hour."
        );
    }

    #[tokio::test]
    async fn a_new_hour_starts_from_zero() {
        let limiter = RateLimiter::new(Arc::new(MemoryCounters::default()));
        let user = Uuid::new_v4();
        let op = MeteredOperation::WriteDraft;

        for _ in 0..op.hourly_limit() {
            limiter.check_and_increment_at(user, op, at(9, 10)).await.unwrap();
        }
        assert!(limiter.check_and_increment_at(user, op, at(9, 59)).await.is_err());
        assert!(limiter.check_and_increment_at(user, op, at(10, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn quotas_are_separate_per_user_and_operation() {
        let limiter = RateLimiter::new(Arc::new(MemoryCounters::default()));
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        for _ in 0..5 {
            limiter
                .check_and_increment_at(alice, MeteredOperation::WriteDraft, at(9, 0))
                .await
                .unwrap();
        }
        assert!(limiter
            .check_and_increment_at(bob, MeteredOperation::WriteDraft, at(9, 0))
            .await
            .is_ok());
        assert!(limiter
            .check_and_increment_at(alice, MeteredOperation::AnalyzeContent, at(9, 0))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn store_failures_fail_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        assert!(limiter
            .check_and_increment(Uuid::new_v4(), MeteredOperation::WriteDraft)
            .await
            .is_ok());
    }
}
