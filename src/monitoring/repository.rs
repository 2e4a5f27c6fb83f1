use crate::error::{MonitoringError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Aggregate of the `pg_stat_statements` view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    pub query_count: u64,
    pub average_query_time_ms: f64,
    pub slow_queries: u64,
}

/// Reads the monitoring subsystem performs against the application store.
///
/// Every call is independently failable; callers decide how to degrade.
#[async_trait]
pub trait MonitoringRepository: Send + Sync + std::fmt::Debug {
    /// Trivial liveness query.
    async fn ping(&self) -> Result<()>;
    async fn active_connections(&self) -> Result<u64>;
    /// `Ok(None)` when the statistics extension is not installed.
    async fn query_statistics(&self) -> Result<Option<QueryStatistics>>;
    async fn count_users(&self) -> Result<u64>;
    async fn count_books(&self) -> Result<u64>;
    async fn count_reviews(&self) -> Result<u64>;
    /// Users whose record was updated at or after `since`.
    async fn count_active_users(&self, since: DateTime<Utc>) -> Result<u64>;
    async fn count_new_users(&self, since: DateTime<Utc>) -> Result<u64>;
    async fn count_new_reviews(&self, since: DateTime<Utc>) -> Result<u64>;
}

/// PostgreSQL implementation of monitoring repository
#[derive(Debug)]
pub struct PostgresMonitoringRepository {
    db_pool: Arc<PgPool>,
    slow_query_threshold_ms: f64,
}

impl PostgresMonitoringRepository {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self {
            db_pool,
            slow_query_threshold_ms: 1000.0,
        }
    }

    pub fn with_slow_query_threshold(mut self, threshold_ms: f64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(self.db_pool.as_ref())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_since(&self, sql: &str, since: DateTime<Utc>) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(sql)
            .bind(since)
            .fetch_one(self.db_pool.as_ref())
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl MonitoringRepository for PostgresMonitoringRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1 as health_check")
            .fetch_one(self.db_pool.as_ref())
            .await?;
        Ok(())
    }

    async fn active_connections(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM pg_stat_activity WHERE state = 'active'")
            .await
    }

    async fn query_statistics(&self) -> Result<Option<QueryStatistics>> {
        let installed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pg_extension WHERE extname = 'pg_stat_statements'",
        )
        .fetch_one(self.db_pool.as_ref())
        .await?;

        if installed == 0 {
            debug!("pg_stat_statements not installed, query statistics unavailable");
            return Ok(None);
        }

        let (calls, mean_ms, slow) = sqlx::query_as::<_, (i64, f64, i64)>(
            "SELECT COALESCE(SUM(calls), 0)::BIGINT, \
                    COALESCE(AVG(mean_exec_time), 0)::FLOAT8, \
                    COUNT(*) FILTER (WHERE mean_exec_time > $1)::BIGINT \
             FROM pg_stat_statements",
        )
        .bind(self.slow_query_threshold_ms)
        .fetch_one(self.db_pool.as_ref())
        .await?;

        Ok(Some(QueryStatistics {
            query_count: calls.max(0) as u64,
            average_query_time_ms: mean_ms,
            slow_queries: slow.max(0) as u64,
        }))
    }

    async fn count_users(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM users").await
    }

    async fn count_books(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM books").await
    }

    async fn count_reviews(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM reviews").await
    }

    async fn count_active_users(&self, since: DateTime<Utc>) -> Result<u64> {
        self.count_since("SELECT COUNT(*) FROM users WHERE updated_at >= $1", since)
            .await
    }

    async fn count_new_users(&self, since: DateTime<Utc>) -> Result<u64> {
        self.count_since("SELECT COUNT(*) FROM users WHERE created_at >= $1", since)
            .await
    }

    async fn count_new_reviews(&self, since: DateTime<Utc>) -> Result<u64> {
        self.count_since("SELECT COUNT(*) FROM reviews WHERE created_at >= $1", since)
            .await
    }
}

/// In-memory repository for tests and offline runs.
#[derive(Debug)]
pub struct MockMonitoringRepository {
    pub users: u64,
    pub books: u64,
    pub reviews: u64,
    pub active_users: u64,
    pub new_users: u64,
    pub new_reviews: u64,
    pub connections: u64,
    pub statistics: Option<QueryStatistics>,
    pub ping_delay: Duration,
    pub fail_ping: bool,
    pub fail_counts: bool,
    ping_calls: AtomicU64,
}

impl Default for MockMonitoringRepository {
    fn default() -> Self {
        Self {
            users: 120,
            books: 340,
            reviews: 910,
            active_users: 17,
            new_users: 3,
            new_reviews: 11,
            connections: 4,
            statistics: None,
            ping_delay: Duration::ZERO,
            fail_ping: false,
            fail_counts: false,
            ping_calls: AtomicU64::new(0),
        }
    }
}

impl MockMonitoringRepository {
    pub fn disconnected() -> Self {
        Self {
            fail_ping: true,
            fail_counts: true,
            ..Self::default()
        }
    }

    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = delay;
        self
    }

    pub fn with_statistics(mut self, statistics: QueryStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn ping_count(&self) -> u64 {
        self.ping_calls.load(Ordering::SeqCst)
    }

    fn counted(&self, value: u64) -> Result<u64> {
        if self.fail_counts {
            Err(MonitoringError::Collection(
                "mock store unavailable".to_string(),
            ))
        } else {
            Ok(value)
        }
    }
}

#[async_trait]
impl MonitoringRepository for MockMonitoringRepository {
    async fn ping(&self) -> Result<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if !self.ping_delay.is_zero() {
            tokio::time::sleep(self.ping_delay).await;
        }
        if self.fail_ping {
            return Err(MonitoringError::Collection(
                "mock connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn active_connections(&self) -> Result<u64> {
        self.counted(self.connections)
    }

    async fn query_statistics(&self) -> Result<Option<QueryStatistics>> {
        if self.fail_counts {
            return Err(MonitoringError::Collection(
                "mock store unavailable".to_string(),
            ));
        }
        Ok(self.statistics)
    }

    async fn count_users(&self) -> Result<u64> {
        self.counted(self.users)
    }

    async fn count_books(&self) -> Result<u64> {
        self.counted(self.books)
    }

    async fn count_reviews(&self) -> Result<u64> {
        self.counted(self.reviews)
    }

    async fn count_active_users(&self, _since: DateTime<Utc>) -> Result<u64> {
        self.counted(self.active_users)
    }

    async fn count_new_users(&self, _since: DateTime<Utc>) -> Result<u64> {
        self.counted(self.new_users)
    }

    async fn count_new_reviews(&self, _since: DateTime<Utc>) -> Result<u64> {
        self.counted(self.new_reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_pings() {
        let repository = MockMonitoringRepository::default();
        repository.ping().await.unwrap();
        repository.ping().await.unwrap();
        assert_eq!(repository.ping_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_mock_fails_every_read() {
        let repository = MockMonitoringRepository::disconnected();
        assert!(repository.ping().await.is_err());
        assert!(repository.count_books().await.is_err());
        assert!(repository.query_statistics().await.is_err());
        assert!(repository.count_new_reviews(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_statistics_absent_by_default() {
        let repository = MockMonitoringRepository::default();
        assert_eq!(repository.query_statistics().await.unwrap(), None);

        let stats = QueryStatistics {
            query_count: 10,
            average_query_time_ms: 2.5,
            slow_queries: 1,
        };
        let repository = MockMonitoringRepository::default().with_statistics(stats);
        assert_eq!(repository.query_statistics().await.unwrap(), Some(stats));
    }
}
