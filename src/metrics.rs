//! Ambient metrics: atomic counters for connections/rooms/cache/rate-limit activity,
//! plus an `hdrhistogram`-backed latency tracker for dispatch RPCs and room-loop RTT,
//! trimmed to the operations this crate actually performs.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct ServerMetrics {
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,

    pub rooms_created: AtomicU64,
    pub rooms_joined: AtomicU64,
    pub rooms_watched: AtomicU64,
    pub room_creation_failures: AtomicU64,
    pub room_join_failures: AtomicU64,
    pub rooms_closed: AtomicU64,
    pub room_id_collisions: AtomicU64,

    pub search_queries: AtomicU64,
    pub join_at_random_attempts: AtomicU64,
    pub join_at_random_no_candidate: AtomicU64,

    pub room_cache_hits: AtomicU64,
    pub room_cache_misses: AtomicU64,
    pub host_cache_hits: AtomicU64,
    pub host_cache_misses: AtomicU64,

    pub send_queue_evictions: AtomicU64,
    pub master_switches: AtomicU64,

    pub rate_limit_rejections: AtomicU64,

    pub rpc_dispatch_failures: AtomicU64,
    pub auth_failures: AtomicU64,
    pub internal_errors: AtomicU64,

    pub latencies: Arc<RwLock<LatencyTracker>>,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            disconnections: AtomicU64::new(0),
            rooms_created: AtomicU64::new(0),
            rooms_joined: AtomicU64::new(0),
            rooms_watched: AtomicU64::new(0),
            room_creation_failures: AtomicU64::new(0),
            room_join_failures: AtomicU64::new(0),
            rooms_closed: AtomicU64::new(0),
            room_id_collisions: AtomicU64::new(0),
            search_queries: AtomicU64::new(0),
            join_at_random_attempts: AtomicU64::new(0),
            join_at_random_no_candidate: AtomicU64::new(0),
            room_cache_hits: AtomicU64::new(0),
            room_cache_misses: AtomicU64::new(0),
            host_cache_hits: AtomicU64::new(0),
            host_cache_misses: AtomicU64::new(0),
            send_queue_evictions: AtomicU64::new(0),
            master_switches: AtomicU64::new(0),
            rate_limit_rejections: AtomicU64::new(0),
            rpc_dispatch_failures: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            latencies: Arc::new(RwLock::new(LatencyTracker::new())),
        }
    }

    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        let _ =
            self.active_connections
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    if current > 0 {
                        Some(current - 1)
                    } else {
                        None
                    }
                });
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_joined(&self) {
        self.rooms_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_watched(&self) {
        self.rooms_watched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_room_creation_failures(&self) {
        self.room_creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_room_join_failures(&self) {
        self.room_join_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_closed(&self) {
        self.rooms_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_room_id_collisions(&self) {
        self.room_id_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_search_queries(&self) {
        self.search_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_at_random_attempts(&self) {
        self.join_at_random_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_at_random_no_candidate(&self) {
        self.join_at_random_no_candidate
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_room_cache(&self, hit: bool) {
        if hit {
            self.room_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.room_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_host_cache(&self, hit: bool) {
        if hit {
            self.host_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.host_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_send_queue_evictions(&self) {
        self.send_queue_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_master_switches(&self) {
        self.master_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limit_rejections(&self) {
        self.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rpc_dispatch_failures(&self) {
        self.rpc_dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_internal_errors(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_latency(&self, operation: &str, duration: Duration) {
        let mut tracker = self.latencies.write().await;
        tracker.add_sample(operation, duration);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let tracker = self.latencies.read().await;
        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_joined: self.rooms_joined.load(Ordering::Relaxed),
            rooms_watched: self.rooms_watched.load(Ordering::Relaxed),
            rooms_closed: self.rooms_closed.load(Ordering::Relaxed),
            room_creation_failures: self.room_creation_failures.load(Ordering::Relaxed),
            room_join_failures: self.room_join_failures.load(Ordering::Relaxed),
            room_id_collisions: self.room_id_collisions.load(Ordering::Relaxed),
            search_queries: self.search_queries.load(Ordering::Relaxed),
            join_at_random_attempts: self.join_at_random_attempts.load(Ordering::Relaxed),
            join_at_random_no_candidate: self
                .join_at_random_no_candidate
                .load(Ordering::Relaxed),
            room_cache_hits: self.room_cache_hits.load(Ordering::Relaxed),
            room_cache_misses: self.room_cache_misses.load(Ordering::Relaxed),
            host_cache_hits: self.host_cache_hits.load(Ordering::Relaxed),
            host_cache_misses: self.host_cache_misses.load(Ordering::Relaxed),
            send_queue_evictions: self.send_queue_evictions.load(Ordering::Relaxed),
            master_switches: self.master_switches.load(Ordering::Relaxed),
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
            rpc_dispatch_failures: self.rpc_dispatch_failures.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            rpc_dispatch_latency: tracker.get_latency_metrics("rpc_dispatch").unwrap_or_default(),
            room_ping_rtt: tracker.get_latency_metrics("room_ping_rtt").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub active_connections: u64,
    pub total_connections: u64,
    pub rooms_created: u64,
    pub rooms_joined: u64,
    pub rooms_watched: u64,
    pub rooms_closed: u64,
    pub room_creation_failures: u64,
    pub room_join_failures: u64,
    pub room_id_collisions: u64,
    pub search_queries: u64,
    pub join_at_random_attempts: u64,
    pub join_at_random_no_candidate: u64,
    pub room_cache_hits: u64,
    pub room_cache_misses: u64,
    pub host_cache_hits: u64,
    pub host_cache_misses: u64,
    pub send_queue_evictions: u64,
    pub master_switches: u64,
    pub rate_limit_rejections: u64,
    pub rpc_dispatch_failures: u64,
    pub auth_failures: u64,
    pub internal_errors: u64,
    pub rpc_dispatch_latency: OperationLatencyMetrics,
    pub room_ping_rtt: OperationLatencyMetrics,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct OperationLatencyMetrics {
    pub average_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

const DEFAULT_LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const DEFAULT_HIGHEST_TRACKABLE_MICROS: u64 = 300_000_000; // 5 minutes
const DEFAULT_SIGNIFICANT_FIGURES: u8 = 3;
const MICROS_PER_MS: f64 = 1000.0;

#[derive(Debug)]
pub struct LatencyTracker {
    operations: HashMap<String, Option<Histogram<u64>>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { operations: HashMap::new() }
    }

    pub fn add_sample(&mut self, operation: &str, duration: Duration) {
        let micros = duration.as_micros().min(u128::from(u64::MAX)) as u64;
        let clamped = micros.min(DEFAULT_HIGHEST_TRACKABLE_MICROS);
        let histogram = self.operations.entry(operation.to_string()).or_insert_with(|| {
            Histogram::new_with_bounds(
                DEFAULT_LOWEST_DISCERNIBLE_MICROS,
                DEFAULT_HIGHEST_TRACKABLE_MICROS,
                DEFAULT_SIGNIFICANT_FIGURES,
            )
            .ok()
        });
        if let Some(histogram) = histogram {
            let _ = histogram.record(clamped);
        }
    }

    #[must_use]
    pub fn get_latency_metrics(&self, operation: &str) -> Option<OperationLatencyMetrics> {
        let histogram = self.operations.get(operation)?.as_ref()?;
        if histogram.is_empty() {
            return None;
        }
        Some(OperationLatencyMetrics {
            average_ms: Some(histogram.mean() / MICROS_PER_MS),
            p50_ms: Some(histogram.value_at_percentile(50.0) as f64 / MICROS_PER_MS),
            p95_ms: Some(histogram.value_at_percentile(95.0) as f64 / MICROS_PER_MS),
            p99_ms: Some(histogram.value_at_percentile(99.0) as f64 / MICROS_PER_MS),
            sample_count: histogram.len(),
        })
    }
}

/// Times an operation and records it into a [`ServerMetrics`] latency tracker on drop
/// via an explicit `finish()` call (no `Drop` impl since recording is async).
pub struct OperationTimer {
    operation: String,
    start: Instant,
    metrics: Arc<ServerMetrics>,
}

impl OperationTimer {
    pub fn new(operation: &str, metrics: Arc<ServerMetrics>) -> Self {
        Self { operation: operation.to_string(), start: Instant::now(), metrics }
    }

    pub async fn finish(self) {
        let duration = self.start.elapsed();
        self.metrics.record_latency(&self.operation, duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn decrement_from_zero_does_not_underflow() {
        let metrics = ServerMetrics::new();
        for _ in 0..10 {
            metrics.decrement_active_connections();
        }
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.disconnections.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn concurrent_increment_then_decrement_settles_correctly() {
        let metrics = Arc::new(ServerMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..100 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                metrics.increment_connections();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 100);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                metrics.decrement_active_connections();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 50);
    }

    #[tokio::test]
    async fn latency_tracker_reports_percentiles() {
        let metrics = ServerMetrics::new();
        for ms in [10, 20, 30, 40, 50] {
            metrics.record_latency("rpc_dispatch", Duration::from_millis(ms)).await;
        }
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.rpc_dispatch_latency.sample_count, 5);
        assert!(snapshot.rpc_dispatch_latency.average_ms.unwrap() > 0.0);
    }
}
