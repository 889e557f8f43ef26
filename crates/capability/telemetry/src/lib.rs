//! 日志初始化与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub points_published: u64,
    pub publish_failure: u64,
    pub dropped_duplicate: u64,
    pub dropped_unmapped: u64,
    pub listener_start_success: u64,
    pub listener_start_failure: u64,
    pub listener_stop_failure: u64,
    pub lifecycle_commands: u64,
}

/// 从站模拟计数指标。
pub struct SlaveMetrics {
    points_published: AtomicU64,
    publish_failure: AtomicU64,
    dropped_duplicate: AtomicU64,
    dropped_unmapped: AtomicU64,
    listener_start_success: AtomicU64,
    listener_start_failure: AtomicU64,
    listener_stop_failure: AtomicU64,
    lifecycle_commands: AtomicU64,
}

impl SlaveMetrics {
    pub fn new() -> Self {
        Self {
            points_published: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
            dropped_duplicate: AtomicU64::new(0),
            dropped_unmapped: AtomicU64::new(0),
            listener_start_success: AtomicU64::new(0),
            listener_start_failure: AtomicU64::new(0),
            listener_stop_failure: AtomicU64::new(0),
            lifecycle_commands: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            points_published: self.points_published.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
            dropped_duplicate: self.dropped_duplicate.load(Ordering::Relaxed),
            dropped_unmapped: self.dropped_unmapped.load(Ordering::Relaxed),
            listener_start_success: self.listener_start_success.load(Ordering::Relaxed),
            listener_start_failure: self.listener_start_failure.load(Ordering::Relaxed),
            listener_stop_failure: self.listener_stop_failure.load(Ordering::Relaxed),
            lifecycle_commands: self.lifecycle_commands.load(Ordering::Relaxed),
        }
    }
}

impl Default for SlaveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<SlaveMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static SlaveMetrics {
    METRICS.get_or_init(SlaveMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录点位推送次数。
pub fn record_point_published() {
    metrics().points_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录点位推送失败次数。
pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录等值写入丢弃次数。
pub fn record_dropped_duplicate() {
    metrics().dropped_duplicate.fetch_add(1, Ordering::Relaxed);
}

/// 记录未映射偏移丢弃次数。
pub fn record_dropped_unmapped() {
    metrics().dropped_unmapped.fetch_add(1, Ordering::Relaxed);
}

/// 记录监听器启动结果。
pub fn record_listener_start(success: bool) {
    let metrics = metrics();
    if success {
        metrics
            .listener_start_success
            .fetch_add(1, Ordering::Relaxed);
    } else {
        metrics
            .listener_start_failure
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录监听器停止失败次数。
pub fn record_listener_stop_failure() {
    metrics()
        .listener_stop_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录生命周期命令执行次数。
pub fn record_lifecycle_command() {
    metrics().lifecycle_commands.fetch_add(1, Ordering::Relaxed);
}
