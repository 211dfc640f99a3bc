//! 反馈接收
//!
//! 反馈路径分两段，通过 `crossbeam-channel` 连接：
//! - 轮询：按周期向每个已注册舵机发送状态读取，解析后投递原始采样
//! - 接收：从通道取出原始采样，解码后写入缓存
//!
//! 读取失败不重试，缓存保留上一次的有效状态。

use crate::cache::ActuatorCache;
use crate::metrics::DriverMetrics;
use crate::periodic::run_periodic;
use crate::transport::ServoTransport;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use jointflow_protocol::{RawFeedback, ServoCommand, now_millis};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 单个采样的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 写入缓存
    Accepted,
    /// 温度或电压为 0，视为读取失败并丢弃
    Dropped,
    /// 舵机未注册
    Unknown,
}

/// 解码一个原始采样并写入缓存
pub fn ingest_sample(cache: &ActuatorCache, metrics: &DriverMetrics, raw: &RawFeedback) -> IngestOutcome {
    let sample = raw.decode();
    if !sample.is_valid_read() {
        metrics.feedback_dropped.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Dropping invalid read from {}: temperature={}, voltage={}",
            sample.id, sample.temperature, sample.voltage
        );
        return IngestOutcome::Dropped;
    }

    match cache.apply_feedback(&sample) {
        Ok(()) => {
            metrics.feedback_accepted.fetch_add(1, Ordering::Relaxed);
            IngestOutcome::Accepted
        },
        Err(_) => {
            trace!("Feedback for unregistered actuator {}", sample.id);
            IngestOutcome::Unknown
        },
    }
}

/// 接收循环
///
/// 通道关闭或 `is_running` 为 false 时退出。
pub fn ingest_loop(
    cache: Arc<ActuatorCache>,
    metrics: Arc<DriverMetrics>,
    rx: Receiver<RawFeedback>,
    is_running: Arc<AtomicBool>,
) {
    const RECV_TIMEOUT: Duration = Duration::from_millis(10);

    while is_running.load(Ordering::Acquire) {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(raw) => {
                ingest_sample(&cache, &metrics, &raw);
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Ingest: feedback channel disconnected");
                break;
            },
        }
    }

    trace!("Ingest loop exited");
}

/// 对所有已注册舵机执行一次状态读取
///
/// 返回成功投递的采样数。通道满时丢弃采样（下一轮会重新读取）。
pub fn poll_once(
    transport: &dyn ServoTransport,
    cache: &ActuatorCache,
    metrics: &DriverMetrics,
    tx: &Sender<RawFeedback>,
) -> usize {
    let mut delivered = 0;
    for id in cache.ids() {
        let block = match transport.query(&ServoCommand::read_feedback(id)) {
            Ok(block) => block,
            Err(e) => {
                metrics.feedback_read_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Feedback read failed for {}: {}", id, e);
                continue;
            },
        };

        let raw = match RawFeedback::from_present_block(id, &block, now_millis()) {
            Ok(raw) => raw,
            Err(e) => {
                metrics.feedback_read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Malformed feedback block from {}: {}", id, e);
                continue;
            },
        };

        match tx.try_send(raw) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                metrics.feedback_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Feedback channel full, dropping sample from {}", id);
            },
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    delivered
}

/// 轮询循环
pub fn poll_loop(
    transport: Arc<dyn ServoTransport>,
    cache: Arc<ActuatorCache>,
    metrics: Arc<DriverMetrics>,
    tx: Sender<RawFeedback>,
    period: Duration,
    is_running: Arc<AtomicBool>,
) {
    run_periodic("Feedback poll", period, &is_running, || {
        poll_once(transport.as_ref(), &cache, &metrics, &tx);
    });
}
