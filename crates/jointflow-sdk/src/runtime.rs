//! 运动运行时
//!
//! 按配置装配整条流水线并持有所有后台线程：
//!
//! ```text
//! FrameSource ──► BlendScheduler ──► Blender ──► ServoOutput ──► CommandDispatcher ──► ServoTransport
//!                                                    ▲                                       │
//!                                                    │ DeadReckoner                          │ 轮询
//!                                              ActuatorCache ◄── ingest ◄── channel ◄────────┘
//!                                                    ▲
//!                                     SafetySupervisor（过热 / 空闲）──► EnableChange ──► TorqueEnable
//! ```
//!
//! 线程（启用后台循环时）：
//! - `jointflow-poll`: 周期读取每个舵机的状态块
//! - `jointflow-ingest`: 解码并写入缓存
//! - `jointflow-thermal` / `jointflow-idle`: 安全策略
//! - `jointflow-torque`: 把使能变化写到总线
//! - `jointflow-blend`: 融合调度
//!
//! 关闭时先停调度线程，再按启动的逆序停其余线程。

use crate::config::MotionConfig;
use crate::error::SdkError;
use crate::output::ServoOutput;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use jointflow_blend::{
    BlendScheduler, BlendStatsSnapshot, Blender, CombinerKind, FrameSource, JointId, OutputSink,
    PositionMap, PositionTargetSource, SchedulerHandle, SourceId, SourceRegistry, TickOutcome,
};
use jointflow_driver::{
    ActuatorCache, ActuatorState, CommandDispatcher, DriverError, DriverMetrics, DriverMetricsSnapshot,
    EnableChange, EnableChanges, IdleTimeoutPolicy, IngestOutcome, LoopHandle, SafetySupervisor,
    ServoTransport, ThermalPolicy, ingest_loop, ingest_sample, poll_loop, poll_once,
};
use jointflow_protocol::{ActuatorId, Register, ServoCommand, now_millis};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const FEEDBACK_CHANNEL_CAPACITY: usize = 256;
const ENABLE_CHANNEL_CAPACITY: usize = 64;

/// `ReturnDelayTime` 寄存器单位为 2µs
fn return_delay_byte(delay_us: u64) -> u8 {
    (delay_us / 2).min(254) as u8
}

/// 运行时构建器
pub struct MotionRuntimeBuilder {
    config: MotionConfig,
    transport: Option<Arc<dyn ServoTransport>>,
    background: bool,
}

impl MotionRuntimeBuilder {
    pub fn transport(mut self, transport: Arc<dyn ServoTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 是否启动后台线程（默认启动）
    ///
    /// 关闭后由调用方通过 [`MotionRuntime::tick`]、[`MotionRuntime::poll_feedback`]、
    /// [`MotionRuntime::check_interlocks`] 手动推进。
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// 校验配置、注册舵机、写入初始寄存器并启动线程
    ///
    /// # 错误
    /// - `SdkError::InvalidArgument`: 未设置传输层
    /// - `SdkError::Config`: 配置非法
    /// - `SdkError::Driver`: 初始寄存器写入失败，或线程创建失败
    pub fn start(self) -> Result<MotionRuntime, SdkError> {
        let config = self.config;
        config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| SdkError::InvalidArgument("motion runtime requires a servo transport".to_string()))?;

        let now = now_millis();
        let cache = Arc::new(ActuatorCache::new());
        let metrics = Arc::new(DriverMetrics::new());
        let mut joints = Vec::with_capacity(config.actuators.len());
        for (actuator, joint) in config.actuator_configs()? {
            cache.register(actuator, now)?;
            joints.push((joint, actuator.id));
        }

        let delay = return_delay_byte(config.servo.status_return_delay_us);
        for &(_, id) in &joints {
            let configure = ServoCommand::WriteData {
                id,
                start: Register::ReturnDelayTime,
                data: vec![delay],
            };
            transport.send(&configure).map_err(DriverError::from)?;
            transport.send(&ServoCommand::torque_enable(id, true)).map_err(DriverError::from)?;
        }

        let dispatcher =
            CommandDispatcher::new(cache.clone(), transport.clone(), config.dispatch_settings(), metrics.clone());
        let output = Arc::new(ServoOutput::new(cache.clone(), dispatcher, joints));
        let sink: Arc<dyn OutputSink> = output.clone();
        let blender = Blender::builder().combiner_kind(config.blend.combiner).output(sink).build()?;

        let registry = Arc::new(SourceRegistry::new());
        let scheduler = Arc::new(BlendScheduler::new(Duration::from_millis(config.blend.tick_interval_ms))?);
        scheduler.bind(Some(Arc::new(blender)), Some(registry.clone()));

        let thermal_policy =
            ThermalPolicy::new(config.thermal.max_run_temperature, config.thermal.cooldown_temperature)?;
        let idle_policy = match &config.idle {
            Some(idle) => {
                let mut policy = IdleTimeoutPolicy::new(idle.idle_disable_timeout_ms)?;
                for entry in &config.actuators {
                    if let Some(timeout) = entry.idle_timeout_ms {
                        policy = policy.with_timeout(ActuatorId::new(entry.id)?, timeout)?;
                    }
                }
                Some(policy)
            },
            None => None,
        };

        let mut thermal = SafetySupervisor::new(cache.clone(), thermal_policy, metrics.clone());
        let mut idle = idle_policy.map(|policy| SafetySupervisor::new(cache.clone(), policy, metrics.clone()));

        let mut loops = Vec::new();
        let mut scheduler_handle = None;
        let mut notifier = None;
        if self.background {
            let (enable_tx, enable_rx) = bounded(ENABLE_CHANNEL_CAPACITY);
            thermal = thermal.with_notifier(enable_tx.clone());
            idle = idle.map(|s| s.with_notifier(enable_tx.clone()));
            notifier = Some(enable_rx);
        }
        let thermal = Arc::new(thermal);
        let idle = idle.map(Arc::new);

        if let Some(enable_rx) = notifier {
            let (feedback_tx, feedback_rx) = bounded(FEEDBACK_CHANNEL_CAPACITY);
            let period = Duration::from_millis(config.servo.feedback_poll_interval_ms);
            {
                let (transport, cache, metrics) = (transport.clone(), cache.clone(), metrics.clone());
                loops.push(LoopHandle::spawn("jointflow-poll", move |is_running| {
                    poll_loop(transport, cache, metrics, feedback_tx, period, is_running)
                })?);
            }
            {
                let (cache, metrics) = (cache.clone(), metrics.clone());
                loops.push(LoopHandle::spawn("jointflow-ingest", move |is_running| {
                    ingest_loop(cache, metrics, feedback_rx, is_running)
                })?);
            }
            loops.push(thermal.clone().spawn(Duration::from_millis(config.thermal.check_interval_ms))?);
            if let (Some(idle), Some(section)) = (&idle, &config.idle) {
                loops.push(idle.clone().spawn(Duration::from_millis(section.check_interval_ms))?);
            }
            {
                let (transport, metrics) = (transport.clone(), metrics.clone());
                loops.push(LoopHandle::spawn("jointflow-torque", move |is_running| {
                    forward_enable_changes(transport.as_ref(), &metrics, &enable_rx, &is_running)
                })?);
            }
            scheduler_handle = Some(scheduler.clone().spawn()?);
        }

        info!(
            "Motion runtime started: {} actuators, tick {} ms, {:?} combiner, background {}",
            cache.len(),
            config.blend.tick_interval_ms,
            config.blend.combiner,
            self.background
        );

        Ok(MotionRuntime {
            config,
            cache,
            metrics,
            transport,
            output,
            registry,
            scheduler,
            thermal,
            idle,
            background: self.background,
            scheduler_handle,
            loops,
        })
    }
}

/// 把使能变化写成 TorqueEnable
fn forward_enable_changes(
    transport: &dyn ServoTransport,
    metrics: &DriverMetrics,
    rx: &Receiver<EnableChange>,
    is_running: &AtomicBool,
) {
    const RECV_TIMEOUT: Duration = Duration::from_millis(10);

    while is_running.load(Ordering::Acquire) {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(change) => apply_enable_change(transport, metrics, &change),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    trace!("Torque forwarder exited");
}

fn apply_enable_change(transport: &dyn ServoTransport, metrics: &DriverMetrics, change: &EnableChange) {
    if let Err(e) = transport.send(&ServoCommand::torque_enable(change.id, change.enabled)) {
        metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Failed to write torque enable for {}: {}", change.id, e);
    }
}

/// 运动运行时
pub struct MotionRuntime {
    config: MotionConfig,
    cache: Arc<ActuatorCache>,
    metrics: Arc<DriverMetrics>,
    transport: Arc<dyn ServoTransport>,
    output: Arc<ServoOutput>,
    registry: Arc<SourceRegistry>,
    scheduler: Arc<BlendScheduler>,
    thermal: Arc<SafetySupervisor<ThermalPolicy>>,
    idle: Option<Arc<SafetySupervisor<IdleTimeoutPolicy>>>,
    background: bool,
    scheduler_handle: Option<SchedulerHandle>,
    loops: Vec<LoopHandle>,
}

impl MotionRuntime {
    pub fn builder(config: MotionConfig) -> MotionRuntimeBuilder {
        MotionRuntimeBuilder {
            config,
            transport: None,
            background: true,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ActuatorCache> {
        &self.cache
    }

    /// 调度线程是否在运行
    pub fn is_running(&self) -> bool {
        self.scheduler_handle.as_ref().is_some_and(|h| h.is_running())
    }

    pub fn register_source(&self, source: Arc<dyn FrameSource>) -> SourceId {
        self.registry.register(source)
    }

    pub fn unregister_source(&self, id: SourceId) -> bool {
        self.registry.unregister(id)
    }

    /// 注册一个目标位置来源，速度单位为每毫秒归一化位移
    pub fn add_target_source(
        &self,
        velocity_per_ms: f64,
    ) -> Result<(SourceId, Arc<PositionTargetSource>), SdkError> {
        let reader: Arc<dyn OutputSink> = self.output.clone();
        let source = Arc::new(PositionTargetSource::new(velocity_per_ms, reader)?);
        let id = self.registry.register(source.clone());
        Ok((id, source))
    }

    /// 运行中切换组合策略
    pub fn set_combiner(&self, kind: CombinerKind) -> Result<(), SdkError> {
        let sink: Arc<dyn OutputSink> = self.output.clone();
        let blender = Blender::builder().combiner_kind(kind).output(sink).build()?;
        self.scheduler.set_blender(Some(Arc::new(blender)));
        debug!("Combiner switched to {:?}", kind);
        Ok(())
    }

    /// 手动执行一轮融合
    pub fn tick(&self, time_ms: u64) -> Result<TickOutcome, SdkError> {
        Ok(self.scheduler.tick(time_ms)?)
    }

    /// 同步读取一次所有舵机的反馈，返回被接受的采样数
    pub fn poll_feedback(&self) -> usize {
        let (tx, rx) = bounded(self.cache.len().max(1));
        poll_once(self.transport.as_ref(), &self.cache, &self.metrics, &tx);
        drop(tx);
        rx.iter()
            .filter(|raw| ingest_sample(&self.cache, &self.metrics, raw) == IngestOutcome::Accepted)
            .count()
    }

    /// 在给定时刻运行一轮安全策略，并把使能变化写到总线
    pub fn check_interlocks(&self, now_ms: u64) -> EnableChanges {
        let mut changes = self.thermal.tick(now_ms);
        if let Some(idle) = &self.idle {
            changes.extend(idle.tick(now_ms));
        }
        // 后台模式下由转发线程写总线
        if !self.background {
            for change in &changes {
                apply_enable_change(self.transport.as_ref(), &self.metrics, change);
            }
        }
        changes
    }

    /// 操作员使能/禁用一个关节
    ///
    /// 不会解除过热或空闲造成的禁用。返回之后的使能状态。
    pub fn set_enabled(&self, joint: JointId, enabled: bool) -> Result<bool, SdkError> {
        let id = self
            .output
            .actuator_for(joint)
            .ok_or_else(|| SdkError::InvalidArgument(format!("no actuator mapped to {}", joint)))?;
        let transition = self.cache.set_enabled(id, enabled)?;
        if transition.changed() {
            self.transport
                .send(&ServoCommand::torque_enable(id, transition.after))
                .map_err(DriverError::from)?;
        }
        Ok(transition.after)
    }

    /// 关节的当前位置估计
    pub fn positions(&self) -> Option<PositionMap> {
        self.output.current_positions()
    }

    pub fn actuator_state(&self, joint: JointId) -> Option<ActuatorState> {
        self.cache.get(self.output.actuator_for(joint)?)
    }

    /// 当前处于过热禁用中的舵机
    pub fn hot_actuators(&self) -> Vec<ActuatorId> {
        self.thermal.policy().hot_set()
    }

    pub fn metrics(&self) -> DriverMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn blend_stats(&self) -> BlendStatsSnapshot {
        self.scheduler.stats()
    }

    /// 停止所有线程（幂等）
    pub fn shutdown(&mut self) {
        if let Some(mut handle) = self.scheduler_handle.take() {
            handle.stop();
        }
        while let Some(mut handle) = self.loops.pop() {
            handle.stop();
            trace!("Stopped {}", handle.name());
        }
    }
}

impl Drop for MotionRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_delay_byte() {
        assert_eq!(return_delay_byte(0), 0);
        assert_eq!(return_delay_byte(250), 125);
        assert_eq!(return_delay_byte(508), 254);
        assert_eq!(return_delay_byte(u64::MAX), 254);
    }

    #[test]
    fn test_start_requires_transport() {
        let err = MotionRuntime::builder(MotionConfig::default()).start().err().unwrap();
        assert!(matches!(err, SdkError::InvalidArgument(_)));
    }
}
