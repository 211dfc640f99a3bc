//! 周期循环与后台线程句柄
//!
//! 节拍与超时处理见 [`Pacer`]。

use crate::error::DriverError;
use jointflow_protocol::Pacer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// 以固定周期运行 `work`，直到 `is_running` 变为 false
pub fn run_periodic(name: &'static str, period: Duration, is_running: &AtomicBool, mut work: impl FnMut()) {
    let mut pacer = Pacer::new(name, period);

    while is_running.load(Ordering::Acquire) {
        work();
        pacer.wait();
    }

    trace!("{} loop exited", name);
}

/// 后台线程句柄
///
/// `stop()` 或 drop 时清除运行标志并等待线程退出。
#[derive(Debug)]
pub struct LoopHandle {
    name: String,
    is_running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// 启动命名线程，`body` 接收运行标志
    ///
    /// # 错误
    /// - `DriverError::Spawn`: 线程创建失败
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, DriverError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|e| DriverError::Spawn(format!("{}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            is_running,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 停止并等待线程退出
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("{} thread panicked", self.name);
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_loop_handle_runs_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut handle = LoopHandle::spawn("test", move |running| {
            run_periodic("test", Duration::from_millis(1), &running, || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        handle.stop();
        assert!(!handle.is_running());

        let after_stop = count.load(Ordering::Relaxed);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_overrun_delays_instead_of_overlapping() {
        let active = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (a, o) = (active.clone(), overlapped.clone());

        let handle = LoopHandle::spawn("overrun", move |running| {
            run_periodic("overrun", Duration::from_millis(1), &running, || {
                if a.swap(true, Ordering::SeqCst) {
                    o.store(true, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(3));
                a.store(false, Ordering::SeqCst);
            });
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        drop(handle);
        assert!(!overlapped.load(Ordering::SeqCst));
    }
}
