//! 进度事件节流器
//!
//! 用于控制进度事件的发布频率，避免事件风暴
//! 每次上传尝试持有一个节流器，尝试结束即销毁

use std::time::Duration;
use tokio::time::Instant;

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 进度事件节流器
///
/// 典型用法：每次收到进度时调用 `should_emit()`，返回 true 时才发布事件；
/// 最后一次进度（100%）调用 `force_emit()`
///
/// 使用 tokio 时钟，测试中可以暂停时间
#[derive(Debug, Clone)]
pub struct ProgressThrottler {
    /// 上次发布事件的时间
    last_emit: Option<Instant>,
    /// 节流间隔
    interval: Duration,
}

impl ProgressThrottler {
    /// 创建新的节流器
    ///
    /// # 参数
    /// * `interval` - 最小发布间隔
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit: None,
            interval,
        }
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查是否应该发布事件
    ///
    /// 如果距离上次发布已超过节流间隔，返回 true 并更新时间戳
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// 强制发布（用于最后一次更新）
    pub fn force_emit(&mut self) -> bool {
        self.last_emit = Some(Instant::now());
        true
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_throttler_basic() {
        let mut throttler = ProgressThrottler::with_millis(100);

        // 第一次应该发布
        assert!(throttler.should_emit());

        // 立即再次调用，不应该发布
        assert!(!throttler.should_emit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttler_after_interval() {
        let mut throttler = ProgressThrottler::with_millis(50);

        assert!(throttler.should_emit());

        tokio::time::advance(Duration::from_millis(49)).await;
        assert!(!throttler.should_emit());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttler.should_emit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_emit_restarts_window() {
        let mut throttler = ProgressThrottler::with_millis(1000);

        assert!(throttler.should_emit());
        assert!(!throttler.should_emit());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(throttler.force_emit());

        // 强制发布同样占用一个窗口
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!throttler.should_emit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_window() {
        let mut throttler = ProgressThrottler::default();

        assert!(throttler.should_emit());
        tokio::time::advance(Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS - 1)).await;
        assert!(!throttler.should_emit());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttler.should_emit());
    }
}
