//! 上传停滞看门狗
//!
//! 检测单次上传尝试是否长时间没有进度
//!
//! 核心机制：
//! 1. 每收到一次进度回调就刷新最后进度时间
//! 2. 由调用方按 `check_interval` 周期调用 `check()`
//! 3. 距离最后进度超过 `stall_timeout` 时判定为停滞，由调用方中止本次尝试并走重试流程
//!
//! 看门狗与单次尝试同生命周期，尝试结束即随之销毁

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 默认检查间隔（秒）
pub const DEFAULT_STALL_CHECK_INTERVAL_SECS: u64 = 5;

/// 默认停滞阈值（秒）
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 30;

/// 停滞检测配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StallConfig {
    /// 检查间隔
    pub check_interval: Duration,
    /// 无进度超过此时长视为停滞
    pub stall_timeout: Duration,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_STALL_CHECK_INTERVAL_SECS),
            stall_timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
        }
    }
}

/// 上传停滞看门狗
#[derive(Debug)]
pub struct StallWatchdog {
    /// 最后一次收到进度的时间（尝试开始时即为起点）
    last_progress: Instant,
    /// 已收到的进度回调次数
    ticks: u64,
    /// 配置
    config: StallConfig,
}

impl StallWatchdog {
    /// 创建看门狗，计时从此刻开始
    pub fn new(config: StallConfig) -> Self {
        Self {
            last_progress: Instant::now(),
            ticks: 0,
            config,
        }
    }

    /// 检查间隔
    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    /// 记录一次进度，重置停滞计时
    pub fn record_progress(&mut self) {
        self.last_progress = Instant::now();
        self.ticks += 1;
    }

    /// 距离最后一次进度的时长
    pub fn idle_for(&self) -> Duration {
        self.last_progress.elapsed()
    }

    /// 检查是否停滞
    ///
    /// # 返回
    /// - `true`: 超过阈值没有进度，应中止当前尝试
    /// - `false`: 正常
    pub fn check(&self) -> bool {
        let idle = self.idle_for();

        if idle > self.config.stall_timeout {
            warn!(
                "⚠️ 上传停滞: {:.1}s 无进度 (阈值 {}s, 已收到 {} 次进度)",
                idle.as_secs_f64(),
                self.config.stall_timeout.as_secs(),
                self.ticks
            );
            return true;
        }

        debug!(
            "停滞检测: 空闲 {:.1}s / {}s",
            idle.as_secs_f64(),
            self.config.stall_timeout.as_secs()
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StallConfig {
        StallConfig {
            check_interval: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_default_config() {
        let config = StallConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.stall_timeout, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_stalled_before_timeout() {
        let watchdog = StallWatchdog::new(test_config());

        tokio::time::advance(Duration::from_secs(30)).await;
        // 恰好等于阈值不算停滞
        assert!(!watchdog.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_after_timeout() {
        let watchdog = StallWatchdog::new(test_config());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(watchdog.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_resets_timer() {
        let mut watchdog = StallWatchdog::new(test_config());

        tokio::time::advance(Duration::from_secs(25)).await;
        watchdog.record_progress();

        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(!watchdog.check());
        assert_eq!(watchdog.idle_for(), Duration::from_secs(25));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(watchdog.check());
    }
}
