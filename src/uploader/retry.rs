// 上传重试策略
//
// 纯决策：根据失败原因和当前尝试次数决定是否重试以及退避时长
// 退避公式：min(base * 2^attempt, cap) + [0, jitter] 的随机抖动

use crate::filebin::FailureReason;
use rand::Rng;
use std::time::Duration;

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 初始退避延迟（毫秒）
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// 最大退避延迟（毫秒）
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// 最大随机抖动（毫秒）
pub const MAX_JITTER_MS: u64 = 500;

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待 `delay` 后以 `next_attempt` 重新排队
    Retry { next_attempt: u32, delay: Duration },
    /// 放弃，上传项进入失败状态
    GiveUp,
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            jitter_ms: MAX_JITTER_MS,
        }
    }
}

impl RetryPolicy {
    /// 不带抖动的退避延迟（毫秒）
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        self.initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_backoff_ms)
    }

    /// 带随机抖动的退避延迟
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }

    /// 是否还能重试
    pub fn should_retry(&self, attempt: u32, reason: FailureReason) -> bool {
        reason.is_retriable() && attempt < self.max_retries
    }

    /// 决定失败后的处理方式
    ///
    /// # 参数
    /// * `attempt` - 刚刚失败的尝试序号（从 0 开始）
    /// * `reason` - 失败原因
    pub fn decide(&self, attempt: u32, reason: FailureReason) -> RetryDecision {
        if self.should_retry(attempt, reason) {
            RetryDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.backoff_delay(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
