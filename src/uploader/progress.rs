// 上传进度汇总
//
// 维护队列计数，每次计数变化后重新计算整体状态文本与级别，
// 全部完成时触发一次跳转（最多一次）

use crate::common::{readable_file_size, transfer_rate};
use crate::filebin::{FailureReason, UploadError};
use crate::uploader::TransferProgress;
use serde::{Deserialize, Serialize};

/// 队列计数
///
/// 不变量：completed + failed + uploading + waiting == queued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    /// 累计入队数
    pub queued: u64,
    /// 正在上传（占用并发槽位）
    pub uploading: u64,
    /// 已完成
    pub completed: u64,
    /// 已失败
    pub failed: u64,
}

impl QueueCounters {
    /// 尚未占用槽位的上传项（等待中 + 退避中）
    pub fn waiting(&self) -> u64 {
        self.queued
            .saturating_sub(self.completed + self.failed + self.uploading)
    }

    /// 所有上传项都已进入终态
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.queued
    }
}

/// 状态级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSeverity {
    Info,
    Success,
    Danger,
}

/// 整体状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallStatus {
    pub severity: StatusSeverity,
    pub message: String,
}

/// 进度汇总器
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    counters: QueueCounters,
    /// 全部完成后的跳转目标
    redirect_target: Option<String>,
    /// 跳转是否已触发
    redirect_fired: bool,
}

impl ProgressAggregator {
    pub fn new(redirect_target: Option<String>) -> Self {
        Self {
            counters: QueueCounters::default(),
            redirect_target,
            redirect_fired: false,
        }
    }

    pub fn counters(&self) -> QueueCounters {
        self.counters
    }

    pub fn redirect_fired(&self) -> bool {
        self.redirect_fired
    }

    /// 新文件入队
    pub fn on_enqueued(&mut self, count: u64) {
        self.counters.queued += count;
    }

    /// 上传项获得槽位
    pub fn on_admitted(&mut self) {
        debug_assert!(self.counters.waiting() > 0);
        self.counters.uploading += 1;
    }

    /// 上传项释放槽位进入退避，重新计入等待
    pub fn on_retry_scheduled(&mut self) {
        self.counters.uploading = self.counters.uploading.saturating_sub(1);
    }

    pub fn on_completed(&mut self) {
        self.counters.uploading = self.counters.uploading.saturating_sub(1);
        self.counters.completed += 1;
    }

    pub fn on_failed(&mut self) {
        self.counters.uploading = self.counters.uploading.saturating_sub(1);
        self.counters.failed += 1;
    }

    /// 计算整体状态
    pub fn status(&self) -> OverallStatus {
        let c = &self.counters;
        let mut message = format!(
            "{} of {} file{} uploaded",
            c.completed,
            c.queued,
            if c.queued == 1 { "" } else { "s" }
        );

        let severity = if c.failed > 0 {
            message.push_str(&format!(". {} failed.", c.failed));
            StatusSeverity::Danger
        } else if c.queued > 0 && c.completed == c.queued {
            message.push_str(", all done!");
            StatusSeverity::Success
        } else {
            StatusSeverity::Info
        };

        if !c.is_settled() {
            message.push_str("... please wait.");
        }

        OverallStatus { severity, message }
    }

    /// 全部成功时返回跳转目标，只返回一次
    ///
    /// 未配置跳转目标时同样标记为已触发，返回 None
    pub fn take_redirect(&mut self) -> Option<String> {
        if self.redirect_fired || self.status().severity != StatusSeverity::Success {
            return None;
        }
        self.redirect_fired = true;
        self.redirect_target.clone()
    }
}

/// 上传中的展示文本
pub fn transfer_detail(tick: &TransferProgress, total_size: u64) -> String {
    let size = readable_file_size(total_size);

    if tick.bytes_total > 0 && tick.bytes_sent >= tick.bytes_total {
        return format!("Server side processing... ({})", size);
    }
    if tick.bytes_sent == 0 {
        return format!("({})", size);
    }

    let percent = if tick.bytes_total > 0 {
        tick.bytes_sent as f64 / tick.bytes_total as f64 * 100.0
    } else {
        0.0
    };

    match transfer_rate(tick.bytes_sent, tick.elapsed_ms) {
        Some(rate) => format!("Uploading at {} ({:.2}% of {})", rate, percent, size),
        None => format!("Uploading... ({})", size),
    }
}

/// 终态失败的展示说明（不含文件大小）
pub fn failure_message(error: &UploadError) -> String {
    match error.reason() {
        FailureReason::Stalled => "Upload stalled".to_string(),
        FailureReason::NetworkError => "Upload failed".to_string(),
        _ => match error.body() {
            Some(body) if !body.trim().is_empty() => body.trim().to_string(),
            _ => error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_invariant() {
        let mut agg = ProgressAggregator::new(None);
        agg.on_enqueued(5);
        assert_eq!(agg.counters().waiting(), 5);

        agg.on_admitted();
        agg.on_admitted();
        assert_eq!(agg.counters().uploading, 2);
        assert_eq!(agg.counters().waiting(), 3);

        agg.on_completed();
        agg.on_retry_scheduled();
        let c = agg.counters();
        assert_eq!(c.completed, 1);
        assert_eq!(c.uploading, 0);
        assert_eq!(c.completed + c.failed + c.uploading + c.waiting(), c.queued);
    }

    #[test]
    fn test_status_in_progress() {
        let mut agg = ProgressAggregator::new(None);
        agg.on_enqueued(2);
        agg.on_admitted();
        agg.on_completed();

        let status = agg.status();
        assert_eq!(status.severity, StatusSeverity::Info);
        assert_eq!(status.message, "1 of 2 files uploaded... please wait.");
    }

    #[test]
    fn test_status_success_and_single_redirect() {
        let mut agg = ProgressAggregator::new(Some("https://filebin.example/mybin".to_string()));
        agg.on_enqueued(1);
        assert_eq!(agg.take_redirect(), None);

        agg.on_admitted();
        agg.on_completed();

        let status = agg.status();
        assert_eq!(status.severity, StatusSeverity::Success);
        assert_eq!(status.message, "1 of 1 file uploaded, all done!");

        assert_eq!(
            agg.take_redirect().as_deref(),
            Some("https://filebin.example/mybin")
        );
        // 重复计算不会再次触发
        assert_eq!(agg.take_redirect(), None);
        assert!(agg.redirect_fired());
    }

    #[test]
    fn test_status_danger_on_failure() {
        let mut agg = ProgressAggregator::new(Some("/mybin".to_string()));
        agg.on_enqueued(3);
        agg.on_admitted();
        agg.on_failed();

        let status = agg.status();
        assert_eq!(status.severity, StatusSeverity::Danger);
        assert_eq!(status.message, "0 of 3 files uploaded. 1 failed.... please wait.");

        agg.on_admitted();
        agg.on_completed();
        agg.on_admitted();
        agg.on_completed();
        let status = agg.status();
        assert_eq!(status.severity, StatusSeverity::Danger);
        assert_eq!(status.message, "2 of 3 files uploaded. 1 failed.");
        // 有失败时不跳转
        assert_eq!(agg.take_redirect(), None);
        assert!(!agg.redirect_fired());
    }

    #[test]
    fn test_empty_queue_is_info() {
        let agg = ProgressAggregator::new(None);
        let status = agg.status();
        assert_eq!(status.severity, StatusSeverity::Info);
        assert_eq!(status.message, "0 of 0 files uploaded");
    }

    #[test]
    fn test_transfer_detail() {
        let tick = |sent, elapsed| TransferProgress {
            bytes_sent: sent,
            bytes_total: 2048,
            elapsed_ms: elapsed,
        };

        assert_eq!(transfer_detail(&tick(0, 0), 2048), "(2.0kB)");
        assert_eq!(transfer_detail(&tick(1024, 0), 2048), "Uploading... (2.0kB)");
        assert_eq!(
            transfer_detail(&tick(1024, 1), 2048),
            "Uploading at 1.0MB/s (50.00% of 2.0kB)"
        );
        assert_eq!(
            transfer_detail(&tick(2048, 10), 2048),
            "Server side processing... (2.0kB)"
        );
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(
            failure_message(&UploadError::Stalled { idle_secs: 35 }),
            "Upload stalled"
        );
        assert_eq!(
            failure_message(&UploadError::Network("reset".to_string())),
            "Upload failed"
        );
        assert_eq!(
            failure_message(&UploadError::Client {
                status: 403,
                body: "The bin is locked\n".to_string()
            }),
            "The bin is locked"
        );
        assert_eq!(
            failure_message(&UploadError::Server {
                status: 502,
                body: String::new()
            }),
            "服务器错误 502: "
        );
    }
}
