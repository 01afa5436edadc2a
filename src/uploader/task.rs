// 上传项定义
//
// 每个入队文件对应唯一一个上传项，状态机：
// Pending -> Uploading -> {Completed | Failed | Retrying}
// Retrying -> Uploading（次数受重试策略限制）

use crate::common::readable_file_size;
use crate::filebin::FailureReason;
use crate::uploader::FileHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 上传项状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadItemStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 退避等待重试
    Retrying,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl UploadItemStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadItemStatus::Completed | UploadItemStatus::Failed)
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(&self, next: UploadItemStatus) -> bool {
        use UploadItemStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Uploading, Retrying)
                | (Retrying, Uploading)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadItemStatus::Pending => "pending",
            UploadItemStatus::Uploading => "uploading",
            UploadItemStatus::Retrying => "retrying",
            UploadItemStatus::Completed => "completed",
            UploadItemStatus::Failed => "failed",
        }
    }
}

/// 上传项
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// 上传项ID
    pub id: String,
    /// 文件句柄（与调用方共享）
    pub file: Arc<FileHandle>,
    /// 当前状态
    pub status: UploadItemStatus,
    /// 当前尝试序号，从 0 开始，每次重试加 1
    pub attempt: u32,
    /// 本次尝试已发送字节数
    pub uploaded_size: u64,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 首次开始上传时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    /// 最近一次失败原因
    pub last_failure: Option<FailureReason>,
    /// 终态失败时的错误信息
    pub error: Option<String>,
    /// 展示文本，如 "Uploading at 1.2MB/s (40.00% of 3.0MB)"
    pub detail: String,
}

impl UploadItem {
    /// 创建新的上传项
    pub fn new(file: Arc<FileHandle>) -> Self {
        let detail = format!("Pending ({})", readable_file_size(file.size()));
        Self {
            id: Uuid::new_v4().to_string(),
            file,
            status: UploadItemStatus::Pending,
            attempt: 0,
            uploaded_size: 0,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            last_failure: None,
            error: None,
            detail,
        }
    }

    pub fn file_name(&self) -> &str {
        self.file.name()
    }

    pub fn total_size(&self) -> u64 {
        self.file.size()
    }

    /// 可读的文件大小
    pub fn readable_size(&self) -> String {
        readable_file_size(self.file.size())
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_size() == 0 {
            return 0.0;
        }
        (self.uploaded_size as f64 / self.total_size() as f64) * 100.0
    }

    /// 标记为上传中（每次尝试开始时调用）
    pub fn mark_uploading(&mut self) {
        debug_assert!(self.status.can_transition_to(UploadItemStatus::Uploading));
        self.status = UploadItemStatus::Uploading;
        self.uploaded_size = 0;
        self.detail = format!("({})", self.readable_size());
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为等待重试
    pub fn mark_retrying(&mut self, reason: FailureReason, next_attempt: u32) {
        debug_assert!(self.status.can_transition_to(UploadItemStatus::Retrying));
        self.status = UploadItemStatus::Retrying;
        self.attempt = next_attempt;
        self.uploaded_size = 0;
        self.last_failure = Some(reason);
        self.detail = format!("Retrying... ({})", self.readable_size());
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        debug_assert!(self.status.can_transition_to(UploadItemStatus::Completed));
        self.status = UploadItemStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.uploaded_size = self.total_size();
        self.detail = format!("Complete ({})", self.readable_size());
    }

    /// 标记为失败
    ///
    /// # 参数
    /// * `reason` - 失败原因
    /// * `message` - 展示给用户的失败说明（如服务器返回的响应体）
    pub fn mark_failed(&mut self, reason: FailureReason, message: String) {
        debug_assert!(self.status.can_transition_to(UploadItemStatus::Failed));
        self.status = UploadItemStatus::Failed;
        self.last_failure = Some(reason);
        self.detail = format!("{} ({})", message, self.readable_size());
        self.error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item(size: usize) -> UploadItem {
        UploadItem::new(Arc::new(FileHandle::from_bytes("test.bin", vec![0u8; size])))
    }

    #[test]
    fn test_item_creation() {
        let item = test_item(1024);

        assert_eq!(item.status, UploadItemStatus::Pending);
        assert_eq!(item.attempt, 0);
        assert_eq!(item.uploaded_size, 0);
        assert_eq!(item.progress(), 0.0);
        assert_eq!(item.detail, "Pending (1.0kB)");
        assert!(item.started_at.is_none());
    }

    #[test]
    fn test_progress_calculation() {
        let mut item = test_item(1000);

        item.uploaded_size = 250;
        assert_eq!(item.progress(), 25.0);

        item.uploaded_size = 1000;
        assert_eq!(item.progress(), 100.0);

        let empty = test_item(0);
        assert_eq!(empty.progress(), 0.0);
    }

    #[test]
    fn test_retry_loop_transitions() {
        let mut item = test_item(1000);

        item.mark_uploading();
        assert_eq!(item.status, UploadItemStatus::Uploading);
        assert!(item.started_at.is_some());

        item.uploaded_size = 500;
        item.mark_retrying(FailureReason::ServerError5xx, 1);
        assert_eq!(item.status, UploadItemStatus::Retrying);
        assert_eq!(item.attempt, 1);
        assert_eq!(item.uploaded_size, 0);
        assert_eq!(item.last_failure, Some(FailureReason::ServerError5xx));
        assert_eq!(item.detail, "Retrying... (1.0kB)");

        item.mark_uploading();
        item.mark_completed();
        assert_eq!(item.status, UploadItemStatus::Completed);
        assert_eq!(item.uploaded_size, item.total_size());
        assert!(item.completed_at.is_some());
        assert_eq!(item.detail, "Complete (1.0kB)");
    }

    #[test]
    fn test_mark_failed_keeps_message() {
        let mut item = test_item(2048);
        item.mark_uploading();
        item.mark_failed(FailureReason::ClientError, "The bin is locked".to_string());

        assert_eq!(item.status, UploadItemStatus::Failed);
        assert_eq!(item.error.as_deref(), Some("The bin is locked"));
        assert_eq!(item.detail, "The bin is locked (2.0kB)");
    }

    #[test]
    fn test_transition_table() {
        use UploadItemStatus::*;

        assert!(Pending.can_transition_to(Uploading));
        assert!(Retrying.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Retrying));

        // 终态不可离开
        assert!(!Completed.can_transition_to(Uploading));
        assert!(!Failed.can_transition_to(Uploading));
        assert!(!Failed.can_transition_to(Retrying));
        // 不能跳过上传直接完成
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Retrying.can_transition_to(Failed));

        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Retrying.is_terminal());
    }
}
