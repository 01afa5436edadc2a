//! 上传事件类型定义
//!
//! 调度器在上传项状态变化和队列计数变化时发布这些事件，
//! 由界面层（命令行输出或 JSON 流）负责渲染

use crate::filebin::FailureReason;
use crate::uploader::{OverallStatus, QueueCounters};
use serde::{Deserialize, Serialize};

/// 事件优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// 低优先级：进度更新
    Low = 0,
    /// 中优先级：状态变更、队列状态
    Medium = 1,
    /// 高优先级：完成、失败、跳转等关键事件
    High = 2,
}

/// 上传事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 上传项创建（入队）
    Created {
        item_id: String,
        file_name: String,
        total_size: u64,
        detail: String,
    },
    /// 进度更新
    Progress {
        item_id: String,
        bytes_sent: u64,
        total_size: u64,
        progress: f64,
        attempt: u32,
        detail: String,
    },
    /// 状态变更
    StatusChanged {
        item_id: String,
        old_status: String,
        new_status: String,
        detail: String,
    },
    /// 本次尝试失败，等待退避后重试
    Retrying {
        item_id: String,
        reason: FailureReason,
        error: String,
        next_attempt: u32,
        delay_ms: u64,
    },
    /// 上传完成
    Completed {
        item_id: String,
        completed_at: i64,
        detail: String,
    },
    /// 上传失败（终态）
    Failed {
        item_id: String,
        reason: FailureReason,
        error: String,
        detail: String,
    },
    /// 队列计数与整体状态
    QueueStatus {
        counters: QueueCounters,
        status: OverallStatus,
    },
    /// 全部上传成功后的跳转（每个调度器最多一次）
    Redirect { target: String },
}

impl UploadEvent {
    /// 获取上传项 ID（队列级事件没有）
    pub fn item_id(&self) -> Option<&str> {
        match self {
            UploadEvent::Created { item_id, .. }
            | UploadEvent::Progress { item_id, .. }
            | UploadEvent::StatusChanged { item_id, .. }
            | UploadEvent::Retrying { item_id, .. }
            | UploadEvent::Completed { item_id, .. }
            | UploadEvent::Failed { item_id, .. } => Some(item_id),
            UploadEvent::QueueStatus { .. } | UploadEvent::Redirect { .. } => None,
        }
    }

    /// 获取事件优先级
    pub fn priority(&self) -> EventPriority {
        match self {
            UploadEvent::Progress { .. } => EventPriority::Low,
            UploadEvent::StatusChanged { .. } | UploadEvent::QueueStatus { .. } => {
                EventPriority::Medium
            }
            UploadEvent::Created { .. }
            | UploadEvent::Retrying { .. }
            | UploadEvent::Completed { .. }
            | UploadEvent::Failed { .. }
            | UploadEvent::Redirect { .. } => EventPriority::High,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Created { .. } => "created",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::StatusChanged { .. } => "status_changed",
            UploadEvent::Retrying { .. } => "retrying",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Failed { .. } => "failed",
            UploadEvent::QueueStatus { .. } => "queue_status",
            UploadEvent::Redirect { .. } => "redirect",
        }
    }
}
