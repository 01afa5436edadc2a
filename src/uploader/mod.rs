// 上传调度模块
//
// - `file.rs`: 待上传文件句柄
// - `task.rs`: 上传项状态机
// - `retry.rs`: 重试策略（退避 + 抖动）
// - `transport.rs`: 传输层抽象与进度上报
// - `progress.rs`: 队列计数与整体状态
// - `scheduler.rs`: 并发闸门 + 等待队列

pub mod file;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod task;
pub mod transport;

pub use crate::filebin::FailureReason;
pub use file::{FileHandle, FileReader};
pub use progress::{
    failure_message, transfer_detail, OverallStatus, ProgressAggregator, QueueCounters,
    StatusSeverity,
};
pub use retry::{
    RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_JITTER_MS,
};
pub use scheduler::{
    SchedulerConfig, UploadScheduler, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_POLL_INTERVAL_MS,
};
pub use task::{UploadItem, UploadItemStatus};
pub use transport::{ProgressReporter, TransferProgress, UploadRequest, UploadTransport};
