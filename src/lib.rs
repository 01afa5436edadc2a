// filebin 上传客户端核心库

// 🔥 公共模块（大小格式化、停滞检测）
pub mod common;

// 配置管理模块
pub mod config;

// 上传事件模块
pub mod events;

// filebin 接口模块
pub mod filebin;

// 日志模块
pub mod logging;

// 上传调度模块
pub mod uploader;

// 导出常用类型
pub use config::AppConfig;
pub use events::{EventPriority, ProgressThrottler, UploadEvent};
pub use filebin::{AdminAction, AdminOutcome, FailureReason, FilebinClient, UploadError};
pub use uploader::{
    FileHandle, OverallStatus, QueueCounters, RetryPolicy, SchedulerConfig, StatusSeverity,
    UploadItem, UploadItemStatus, UploadScheduler, UploadTransport,
};
