//! 公共模块
//!
//! 提供跨模块使用的通用组件

mod size_format;
mod stall_watchdog;

pub use size_format::{humanize_rate, readable_file_size, transfer_rate};
pub use stall_watchdog::{
    StallConfig, StallWatchdog, DEFAULT_STALL_CHECK_INTERVAL_SECS, DEFAULT_STALL_TIMEOUT_SECS,
};
