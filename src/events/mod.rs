//! 事件模块
//!
//! 上传调度器向界面层推送的事件流
//! - `types.rs`: 上传项与队列事件类型
//! - `throttle.rs`: 进度事件节流，控制单次尝试的进度事件频率

mod throttle;
mod types;

pub use throttle::*;
pub use types::*;
