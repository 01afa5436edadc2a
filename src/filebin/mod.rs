// filebin 接口模块
//
// - `client.rs`: HTTP 客户端（上传、删除、锁定、审批）
// - `types.rs`: 错误分类与管理操作结果

pub mod client;
pub mod types;

pub use client::FilebinClient;
pub use types::{AdminAction, AdminOutcome, FailureReason, UploadError, UPLOAD_SUCCESS_STATUS};
