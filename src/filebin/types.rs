// filebin 接口类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 上传成功的唯一状态码（201 Created）
pub const UPLOAD_SUCCESS_STATUS: u16 = 201;

/// 上传失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// 传输层错误，没有响应（可重试）
    NetworkError,
    /// 服务器 5xx（可重试）
    ServerError5xx,
    /// 服务器拒绝，如校验失败或冲突（不可重试）
    ClientError,
    /// 超过阈值没有进度（可重试）
    Stalled,
}

impl FailureReason {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FailureReason::NetworkError | FailureReason::ServerError5xx | FailureReason::Stalled
        )
    }

    /// 根据 HTTP 状态码分类（仅用于非 201 响应）
    pub fn from_status(status: u16) -> Self {
        if (500..600).contains(&status) {
            FailureReason::ServerError5xx
        } else {
            FailureReason::ClientError
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NetworkError => "network error",
            FailureReason::ServerError5xx => "server error",
            FailureReason::ClientError => "rejected",
            FailureReason::Stalled => "stalled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次上传尝试的失败结果
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// 连接重置、DNS 失败等
    #[error("网络错误: {0}")]
    Network(String),
    /// 服务器 5xx
    #[error("服务器错误 {status}: {body}")]
    Server { status: u16, body: String },
    /// 其他非 201 响应，响应体直接展示给用户
    #[error("{body}")]
    Client { status: u16, body: String },
    /// 看门狗判定停滞
    #[error("上传停滞: {idle_secs}s 无进度")]
    Stalled { idle_secs: u64 },
    /// 本地文件无法读取（不可重试）
    #[error("读取本地文件失败: {0}")]
    Local(String),
}

impl UploadError {
    /// 根据非 201 响应构造错误
    pub fn from_response(status: u16, body: String) -> Self {
        match FailureReason::from_status(status) {
            FailureReason::ServerError5xx => UploadError::Server { status, body },
            _ => UploadError::Client { status, body },
        }
    }

    /// 映射到重试策略使用的失败原因
    pub fn reason(&self) -> FailureReason {
        match self {
            UploadError::Network(_) => FailureReason::NetworkError,
            UploadError::Server { .. } => FailureReason::ServerError5xx,
            UploadError::Client { .. } | UploadError::Local(_) => FailureReason::ClientError,
            UploadError::Stalled { .. } => FailureReason::Stalled,
        }
    }

    /// 响应状态码（传输层错误没有状态码）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Server { status, .. } | UploadError::Client { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// 服务器返回的响应体
    pub fn body(&self) -> Option<&str> {
        match self {
            UploadError::Server { body, .. } | UploadError::Client { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// 管理操作类型（单次请求，不重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    /// DELETE <url>
    Delete,
    /// PUT /<bin>
    Lock,
    /// PUT /admin/approve/<bin>
    Approve,
}

impl AdminAction {
    /// 视为"已达到目标状态"的状态码
    pub fn already_done_status(&self) -> u16 {
        match self {
            AdminAction::Delete => 404,
            AdminAction::Lock | AdminAction::Approve => 409,
        }
    }

    /// 操作进行中的提示
    pub fn in_progress_message(&self) -> &'static str {
        match self {
            AdminAction::Delete => "Delete operation in progress ...",
            AdminAction::Lock => "Lock operation in progress ...",
            AdminAction::Approve => "Approve operation in progress ...",
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            AdminAction::Delete => "Delete operation completed successfully.",
            AdminAction::Lock => "Lock operation completed successfully.",
            AdminAction::Approve => "Approved successfully.",
        }
    }

    fn already_done_message(&self) -> &'static str {
        match self {
            AdminAction::Delete => "Delete operation already completed.",
            AdminAction::Lock => "The bin is already locked.",
            AdminAction::Approve => "The bin is already approved.",
        }
    }

    /// 根据响应状态码判定结果
    ///
    /// 200 成功；404（删除）/ 409（锁定、审批）说明目标状态已达成，同样视为成功
    pub fn classify(&self, status: u16) -> AdminOutcome {
        let (success, message) = if status == 200 {
            (true, self.success_message().to_string())
        } else if status == self.already_done_status() {
            (true, self.already_done_message().to_string())
        } else {
            (
                false,
                format!("Error {}. Unable to verify the operation.", status),
            )
        };

        AdminOutcome {
            action: *self,
            status,
            success,
            message,
        }
    }
}

/// 管理操作结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOutcome {
    pub action: AdminAction,
    pub status: u16,
    pub success: bool,
    /// 展示给用户的提示
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_retriable() {
        assert!(FailureReason::NetworkError.is_retriable());
        assert!(FailureReason::ServerError5xx.is_retriable());
        assert!(FailureReason::Stalled.is_retriable());
        assert!(!FailureReason::ClientError.is_retriable());
    }

    #[test]
    fn test_upload_error_from_response() {
        let err = UploadError::from_response(503, "busy".to_string());
        assert_eq!(err.reason(), FailureReason::ServerError5xx);
        assert_eq!(err.status(), Some(503));

        let err = UploadError::from_response(403, "bin is locked".to_string());
        assert_eq!(err.reason(), FailureReason::ClientError);
        assert_eq!(err.to_string(), "bin is locked");

        // 2xx 但不是 201 同样是失败
        let err = UploadError::from_response(200, String::new());
        assert_eq!(err.reason(), FailureReason::ClientError);
    }

    #[test]
    fn test_local_error_not_retriable() {
        let err = UploadError::Local("permission denied".to_string());
        assert!(!err.reason().is_retriable());
        assert_eq!(err.status(), None);
        assert_eq!(err.body(), None);
    }

    #[test]
    fn test_admin_classify_delete() {
        let ok = AdminAction::Delete.classify(200);
        assert!(ok.success);
        assert_eq!(ok.message, "Delete operation completed successfully.");

        let gone = AdminAction::Delete.classify(404);
        assert!(gone.success);
        assert_eq!(gone.message, "Delete operation already completed.");

        // 409 对删除不是"已完成"
        let conflict = AdminAction::Delete.classify(409);
        assert!(!conflict.success);
        assert_eq!(conflict.message, "Error 409. Unable to verify the operation.");
    }

    #[test]
    fn test_admin_classify_lock_and_approve() {
        assert!(AdminAction::Lock.classify(200).success);
        let locked = AdminAction::Lock.classify(409);
        assert!(locked.success);
        assert_eq!(locked.message, "The bin is already locked.");
        assert!(!AdminAction::Lock.classify(404).success);

        let approved = AdminAction::Approve.classify(409);
        assert!(approved.success);
        assert_eq!(approved.message, "The bin is already approved.");
        assert!(!AdminAction::Approve.classify(500).success);
    }
}
