// 上传传输层
//
// 一次调用 = 一次上传尝试（一个 HTTP 请求/响应）
// 调度器通过该 trait 驱动传输，测试中可替换为模拟实现

use crate::filebin::{FilebinClient, UploadError};
use crate::uploader::FileHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// 单次上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// 上传项 ID
    pub item_id: String,
    /// 目标 bin
    pub bin: String,
    /// 文件句柄
    pub file: Arc<FileHandle>,
    /// 第几次尝试（从 0 开始）
    pub attempt: u32,
}

/// 进度回调数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// 已发送字节数
    pub bytes_sent: u64,
    /// 总字节数
    pub bytes_total: u64,
    /// 本次尝试开始至今的毫秒数
    pub elapsed_ms: u64,
}

/// 进度上报器
///
/// 传输层每发送一段数据调用一次 `report()`，接收端负责刷新停滞看门狗
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<TransferProgress>,
    started_at: Instant,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<TransferProgress>) -> Self {
        Self {
            tx,
            started_at: Instant::now(),
        }
    }

    /// 创建上报器及其接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// 上报进度（接收端已关闭时静默丢弃）
    pub fn report(&self, bytes_sent: u64, bytes_total: u64) {
        let _ = self.tx.send(TransferProgress {
            bytes_sent,
            bytes_total,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        });
    }
}

/// 上传传输层抽象
///
/// 返回 `Ok(())` 表示服务器返回 201；其余情况均为 `Err`
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<(), UploadError>;
}

#[async_trait]
impl UploadTransport for FilebinClient {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<(), UploadError> {
        self.upload_file(&request.bin, &request.file, &progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_progress_reporter_elapsed() {
        let (reporter, mut rx) = ProgressReporter::channel();

        reporter.report(0, 100);
        tokio::time::advance(Duration::from_millis(250)).await;
        reporter.report(50, 100);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.bytes_sent, 0);
        assert_eq!(first.elapsed_ms, 0);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.bytes_sent, 50);
        assert_eq!(second.bytes_total, 100);
        assert_eq!(second.elapsed_ms, 250);
    }

    #[tokio::test]
    async fn test_progress_reporter_closed_receiver() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        // 接收端关闭不应 panic
        reporter.report(1, 1);
    }
}
