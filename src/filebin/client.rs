// filebin 客户端实现

use crate::config::ServerConfig;
use crate::filebin::{AdminAction, AdminOutcome, UploadError, UPLOAD_SUCCESS_STATUS};
use crate::uploader::{FileHandle, ProgressReporter};
use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::header::{HeaderValue, CACHE_CONTROL, CONTENT_LENGTH};
use reqwest::{Body, Client, RequestBuilder, Url};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// 请求体读取缓冲区大小（每读满一次上报一次进度）
const UPLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// 默认 User-Agent
const USER_AGENT: &str = concat!("filebin-upload/", env!("CARGO_PKG_VERSION"));

/// filebin 客户端
///
/// 负责上传请求和管理操作（删除/锁定/审批），均为单次请求，
/// 重试由上层调度器决定
#[derive(Debug, Clone)]
pub struct FilebinClient {
    /// HTTP客户端
    client: Client,
    /// 服务地址
    base_url: Url,
    /// 客户端/会话标识（CID 头）
    client_id: Option<String>,
}

impl FilebinClient {
    /// 创建新的客户端
    ///
    /// # 参数
    /// * `base_url` - 服务地址，如 `https://filebin.net`
    /// * `client_id` - 可选的客户端标识
    pub fn new(base_url: &str, client_id: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, client_id, Duration::from_secs(30))
    }

    /// 根据配置创建
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::with_timeout(
            &config.base_url,
            config.client_id.clone(),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn with_timeout(
        base_url: &str,
        client_id: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("无效的服务地址: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("服务地址不能作为基础路径: {}", base_url);
        }

        // 不设置整体超时：大文件上传耗时不可预期，卡住由停滞看门狗处理
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!("初始化 filebin 客户端: {}", base_url);

        Ok(Self {
            client,
            base_url,
            client_id,
        })
    }

    /// 按路径段拼接地址，每段单独编码
    fn segments_url(&self, segments: &[&str]) -> Option<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().ok()?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Some(url)
    }

    /// bin 页面地址（上传完成后的跳转目标）
    pub fn bin_url(&self, bin: &str) -> Option<Url> {
        self.segments_url(&[bin])
    }

    /// 上传地址：`<base>/<bin>/<filename>`
    pub fn file_url(&self, bin: &str, filename: &str) -> Option<Url> {
        self.segments_url(&[bin, filename])
    }

    /// 上传单个文件（一次尝试）
    ///
    /// 元数据通过请求头传递（Size/Bin/Filename/CID），请求体为原始文件字节，
    /// 服务器可以在接收请求体之前完成校验。只有 201 视为成功。
    pub async fn upload_file(
        &self,
        bin: &str,
        file: &FileHandle,
        progress: &ProgressReporter,
    ) -> Result<(), UploadError> {
        let url = self.file_url(bin, file.name()).ok_or_else(|| {
            UploadError::Local(format!("无法构造上传地址: bin={}, file={}", bin, file.name()))
        })?;

        let total = file.size();
        let reader = file
            .open()
            .await
            .map_err(|e| UploadError::Local(format!("{:#}", e)))?;

        debug!("上传文件: {} ({} bytes) -> {}", file.name(), total, url);

        let reporter = progress.clone();
        let mut sent: u64 = 0;
        let stream =
            ReaderStream::with_capacity(reader, UPLOAD_BUFFER_SIZE).inspect(move |chunk| {
                if let Ok(data) = chunk {
                    sent += data.len() as u64;
                    reporter.report(sent, total);
                }
            });

        let mut request = self
            .client
            .post(url)
            .header(CACHE_CONTROL, "no-cache")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(CONTENT_LENGTH, total)
            .header("Size", total)
            .header("Bin", bin);

        // 非 ASCII 文件名无法放入请求头，服务器以路径中的文件名为准
        if let Ok(value) = HeaderValue::from_str(file.name()) {
            request = request.header("Filename", value);
        }
        if let Some(ref cid) = self.client_id {
            request = request.header("CID", cid.as_str());
        }

        let response = request
            .body(Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    UploadError::Local(format!("构造上传请求失败: {}", e))
                } else {
                    UploadError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == UPLOAD_SUCCESS_STATUS {
            debug!("上传成功: {} -> bin {}", file.name(), bin);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            "上传响应异常: file={}, status={}, body={}",
            file.name(),
            status,
            body
        );

        Err(UploadError::from_response(status, body))
    }

    /// 删除（文件或 bin），`url` 可以是相对路径
    pub async fn delete_url(&self, url: &str) -> Result<AdminOutcome> {
        let target = self
            .base_url
            .join(url)
            .with_context(|| format!("无效的删除地址: {}", url))?;
        self.admin_request(AdminAction::Delete, self.client.delete(target))
            .await
    }

    /// 锁定 bin：`PUT /<bin>`
    pub async fn lock_bin(&self, bin: &str) -> Result<AdminOutcome> {
        let target = self
            .segments_url(&[bin])
            .with_context(|| format!("无法构造锁定地址: {}", bin))?;
        self.admin_request(AdminAction::Lock, self.client.put(target))
            .await
    }

    /// 审批 bin：`PUT /admin/approve/<bin>`
    pub async fn approve_bin(&self, bin: &str) -> Result<AdminOutcome> {
        let target = self
            .segments_url(&["admin", "approve", bin])
            .with_context(|| format!("无法构造审批地址: {}", bin))?;
        self.admin_request(AdminAction::Approve, self.client.put(target))
            .await
    }

    /// 执行管理请求（不重试）
    async fn admin_request(
        &self,
        action: AdminAction,
        request: RequestBuilder,
    ) -> Result<AdminOutcome> {
        info!("{}", action.in_progress_message());

        let response = request
            .send()
            .await
            .with_context(|| format!("{:?} 请求发送失败", action))?;

        let outcome = action.classify(response.status().as_u16());
        if outcome.success {
            info!("{:?}: {}", action, outcome.message);
        } else {
            warn!("{:?} 失败: {}", action, outcome.message);
        }

        Ok(outcome)
    }
}
