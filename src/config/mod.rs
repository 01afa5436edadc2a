// 配置管理模块

use crate::common::StallConfig;
use crate::uploader::{RetryPolicy, SchedulerConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// filebin 服务地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 客户端标识（CID 请求头）
    #[serde(default)]
    pub client_id: Option<String>,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://filebin.net".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_id: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 最大同时上传文件数
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// 最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 初始退避延迟（毫秒）
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 最大退避延迟（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 退避随机抖动上限（毫秒）
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// 停滞检查间隔（秒）
    #[serde(default = "default_stall_check_interval_secs")]
    pub stall_check_interval_secs: u64,
    /// 停滞阈值（秒）
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// 队列轮询间隔（毫秒）
    #[serde(default = "default_queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,
    /// 进度事件节流间隔（毫秒）
    #[serde(default = "default_progress_throttle_ms")]
    pub progress_throttle_ms: u64,
}

fn default_max_concurrent_tasks() -> usize {
    crate::uploader::DEFAULT_CONCURRENCY_LIMIT
}

fn default_max_retries() -> u32 {
    crate::uploader::DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    crate::uploader::INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    crate::uploader::MAX_BACKOFF_MS
}

fn default_jitter_ms() -> u64 {
    crate::uploader::MAX_JITTER_MS
}

fn default_stall_check_interval_secs() -> u64 {
    crate::common::DEFAULT_STALL_CHECK_INTERVAL_SECS
}

fn default_stall_timeout_secs() -> u64 {
    crate::common::DEFAULT_STALL_TIMEOUT_SECS
}

fn default_queue_poll_interval_ms() -> u64 {
    crate::uploader::DEFAULT_POLL_INTERVAL_MS
}

fn default_progress_throttle_ms() -> u64 {
    crate::events::DEFAULT_THROTTLE_INTERVAL_MS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
            stall_check_interval_secs: default_stall_check_interval_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
            queue_poll_interval_ms: default_queue_poll_interval_ms(),
            progress_throttle_ms: default_progress_throttle_ms(),
        }
    }
}

impl UploadConfig {
    /// 转换为重试策略
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            jitter_ms: self.jitter_ms,
        }
    }

    /// 转换为停滞检测配置
    pub fn to_stall_config(&self) -> StallConfig {
        StallConfig {
            check_interval: Duration::from_secs(self.stall_check_interval_secs.max(1)),
            stall_timeout: Duration::from_secs(self.stall_timeout_secs),
        }
    }

    /// 转换为调度器配置
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency_limit: self.max_concurrent_tasks,
            retry: self.to_retry_policy(),
            stall: self.to_stall_config(),
            poll_interval: Duration::from_millis(self.queue_poll_interval_ms.max(1)),
            progress_throttle_ms: self.progress_throttle_ms,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        if config.upload.max_concurrent_tasks == 0 {
            anyhow::bail!("配置文件中的 max_concurrent_tasks 不能为 0");
        }

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载配置，文件不存在时使用默认配置
    ///
    /// 不会写入任何文件；文件存在但无法解析时返回错误
    pub async fn load_or_default(path: &str) -> Result<Self> {
        match fs::metadata(path).await {
            Ok(_) => {
                let config = Self::load_from_file(path)
                    .await
                    .with_context(|| format!("配置文件无效: {}", path))?;
                tracing::info!("配置文件加载成功: {}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("配置文件不存在，使用默认配置: {}", path);
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("无法访问配置文件: {}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.base_url, "https://filebin.net");
        assert_eq!(config.upload.max_concurrent_tasks, 4);
        assert_eq!(config.upload.max_retries, 3);
        assert!(!config.log.enabled);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut config = AppConfig::default();
        config.server.client_id = Some("cli-test".to_string());
        config.upload.max_concurrent_tasks = 2;
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.server.client_id.as_deref(), Some("cli-test"));
        assert_eq!(loaded.upload, config.upload);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        tokio::fs::write(
            path,
            "[server]\nbase_url = \"http://localhost:8080\"\n\n[upload]\nmax_retries = 5\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(config.server.base_url, "http://localhost:8080");
        assert_eq!(config.server.connect_timeout_secs, 30);
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.upload.max_concurrent_tasks, 4);
        assert_eq!(config.log.level, "info");
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        tokio::fs::write(path, "[upload]\nmax_concurrent_tasks = 0\n")
            .await
            .unwrap();

        assert!(AppConfig::load_from_file(path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_or_default_missing_file_not_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("app.toml");
        let path = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path).await.unwrap();
        assert_eq!(config.upload, UploadConfig::default());
        assert!(tokio::fs::metadata(path).await.is_err());
        assert!(tokio::fs::metadata(dir.path().join("config")).await.is_err());
    }

    #[tokio::test]
    async fn test_load_or_default_reads_existing_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        tokio::fs::write(path, "[upload]\nmax_retries = 7\n")
            .await
            .unwrap();

        let config = AppConfig::load_or_default(path).await.unwrap();
        assert_eq!(config.upload.max_retries, 7);
    }

    #[tokio::test]
    async fn test_load_or_default_rejects_broken_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        tokio::fs::write(path, "not = [valid").await.unwrap();

        assert!(AppConfig::load_or_default(path).await.is_err());

        let content = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(content, "not = [valid");
    }

    #[test]
    fn test_upload_config_conversion() {
        let upload = UploadConfig {
            max_concurrent_tasks: 2,
            max_retries: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            jitter_ms: 0,
            stall_check_interval_secs: 2,
            stall_timeout_secs: 10,
            queue_poll_interval_ms: 50,
            progress_throttle_ms: 250,
        };

        let scheduler = upload.to_scheduler_config();
        assert_eq!(scheduler.concurrency_limit, 2);
        assert_eq!(scheduler.retry.max_retries, 5);
        assert_eq!(scheduler.retry.base_delay_ms(0), 500);
        assert_eq!(scheduler.retry.base_delay_ms(10), 8000);
        assert_eq!(scheduler.stall.check_interval, Duration::from_secs(2));
        assert_eq!(scheduler.stall.stall_timeout, Duration::from_secs(10));
        assert_eq!(scheduler.poll_interval, Duration::from_millis(50));
        assert_eq!(scheduler.progress_throttle_ms, 250);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[upload]"));
        assert!(toml_str.contains("stall_timeout_secs = 30"));

        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.upload, config.upload);
        assert_eq!(back.server.base_url, config.server.base_url);
    }
}
