// 待上传文件句柄
//
// 调用方持有，队列中的上传项通过 Arc 引用，不复制文件内容

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// 可读取的字节源
pub type FileReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// 文件内容来源
#[derive(Debug, Clone)]
enum FileSource {
    /// 本地文件，每次上传尝试时重新打开
    Path(PathBuf),
    /// 内存数据
    Memory(Arc<[u8]>),
}

/// 待上传文件句柄（不可变）
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// 文件名（原样作为上传路径的最后一段）
    name: String,
    /// 文件大小（字节）
    size: u64,
    /// 内容来源
    source: FileSource,
}

impl FileHandle {
    /// 从本地路径创建，文件名取路径最后一段
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("无法读取文件信息: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("无法获取文件名: {:?}", path))?
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// 从内存数据创建
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 打开字节流（每次从头读取）
    pub async fn open(&self) -> Result<FileReader> {
        match &self.source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("无法打开文件 {:?}", path))?;
                Ok(Box::new(file))
            }
            FileSource::Memory(data) => Ok(Box::new(std::io::Cursor::new(data.clone()))),
        }
    }
}
