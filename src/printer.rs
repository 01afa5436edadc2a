// 上传事件输出（JSON 行或可读文本）
//
// 进度事件只写入缓冲区，中/高优先级事件写出后立即刷新

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context as _, Result};
use filebin_uploader::{EventPriority, UploadEvent};

pub struct EventPrinter<W: Write> {
    out: W,
    json: bool,
    /// 上传项 ID -> 文件名
    names: HashMap<String, String>,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self {
            out,
            json,
            names: HashMap::new(),
        }
    }

    fn name<'a>(&'a self, item_id: &'a str) -> &'a str {
        self.names.get(item_id).map(String::as_str).unwrap_or(item_id)
    }

    fn render(&self, event: &UploadEvent) -> Result<Option<String>> {
        if self.json {
            return serde_json::to_string(event)
                .map(Some)
                .context("事件序列化失败");
        }

        let label = event.item_id().map(|id| self.name(id));
        let line = match (event, label) {
            (UploadEvent::Created { detail, .. }, Some(name))
            | (UploadEvent::Progress { detail, .. }, Some(name))
            | (UploadEvent::Completed { detail, .. }, Some(name))
            | (UploadEvent::Failed { detail, .. }, Some(name)) => format!("{}: {}", name, detail),
            (
                UploadEvent::Retrying {
                    error,
                    next_attempt,
                    delay_ms,
                    ..
                },
                Some(name),
            ) => format!(
                "{}: Retrying... ({}, attempt {} in {}ms)",
                name,
                error,
                next_attempt + 1,
                delay_ms
            ),
            (UploadEvent::QueueStatus { status, .. }, _) => status.message.clone(),
            (UploadEvent::Redirect { target }, _) => target.clone(),
            _ => return Ok(None),
        };
        Ok(Some(line))
    }

    pub fn print(&mut self, event: &UploadEvent) -> Result<()> {
        if let UploadEvent::Created {
            item_id, file_name, ..
        } = event
        {
            self.names.insert(item_id.clone(), file_name.clone());
        }

        if let Some(line) = self.render(event)? {
            writeln!(self.out, "{}", line).context("写入事件失败")?;
        }
        if event.priority() >= EventPriority::Medium {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("刷新输出失败")
    }
}
