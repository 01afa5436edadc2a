mod cli;
mod printer;

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use filebin_uploader::{
    config::LogConfig, logging, AdminOutcome, AppConfig, FileHandle, FilebinClient,
    UploadScheduler,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cli::{Cli, Commands};
use printer::EventPrinter;

/// 预先读取日志配置，在完整加载配置之前初始化日志
async fn load_log_config(path: &str) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }
    LogConfig::default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = load_log_config(&cli.config).await;
    let _log_guard = logging::init_logging(&log_config);

    if let Commands::InitConfig { force } = cli.command {
        return init_config(&cli.config, force).await;
    }

    let mut config = AppConfig::load_or_default(&cli.config).await?;
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
    if let Some(client_id) = &cli.client_id {
        config.server.client_id = Some(client_id.clone());
    }

    let client = FilebinClient::from_config(&config.server)?;

    match cli.command {
        Commands::Upload {
            bin,
            concurrency,
            max_retries,
            files,
        } => {
            if let Some(concurrency) = concurrency {
                config.upload.max_concurrent_tasks = concurrency;
            }
            if let Some(max_retries) = max_retries {
                config.upload.max_retries = max_retries;
            }
            run_upload(&config, client, bin, files, cli.json).await
        }
        Commands::Delete { url } => {
            let outcome = client.delete_url(&url).await?;
            report_admin(outcome, cli.json)
        }
        Commands::Lock { bin } => {
            let outcome = client.lock_bin(&bin).await?;
            report_admin(outcome, cli.json)
        }
        Commands::Approve { bin } => {
            let outcome = client.approve_bin(&bin).await?;
            report_admin(outcome, cli.json)
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

async fn init_config(path: &str, force: bool) -> Result<()> {
    if !force && tokio::fs::metadata(path).await.is_ok() {
        anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path);
    }
    AppConfig::default().save_to_file(path).await?;
    println!("{}", path);
    Ok(())
}

async fn run_upload(
    config: &AppConfig,
    client: FilebinClient,
    bin: String,
    paths: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(FileHandle::from_path(path).await?);
    }

    let redirect = client.bin_url(&bin).map(|url| url.to_string());
    let scheduler = UploadScheduler::new(
        bin,
        redirect,
        Arc::new(client),
        config.upload.to_scheduler_config(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    scheduler.set_event_sender(tx);
    let mut printer = EventPrinter::new(BufWriter::new(io::stdout()), json);

    scheduler.enqueue(files)?;

    let settled = scheduler.wait_until_settled();
    tokio::pin!(settled);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let counters = loop {
        tokio::select! {
            Some(event) = rx.recv() => printer.print(&event)?,
            counters = &mut settled => break counters,
            _ = &mut ctrl_c => {
                warn!("收到中断信号，停止上传");
                scheduler.stop();
                break scheduler.counters();
            }
        }
    };

    while let Ok(event) = rx.try_recv() {
        printer.print(&event)?;
    }
    printer.flush()?;

    if counters.failed > 0 {
        anyhow::bail!("{} 个文件上传失败", counters.failed);
    }
    if !counters.is_settled() {
        anyhow::bail!(
            "上传已中断: {}/{} 完成",
            counters.completed,
            counters.queued
        );
    }

    info!("🎉 {} 个文件全部上传完成", counters.completed);
    Ok(())
}

fn report_admin(outcome: AdminOutcome, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(&outcome).context("结果序列化失败")?
        );
    } else {
        println!("{}", outcome.message);
    }

    if !outcome.success {
        error!("{:?} 操作失败 (HTTP {})", outcome.action, outcome.status);
        anyhow::bail!("{}", outcome.message);
    }
    Ok(())
}
