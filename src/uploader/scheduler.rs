// 上传调度器
//
// 功能：
// - FIFO 等待队列 + 并发闸门（同时上传的文件数不超过上限）
// - 每次尝试一个独立任务，select 竞争：停止信号 / 传输结果 / 进度回调 / 停滞检查
// - 可重试失败释放槽位，退避后重新排到队尾
// - 队列轮询循环幂等启动，队列清空且无上传时自行退出
//
// 队列、上传项、计数全部放在同一个锁内，锁从不跨越 await

use crate::common::{StallConfig, StallWatchdog};
use crate::events::{ProgressThrottler, UploadEvent, DEFAULT_THROTTLE_INTERVAL_MS};
use crate::filebin::UploadError;
use crate::uploader::progress::{failure_message, transfer_detail};
use crate::uploader::{
    FileHandle, OverallStatus, ProgressAggregator, ProgressReporter, QueueCounters,
    RetryDecision, RetryPolicy, TransferProgress, UploadItem, UploadItemStatus, UploadRequest,
    UploadTransport,
};
use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 默认并发上限
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

/// 默认队列轮询间隔（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 同时上传的文件数上限
    pub concurrency_limit: usize,
    /// 重试策略
    pub retry: RetryPolicy,
    /// 停滞检测
    pub stall: StallConfig,
    /// 队列轮询间隔
    pub poll_interval: Duration,
    /// 进度事件节流间隔（毫秒）
    pub progress_throttle_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            retry: RetryPolicy::default(),
            stall: StallConfig::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            progress_throttle_ms: DEFAULT_THROTTLE_INTERVAL_MS,
        }
    }
}

/// 调度器内部状态（单锁保护）
#[derive(Debug)]
struct SchedulerState {
    /// 所有上传项
    items: HashMap<String, UploadItem>,
    /// 入队顺序
    order: Vec<String>,
    /// 等待获取槽位的上传项
    waiting: VecDeque<String>,
    /// 正在上传的上传项 -> 当前尝试令牌
    in_flight: HashMap<String, u64>,
    /// 下一个尝试令牌
    next_token: u64,
    /// 进度汇总
    aggregator: ProgressAggregator,
}

/// 上传调度器
#[derive(Clone)]
pub struct UploadScheduler {
    /// 目标 bin
    bin: Arc<str>,
    /// 传输层
    transport: Arc<dyn UploadTransport>,
    /// 配置
    config: SchedulerConfig,
    /// 队列状态
    state: Arc<Mutex<SchedulerState>>,
    /// 轮询循环是否在运行
    queue_running: Arc<AtomicBool>,
    /// 是否已停止
    stopped: Arc<AtomicBool>,
    /// 停止信号，取消所有进行中的尝试与退避
    shutdown: CancellationToken,
    /// 事件发送器（界面层）
    event_tx: Arc<RwLock<Option<mpsc::UnboundedSender<UploadEvent>>>>,
    /// 计数广播
    counters_tx: Arc<watch::Sender<QueueCounters>>,
}

impl std::fmt::Debug for UploadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("bin", &self.bin)
            .field("config", &self.config)
            .field("queue_running", &self.queue_running.load(Ordering::SeqCst))
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl UploadScheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// * `bin` - 目标 bin，应用于所有上传
    /// * `redirect_target` - 全部上传成功后的跳转目标
    /// * `transport` - 传输层
    /// * `config` - 调度配置
    pub fn new(
        bin: impl Into<String>,
        redirect_target: Option<String>,
        transport: Arc<dyn UploadTransport>,
        mut config: SchedulerConfig,
    ) -> Self {
        if config.concurrency_limit == 0 {
            warn!("并发上限不能为 0，已调整为 1");
            config.concurrency_limit = 1;
        }

        let bin: String = bin.into();
        info!(
            "创建上传调度器: bin={}, 并发上限={}, 最大重试={}",
            bin, config.concurrency_limit, config.retry.max_retries
        );

        let (counters_tx, _) = watch::channel(QueueCounters::default());

        Self {
            bin: Arc::from(bin),
            transport,
            config,
            state: Arc::new(Mutex::new(SchedulerState {
                items: HashMap::new(),
                order: Vec::new(),
                waiting: VecDeque::new(),
                in_flight: HashMap::new(),
                next_token: 0,
                aggregator: ProgressAggregator::new(redirect_target),
            })),
            queue_running: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            event_tx: Arc::new(RwLock::new(None)),
            counters_tx: Arc::new(counters_tx),
        }
    }

    /// 设置事件发送器
    pub fn set_event_sender(&self, tx: mpsc::UnboundedSender<UploadEvent>) {
        *self.event_tx.write() = Some(tx);
        info!("上传事件 channel 已设置");
    }

    /// 入队一批文件
    ///
    /// 每个文件创建一个 Pending 上传项，立即执行一次准入检查，然后确保轮询循环在运行
    ///
    /// # 返回
    /// 按入队顺序的上传项 ID
    pub fn enqueue<I>(&self, files: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = FileHandle>,
    {
        if self.stopped.load(Ordering::SeqCst) {
            anyhow::bail!("上传调度器已停止，拒绝新的上传");
        }

        let ids = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let mut ids = Vec::new();
            for file in files {
                let item = UploadItem::new(Arc::new(file));
                debug!(
                    "上传项入队: id={}, 文件={}, 大小={}",
                    item.id,
                    item.file_name(),
                    item.total_size()
                );
                self.emit(UploadEvent::Created {
                    item_id: item.id.clone(),
                    file_name: item.file_name().to_string(),
                    total_size: item.total_size(),
                    detail: item.detail.clone(),
                });

                ids.push(item.id.clone());
                state.order.push(item.id.clone());
                state.waiting.push_back(item.id.clone());
                state.items.insert(item.id.clone(), item);
            }

            if ids.is_empty() {
                return Ok(ids);
            }

            state.aggregator.on_enqueued(ids.len() as u64);
            info!(
                "📥 {} 个文件已入队 (累计 {})",
                ids.len(),
                state.aggregator.counters().queued
            );

            self.admit_locked(state);
            self.publish_status_locked(state);
            ids
        };

        self.run_queue();
        Ok(ids)
    }

    /// 启动队列轮询循环（幂等）
    ///
    /// 已在运行时直接返回；等待队列为空且没有上传中的项时循环自行退出，之后可再次启动
    pub fn run_queue(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self
            .queue_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            debug!("🚀 上传队列轮询已启动");

            loop {
                if scheduler.shutdown.is_cancelled() {
                    scheduler.queue_running.store(false, Ordering::SeqCst);
                    break;
                }

                {
                    let mut guard = scheduler.state.lock();
                    let state = &mut *guard;
                    if scheduler.admit_locked(state) > 0 {
                        scheduler.publish_status_locked(state);
                    }

                    // 在锁内清除运行标记，与重新入队互斥
                    if state.waiting.is_empty() && state.in_flight.is_empty() {
                        scheduler.queue_running.store(false, Ordering::SeqCst);
                        break;
                    }
                }

                tokio::time::sleep(scheduler.config.poll_interval).await;
            }

            debug!("上传队列轮询已停止");
        });
    }

    /// 准入：在并发上限内从队首取出上传项并启动尝试
    ///
    /// # 返回
    /// 本次启动的尝试数
    fn admit_locked(&self, state: &mut SchedulerState) -> usize {
        if self.stopped.load(Ordering::SeqCst) {
            return 0;
        }

        let mut admitted = 0;
        while state.in_flight.len() < self.config.concurrency_limit {
            let Some(item_id) = state.waiting.pop_front() else {
                break;
            };
            let Some(item) = state.items.get_mut(&item_id) else {
                continue;
            };

            let old_status = item.status;
            item.mark_uploading();
            state.aggregator.on_admitted();

            state.next_token += 1;
            let token = state.next_token;
            state.in_flight.insert(item_id.clone(), token);

            info!(
                "⬆️ 开始上传: {} ({}), 第 {} 次尝试",
                item.file_name(),
                item.readable_size(),
                item.attempt + 1
            );
            self.emit(UploadEvent::StatusChanged {
                item_id: item_id.clone(),
                old_status: old_status.as_str().to_string(),
                new_status: item.status.as_str().to_string(),
                detail: item.detail.clone(),
            });

            let request = UploadRequest {
                item_id,
                bin: self.bin.to_string(),
                file: item.file.clone(),
                attempt: item.attempt,
            };
            tokio::spawn(self.clone().drive_attempt(request, token));
            admitted += 1;
        }

        admitted
    }

    /// 驱动一次上传尝试
    async fn drive_attempt(self, request: UploadRequest, token: u64) {
        let item_id = request.item_id.clone();
        let attempt = request.attempt;

        let result = {
            let (reporter, mut progress_rx) = ProgressReporter::channel();
            let mut watchdog = StallWatchdog::new(self.config.stall.clone());
            let check_interval = watchdog.check_interval();
            let mut stall_check =
                tokio::time::interval_at(Instant::now() + check_interval, check_interval);
            stall_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut throttler = ProgressThrottler::with_millis(self.config.progress_throttle_ms);
            let mut progress_open = true;

            let upload = self.transport.upload(request, reporter);
            tokio::pin!(upload);

            loop {
                tokio::select! {
                    biased;

                    _ = self.shutdown.cancelled() => {
                        debug!("上传项 {} 第 {} 次尝试已取消", item_id, attempt + 1);
                        return;
                    }
                    result = &mut upload => break result,
                    tick = progress_rx.recv(), if progress_open => match tick {
                        Some(tick) => {
                            watchdog.record_progress();
                            self.on_progress(&item_id, token, tick, &mut throttler);
                        }
                        None => progress_open = false,
                    },
                    _ = stall_check.tick() => {
                        if watchdog.check() {
                            break Err(UploadError::Stalled {
                                idle_secs: watchdog.idle_for().as_secs(),
                            });
                        }
                    }
                }
            }
            // 离开作用域时传输 future 被丢弃，请求随之中止
        };

        let Some(delay) = self.finish_attempt(&item_id, token, result) else {
            return;
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!("上传项 {} 退避期间调度器已停止", item_id);
            }
            _ = tokio::time::sleep(delay) => self.requeue(&item_id),
        }
    }

    /// 处理一次进度回调
    fn on_progress(
        &self,
        item_id: &str,
        token: u64,
        tick: TransferProgress,
        throttler: &mut ProgressThrottler,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.in_flight.get(item_id) != Some(&token) {
            return;
        }
        let Some(item) = state.items.get_mut(item_id) else {
            return;
        };

        item.uploaded_size = tick.bytes_sent;
        item.detail = transfer_detail(&tick, item.total_size());

        let finished = tick.bytes_total > 0 && tick.bytes_sent >= tick.bytes_total;
        let should_emit = if finished {
            throttler.force_emit()
        } else {
            throttler.should_emit()
        };

        if should_emit {
            self.emit(UploadEvent::Progress {
                item_id: item_id.to_string(),
                bytes_sent: tick.bytes_sent,
                total_size: tick.bytes_total,
                progress: item.progress(),
                attempt: item.attempt,
                detail: item.detail.clone(),
            });
        }
    }

    /// 处理一次尝试的最终结果
    ///
    /// 令牌与当前尝试不一致时忽略（过期结果不计数）
    ///
    /// # 返回
    /// 需要重试时返回退避时长
    fn finish_attempt(
        &self,
        item_id: &str,
        token: u64,
        result: std::result::Result<(), UploadError>,
    ) -> Option<Duration> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.in_flight.get(item_id) != Some(&token) {
            debug!("忽略上传项 {} 的过期尝试结果 (token={})", item_id, token);
            return None;
        }
        state.in_flight.remove(item_id);

        let item = state.items.get_mut(item_id)?;
        let old_status = item.status;
        let mut retry_delay = None;

        match result {
            Ok(()) => {
                item.mark_completed();
                state.aggregator.on_completed();
                info!("✅ 上传完成: {} ({})", item.file_name(), item.readable_size());
                self.emit(UploadEvent::Completed {
                    item_id: item_id.to_string(),
                    completed_at: item.completed_at.unwrap_or_default(),
                    detail: item.detail.clone(),
                });
            }
            Err(err) => {
                let reason = err.reason();
                match self.config.retry.decide(item.attempt, reason) {
                    RetryDecision::Retry {
                        next_attempt,
                        delay,
                    } => {
                        item.mark_retrying(reason, next_attempt);
                        state.aggregator.on_retry_scheduled();
                        warn!(
                            "⚠️ 上传失败，{}ms 后重试 ({}/{}): {} - {}",
                            delay.as_millis(),
                            next_attempt,
                            self.config.retry.max_retries,
                            item.file_name(),
                            err
                        );
                        self.emit(UploadEvent::Retrying {
                            item_id: item_id.to_string(),
                            reason,
                            error: err.to_string(),
                            next_attempt,
                            delay_ms: delay.as_millis() as u64,
                        });
                        retry_delay = Some(delay);
                    }
                    RetryDecision::GiveUp => {
                        let message = failure_message(&err);
                        item.mark_failed(reason, message);
                        state.aggregator.on_failed();
                        error!(
                            "❌ 上传失败: {} (第 {} 次尝试, {}): {}",
                            item.file_name(),
                            item.attempt + 1,
                            reason,
                            err
                        );
                        self.emit(UploadEvent::Failed {
                            item_id: item_id.to_string(),
                            reason,
                            error: err.to_string(),
                            detail: item.detail.clone(),
                        });
                    }
                }
            }
        }

        self.emit(UploadEvent::StatusChanged {
            item_id: item_id.to_string(),
            old_status: old_status.as_str().to_string(),
            new_status: item.status.as_str().to_string(),
            detail: item.detail.clone(),
        });

        // 槽位已释放，立即补位
        self.admit_locked(state);
        self.publish_status_locked(state);

        retry_delay
    }

    /// 退避结束，重新排到队尾
    fn requeue(&self, item_id: &str) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            match state.items.get(item_id) {
                Some(item) if item.status == UploadItemStatus::Retrying => {}
                _ => return,
            }

            debug!("上传项 {} 退避结束，重新排队", item_id);
            state.waiting.push_back(item_id.to_string());
            if self.admit_locked(state) > 0 {
                self.publish_status_locked(state);
            }
        }

        self.run_queue();
    }

    /// 发布队列状态、跳转与计数广播
    fn publish_status_locked(&self, state: &mut SchedulerState) {
        let counters = state.aggregator.counters();
        let status = state.aggregator.status();
        debug!("队列状态: {}", status.message);

        self.emit(UploadEvent::QueueStatus { counters, status });

        if let Some(target) = state.aggregator.take_redirect() {
            info!("🎉 全部上传完成，跳转到 {}", target);
            self.emit(UploadEvent::Redirect { target });
        }

        self.counters_tx.send_replace(counters);
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = self.event_tx.read().as_ref() {
            let _ = tx.send(event);
        }
    }

    // =====================================================
    // 查询
    // =====================================================

    /// 当前计数
    pub fn counters(&self) -> QueueCounters {
        self.state.lock().aggregator.counters()
    }

    /// 整体状态
    pub fn status(&self) -> OverallStatus {
        self.state.lock().aggregator.status()
    }

    /// 按入队顺序返回所有上传项快照
    pub fn items(&self) -> Vec<UploadItem> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect()
    }

    /// 单个上传项快照
    pub fn item(&self, item_id: &str) -> Option<UploadItem> {
        self.state.lock().items.get(item_id).cloned()
    }

    /// 等待队列长度（不含退避中的上传项）
    pub fn waiting_len(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// 轮询循环是否在运行
    pub fn is_queue_running(&self) -> bool {
        self.queue_running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// 订阅计数变化
    pub fn subscribe_counters(&self) -> watch::Receiver<QueueCounters> {
        self.counters_tx.subscribe()
    }

    /// 等待所有上传项进入终态（或调度器停止）
    pub async fn wait_until_settled(&self) -> QueueCounters {
        let mut rx = self.subscribe_counters();

        loop {
            let counters = *rx.borrow_and_update();
            if counters.is_settled() {
                return counters;
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return self.counters();
                    }
                }
                _ = self.shutdown.cancelled() => return self.counters(),
            }
        }
    }

    /// 停止调度器
    ///
    /// 取消所有进行中的尝试与退避，停止轮询，拒绝后续入队
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        let in_flight = self.state.lock().in_flight.len();
        info!("上传调度器停止信号已发送 (中止 {} 个进行中的上传)", in_flight);
    }
}
