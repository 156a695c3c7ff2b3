//! # scheduler 模块
//!
//! 固定窗口的批量调度器：把任务列表按固定大小切成批次，
//! 同一批次内的任务并发执行，批次之间严格串行，并在两批之间暂停一段冷却时间，
//! 以避开上游接口的限流。
//!
//! 状态流转：`Idle → Running(0) → Paused → Running(1) → … → Done`。
//! 调度器不读取响应里的限流信息，也不支持取消；进程中途退出只会丢失当前批次。

use std::future::Future;
use std::time::Duration;
use futures::future::join_all;
use tracing::info;
use crate::common::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running(usize),
    Paused(Duration),
    Done,
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    stage: String,
    batch_size: usize,
    cooldown: Duration,
    state: BatchState,
    transitions: Vec<BatchState>,
}

impl BatchScheduler {
    pub fn new(stage: impl Into<String>, batch_size: usize, cooldown: Duration) -> Self {
        Self {
            stage: stage.into(),
            batch_size: batch_size.max(1),
            cooldown,
            state: BatchState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// 本次运行经历过的状态（不含初始的 `Idle`）。
    pub fn transitions(&self) -> &[BatchState] {
        &self.transitions
    }

    pub fn batch_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size)
    }

    fn transition(&mut self, next: BatchState) {
        self.state = next;
        self.transitions.push(next);
    }

    /// 按批次执行 `task`，返回结果与输入顺序一致。
    pub async fn run<T, R, F, Fut>(&mut self, items: Vec<T>, task: F) -> Result<Vec<R>>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let mut results = Vec::with_capacity(items.len());
        self.run_with(items, task, |batch| {
            results.extend(batch);
            Ok(())
        })
        .await?;
        Ok(results)
    }

    /// 按批次执行 `task`，每批结束后按输入顺序把该批结果交给 `on_batch`。
    ///
    /// 每个任务作为独立的 tokio 任务运行；`on_batch` 只在当前任务中串行调用，
    /// 返回错误时不再启动后续批次。任务 panic 时返回 [`ScoutError::Task`](crate::common::error::ScoutError::Task)。
    pub async fn run_with<T, R, F, Fut, C>(&mut self, items: Vec<T>, task: F, mut on_batch: C) -> Result<()>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
        C: FnMut(Vec<R>) -> Result<()>,
    {
        let batches = self.batch_count(items.len());
        let mut pending = items.into_iter().enumerate().peekable();
        let mut batch_index = 0;

        while pending.peek().is_some() {
            self.transition(BatchState::Running(batch_index));
            info!("[{}] 开始第 {}/{} 批", self.stage, batch_index + 1, batches);

            let handles: Vec<_> = pending
                .by_ref()
                .take(self.batch_size)
                .map(|(i, item)| tokio::spawn(task(i, item)))
                .collect();

            let mut batch = Vec::with_capacity(handles.len());
            for joined in join_all(handles).await {
                batch.push(joined?);
            }
            if let Err(e) = on_batch(batch) {
                self.transition(BatchState::Done);
                return Err(e);
            }
            batch_index += 1;

            if pending.peek().is_some() && !self.cooldown.is_zero() {
                self.transition(BatchState::Paused(self.cooldown));
                info!("[{}] 暂停 {} 毫秒后继续", self.stage, self.cooldown.as_millis());
                tokio::time::sleep(self.cooldown).await;
            }
        }

        self.transition(BatchState::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ScoutError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let mut scheduler = BatchScheduler::new("test", 3, Duration::ZERO);
        let items: Vec<u64> = (0..7).collect();

        let results = scheduler
            .run(items, |_, n| async move {
                // 越靠前的任务完成得越晚
                tokio::time::sleep(Duration::from_millis(100 * (10 - n))).await;
                n * 10
            })
            .await
            .unwrap();

        assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_batches_only() {
        let mut scheduler = BatchScheduler::new("test", 2, Duration::from_secs(10));
        let start = Instant::now();

        let results = scheduler.run(vec![1, 2, 3, 4, 5], |i, _| async move { i }).await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert!(elapsed >= Duration::from_secs(20), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(21), "elapsed {:?}", elapsed);
        assert_eq!(
            scheduler.transitions(),
            &[
                BatchState::Running(0),
                BatchState::Paused(Duration::from_secs(10)),
                BatchState::Running(1),
                BatchState::Paused(Duration::from_secs(10)),
                BatchState::Running(2),
                BatchState::Done,
            ]
        );
        assert_eq!(scheduler.state(), BatchState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_batch_size() {
        let mut scheduler = BatchScheduler::new("test", 3, Duration::from_secs(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        scheduler
            .run((0..7).collect::<Vec<_>>(), |_, _| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.batch_count(7), 3);
    }

    #[tokio::test]
    async fn test_error_from_batch_handler_stops_later_batches() {
        let mut scheduler = BatchScheduler::new("test", 2, Duration::ZERO);
        let started = Arc::new(AtomicUsize::new(0));

        let result = scheduler
            .run_with(
                vec![1, 2, 3, 4, 5],
                |_, n| {
                    let started = started.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        n
                    }
                },
                |batch| {
                    if batch.contains(&2) {
                        Err(ScoutError::Parse("boom".into()))
                    } else {
                        Ok(())
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(ScoutError::Parse(_))));
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.transitions(), &[BatchState::Running(0), BatchState::Done]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut scheduler = BatchScheduler::new("test", 50, Duration::from_secs(60));
        let results: Vec<u8> = scheduler.run(Vec::<u8>::new(), |_, n| async move { n }).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(scheduler.transitions(), &[BatchState::Done]);
    }
}
