//! 查询流（EventsBySlices）
//!
//! 一次 `events_by_slices` 调用的运行实例：独占去重缓存、轮询位点与扇出订阅。
//! 丢弃或 `cancel()` 即同步退订扇出并停止轮询器的周期触发。
//!
use super::dedup::Deduplicate;
use super::merger::{SourceKind, StreamMerger};
use ddd_eventlog::envelope::Envelope;
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct EventsBySlices {
    inner: Deduplicate<StreamMerger>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EventsBySlices {
    pub(crate) fn new(
        inner: Deduplicate<StreamMerger>,
        token: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            inner,
            token,
            tasks,
        }
    }

    /// 取消查询：停止轮询器并丢弃全部源，之后流立即结束
    pub fn cancel(&mut self) {
        if !self.token.is_cancelled() {
            tracing::debug!("query cancelled");
        }
        self.token.cancel();
        self.inner.get_mut().clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 仍在运行的源
    pub fn active_sources(&self) -> Vec<SourceKind> {
        self.inner.get_ref().active_sources()
    }

    /// 取消并等待轮询任务退出
    pub async fn join(mut self) {
        self.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Stream for EventsBySlices {
    type Item = Envelope;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

impl Drop for EventsBySlices {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
