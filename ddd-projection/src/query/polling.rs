//! 周期轮询驱动
//!
//! 常规轮询器与回溯轮询器共用的长驻任务：按固定间隔触发一次轮询，
//! 将结果写入有界通道；整页返回时立即续查，通道满时等待消费者。
//!
use async_trait::async_trait;
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::error::EventLogResult;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::{EventLogStore, SliceRangeQuery, StoredEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 一次轮询的结果
#[derive(Debug, Default)]
pub(crate) struct Page {
    pub(crate) envelopes: Vec<Envelope>,
    /// 本页已满，存储中可能还有更多行
    pub(crate) full: bool,
}

#[async_trait]
pub(crate) trait PollingSource: Send + 'static {
    fn name(&self) -> &'static str;

    async fn poll_once(&mut self) -> EventLogResult<Page>;

    /// 追平后即结束（有限查询）
    fn finishes_when_caught_up(&self) -> bool {
        false
    }
}

/// 取一页位点尚未覆盖的行，返回这些行以及最后一次查询是否返回了整页
///
/// 同一时间戳下的行可能多于一页：整页都已被位点覆盖时成倍放大页容量重查，直到越过这些行。
pub(crate) async fn fetch_unseen(
    store: &dyn EventLogStore,
    mut query: SliceRangeQuery,
    cursor: &Offset,
) -> EventLogResult<(Vec<StoredEvent>, bool)> {
    loop {
        let rows = store.rows_by_slices(&query).await?;
        let full = rows.len() >= query.limit;
        let unseen: Vec<StoredEvent> = rows
            .into_iter()
            .filter(|row| !cursor.has_seen(row.db_timestamp(), row.stream_id(), row.seq_nr()))
            .collect();

        if unseen.is_empty() && full {
            query.limit = query.limit.max(1).saturating_mul(2);
            tracing::debug!(limit = query.limit, "page fully seen, widening");
            continue;
        }
        return Ok((unseen, full));
    }
}

enum Drained {
    Continue,
    Finished,
}

pub(crate) fn spawn_polling<P>(
    mut source: P,
    interval: Duration,
    tx: mpsc::Sender<Envelope>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    P: PollingSource,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Drained::Finished = drain(&mut source, &tx, &token).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!(source = source.name(), "poller stopped");
    })
}

async fn drain<P>(source: &mut P, tx: &mpsc::Sender<Envelope>, token: &CancellationToken) -> Drained
where
    P: PollingSource,
{
    loop {
        match source.poll_once().await {
            Ok(page) => {
                tracing::trace!(
                    source = source.name(),
                    count = page.envelopes.len(),
                    full = page.full,
                    "poll completed"
                );
                for envelope in page.envelopes {
                    // 接收端已被丢弃：查询已取消，本次结果作废
                    if tx.send(envelope).await.is_err() {
                        return Drained::Finished;
                    }
                }
                if token.is_cancelled() {
                    return Drained::Finished;
                }
                if !page.full {
                    return if source.finishes_when_caught_up() {
                        Drained::Finished
                    } else {
                        Drained::Continue
                    };
                }
            }
            Err(err) => {
                // 位点未前进，下个周期重查同一窗口
                tracing::warn!(source = source.name(), error = %err, "poll failed, retrying on next tick");
                return Drained::Continue;
            }
        }
    }
}
