//! 常规轮询器（DurablePoller）
//!
//! 从续读位点起反复查询 `[cursor, 存储时钟 - behind_current_time]`，跳过位点已覆盖的行，
//! 每发出一条信封即推进位点，并把位点广播给回溯轮询器。查询失败时位点保持不变。
//!
use super::SliceRange;
use super::polling::{Page, PollingSource, fetch_unseen};
use crate::settings::QuerySettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddd_eventlog::envelope::EnvelopeSource;
use ddd_eventlog::error::EventLogResult as Result;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::{EventLogStore, SliceRangeQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PollMode {
    /// 无限查询，带滞后窗口
    Live,
    /// 有限查询：上界为首次轮询时的存储时钟，无滞后窗口，追平即结束
    Current,
}

pub(crate) struct DurablePoller {
    store: Arc<dyn EventLogStore>,
    range: SliceRange,
    behind_current_time: Duration,
    buffer_size: usize,
    mode: PollMode,
    until: Option<DateTime<Utc>>,
    cursor: Offset,
    cursor_tx: watch::Sender<Offset>,
}

impl DurablePoller {
    pub(crate) fn new(
        store: Arc<dyn EventLogStore>,
        range: SliceRange,
        settings: &QuerySettings,
        from: Offset,
        mode: PollMode,
    ) -> (Self, watch::Receiver<Offset>) {
        let (cursor_tx, cursor_rx) = watch::channel(from.clone());
        let behind_current_time = match mode {
            PollMode::Live => settings.behind_current_time,
            PollMode::Current => Duration::ZERO,
        };

        let poller = Self {
            store,
            range,
            behind_current_time,
            buffer_size: settings.buffer_size,
            mode,
            until: None,
            cursor: from,
            cursor_tx,
        };
        (poller, cursor_rx)
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> &Offset {
        &self.cursor
    }

    async fn upper_bound(&mut self) -> Result<Option<DateTime<Utc>>> {
        match self.mode {
            PollMode::Live => Ok(None),
            PollMode::Current => {
                if self.until.is_none() {
                    self.until = Some(self.store.current_timestamp().await?);
                }
                Ok(self.until)
            }
        }
    }
}

#[async_trait]
impl PollingSource for DurablePoller {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn poll_once(&mut self) -> Result<Page> {
        let to_timestamp = self.upper_bound().await?;
        let query = SliceRangeQuery::builder()
            .category(self.range.category.clone())
            .min_slice(self.range.min_slice)
            .max_slice(self.range.max_slice)
            .from_timestamp(self.cursor.timestamp())
            .maybe_to_timestamp(to_timestamp)
            .behind_current_time(self.behind_current_time)
            .limit(self.buffer_size)
            .build();

        let (rows, full) = fetch_unseen(self.store.as_ref(), query, &self.cursor).await?;

        let mut envelopes = Vec::with_capacity(rows.len());
        for row in rows {
            self.cursor
                .advance(row.db_timestamp(), row.stream_id(), row.seq_nr());
            let offset = self
                .cursor
                .clone()
                .with_read_timestamp(row.read_db_timestamp());
            envelopes.push(row.into_envelope(offset, EnvelopeSource::Query));
        }

        if !envelopes.is_empty() {
            self.cursor_tx.send_replace(self.cursor.clone());
        }
        Ok(Page { envelopes, full })
    }

    fn finishes_when_caught_up(&self) -> bool {
        self.mode == PollMode::Current
    }
}
