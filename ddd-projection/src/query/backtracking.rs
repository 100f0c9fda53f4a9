//! 回溯轮询器（BacktrackingPoller）
//!
//! 跟随常规轮询器的位点，周期性地重扫 `[max(回溯位点, 常规位点 - 回溯窗口), 常规位点]`，
//! 以仅含元数据的信封补报常规轮询因并发提交乱序而漏掉的事件。
//! 回溯位点永远不会超过常规位点；常规位点没有前进时窗口为空，不查询。
//!
use super::SliceRange;
use super::polling::{Page, PollingSource, fetch_unseen};
use crate::settings::QuerySettings;
use async_trait::async_trait;
use chrono::TimeDelta;
use ddd_eventlog::envelope::EnvelopeSource;
use ddd_eventlog::error::{EventLogError, EventLogResult as Result};
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::{EventLogStore, SliceRangeQuery};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) struct BacktrackingPoller {
    store: Arc<dyn EventLogStore>,
    range: SliceRange,
    window: Duration,
    behind_current_time: Duration,
    buffer_size: usize,
    primary: watch::Receiver<Offset>,
    cursor: Offset,
}

impl BacktrackingPoller {
    pub(crate) fn new(
        store: Arc<dyn EventLogStore>,
        range: SliceRange,
        settings: &QuerySettings,
        from: Offset,
        primary: watch::Receiver<Offset>,
    ) -> Self {
        Self {
            store,
            range,
            window: settings.backtracking_window,
            behind_current_time: settings.backtracking_behind_current_time,
            buffer_size: settings.buffer_size,
            primary,
            cursor: from,
        }
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> &Offset {
        &self.cursor
    }

    /// 窗口下界：回溯位点与“常规位点 - 窗口”中较晚者，后者胜出时重置回溯位点
    fn clamp_to_window(&mut self, primary: &Offset) -> Result<()> {
        let window = TimeDelta::from_std(self.window)
            .map_err(|e| EventLogError::invalid_value(e.to_string()))?;
        let Some(earliest) = primary.timestamp().checked_sub_signed(window) else {
            return Ok(());
        };
        if earliest > self.cursor.timestamp() {
            self.cursor = Offset::new(earliest, BTreeMap::new());
        }
        Ok(())
    }
}

#[async_trait]
impl PollingSource for BacktrackingPoller {
    fn name(&self) -> &'static str {
        "backtracking"
    }

    async fn poll_once(&mut self) -> Result<Page> {
        let primary = self.primary.borrow().clone();
        self.clamp_to_window(&primary)?;
        if primary.timestamp() < self.cursor.timestamp() {
            return Ok(Page::default());
        }

        let query = SliceRangeQuery::builder()
            .category(self.range.category.clone())
            .min_slice(self.range.min_slice)
            .max_slice(self.range.max_slice)
            .from_timestamp(self.cursor.timestamp())
            .to_timestamp(primary.timestamp())
            .behind_current_time(self.behind_current_time)
            .backtracking(true)
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
            // 存储若仍返回了负载，同样剥离
            let envelope = row
                .into_envelope(offset, EnvelopeSource::Backtracking)
                .into_backtracking();
            envelopes.push(envelope);
        }

        Ok(Page { envelopes, full })
    }
}
