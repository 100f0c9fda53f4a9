//! 查询引擎（SliceQueryEngine）
//!
//! 每次调用 `events_by_slices` 都会：
//! - 校验切片区间与配置，失败时同步返回错误；
//! - 启动常规轮询任务，按配置启动回溯轮询任务；
//! - 开启 `publish-events` 且配置了扇出时，订阅区间内每个切片的主题；
//! - 把各路源合并后接入去重，返回独占这些资源的 `EventsBySlices`。
//!
//! 轮询任务由 `tokio::spawn` 启动，须在 tokio 运行时内调用。
//!
use super::backtracking::BacktrackingPoller;
use super::dedup::Deduplicate;
use super::events_by_slices::EventsBySlices;
use super::live::subscribe_range;
use super::merger::{LiveSequenceGuard, SourceKind, StreamMerger};
use super::poller::{DurablePoller, PollMode};
use super::polling::spawn_polling;
use super::SliceRange;
use crate::error::{ProjectionError, ProjectionResult as Result};
use crate::settings::QuerySettings;
use bon::Builder;
use chrono::{DateTime, Utc};
use ddd_eventlog::envelope::{Envelope, EnvelopeSource};
use ddd_eventlog::eventing::LiveFanOut;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::EventLogStore;
use ddd_eventlog::slice::{self, Slice};
use futures_util::StreamExt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Builder)]
pub struct SliceQueryEngine {
    store: Arc<dyn EventLogStore>,
    /// 实时扇出；仅在 `publish-events` 开启时订阅
    fan_out: Option<Arc<dyn LiveFanOut>>,
    #[builder(default)]
    settings: QuerySettings,
}

impl SliceQueryEngine {
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// 无限查询：从 `offset` 续读 `[min_slice, max_slice]` 内的事件，直到取消
    pub fn events_by_slices(
        &self,
        category: &str,
        min_slice: Slice,
        max_slice: Slice,
        offset: Offset,
    ) -> Result<EventsBySlices> {
        let range = SliceRange::validated(category, min_slice, max_slice)?;
        self.settings.validate()?;
        let settings = &self.settings;

        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);
        let mut merger = StreamMerger::new(LiveSequenceGuard::new(
            settings.deduplicate_capacity,
            &offset,
        ));

        let (poller, primary) = DurablePoller::new(
            self.store.clone(),
            range.clone(),
            settings,
            offset.clone(),
            PollMode::Live,
        );
        let (tx, rx) = mpsc::channel(settings.buffer_size);
        tasks.push(spawn_polling(
            poller,
            settings.refresh_interval,
            tx,
            token.clone(),
        ));
        merger.push(SourceKind::Query, ReceiverStream::new(rx).boxed());

        if settings.backtracking_enabled {
            let backtracking = BacktrackingPoller::new(
                self.store.clone(),
                range.clone(),
                settings,
                offset.clone(),
                primary.clone(),
            );
            let (tx, rx) = mpsc::channel(settings.buffer_size);
            tasks.push(spawn_polling(
                backtracking,
                settings.backtracking_interval,
                tx,
                token.clone(),
            ));
            merger.push(SourceKind::Backtracking, ReceiverStream::new(rx).boxed());
        }

        if settings.publish_events {
            match &self.fan_out {
                Some(fan_out) => {
                    merger.follow_primary(primary);
                    merger.push(SourceKind::Live, subscribe_range(fan_out.as_ref(), &range));
                }
                None => {
                    tracing::warn!(
                        category,
                        "publish-events is enabled but no fan-out is configured, polling only"
                    );
                }
            }
        }

        tracing::info!(
            category,
            min_slice,
            max_slice,
            from = %offset.timestamp(),
            sources = ?merger.active_sources(),
            "events_by_slices started"
        );

        let inner = Deduplicate::new(merger, settings.deduplicate_capacity)?;
        Ok(EventsBySlices::new(inner, token, tasks))
    }

    /// 有限查询：读取到查询开始时的存储时钟为止，追平后流结束
    pub fn current_events_by_slices(
        &self,
        category: &str,
        min_slice: Slice,
        max_slice: Slice,
        offset: Offset,
    ) -> Result<EventsBySlices> {
        let range = SliceRange::validated(category, min_slice, max_slice)?;
        self.settings.validate()?;
        let settings = &self.settings;

        let token = CancellationToken::new();
        let mut merger = StreamMerger::new(LiveSequenceGuard::new(
            settings.deduplicate_capacity,
            &offset,
        ));

        let (poller, _) = DurablePoller::new(
            self.store.clone(),
            range,
            settings,
            offset.clone(),
            PollMode::Current,
        );
        let (tx, rx) = mpsc::channel(settings.buffer_size);
        let task = spawn_polling(poller, settings.refresh_interval, tx, token.clone());
        merger.push(SourceKind::Query, ReceiverStream::new(rx).boxed());

        tracing::info!(
            category,
            min_slice,
            max_slice,
            from = %offset.timestamp(),
            "current_events_by_slices started"
        );

        let inner = Deduplicate::new(merger, settings.deduplicate_capacity)?;
        Ok(EventsBySlices::new(inner, token, vec![task]))
    }

    /// 加载单条完整信封，常用于为回溯信封暴露的缺口补取负载
    pub async fn load_envelope(&self, stream_id: &str, seq_nr: u64) -> Result<Envelope> {
        let row = self
            .store
            .load_event(stream_id, seq_nr)
            .await?
            .ok_or_else(|| ProjectionError::EnvelopeNotFound {
                stream_id: stream_id.to_string(),
                seq_nr,
            })?;

        let offset = Offset::for_event(row.db_timestamp(), stream_id, seq_nr)
            .with_read_timestamp(row.read_db_timestamp());
        Ok(row.into_envelope(offset, EnvelopeSource::Query))
    }

    pub async fn timestamp_of(
        &self,
        stream_id: &str,
        seq_nr: u64,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self.store.timestamp_of(stream_id, seq_nr).await?)
    }

    pub fn slice_for_stream_id(&self, stream_id: &str) -> Slice {
        slice::slice_for_stream_id(stream_id)
    }

    pub fn slice_ranges(&self, number_of_ranges: u32) -> Result<Vec<RangeInclusive<Slice>>> {
        Ok(slice::slice_ranges(number_of_ranges)?)
    }
}
