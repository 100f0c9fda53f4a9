//! 内存版事件日志（InMemoryEventLog）
//!
//! 同时扮演写入路径与 `EventLogStore`：
//! - `append`：按流分配序号，以单调递增的提交时间戳写入一批事件，提交后尽力发布到扇出；
//! - `append_at`：以指定（可能更早的）时间戳写入，模拟延迟可见的并发提交，不发布；
//! - 典型用途：测试环境、示例与本地开发。
//!
use crate::envelope::{Envelope, EnvelopeSource};
use crate::error::{EventLogError, EventLogResult as Result};
use crate::eventing::LiveFanOut;
use crate::offset::Offset;
use crate::persist::{EventLogStore, SliceRangeQuery, StoredEvent};
use crate::slice::slice_for_stream_id;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    rows: Vec<StoredEvent>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Inner {
    fn next_seq_nr(&self, stream_id: &str) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.stream_id() == stream_id)
            .map(StoredEvent::seq_nr)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if last >= now => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn insert(
        &mut self,
        category: &str,
        stream_id: &str,
        payloads: Vec<Value>,
        db_timestamp: DateTime<Utc>,
    ) -> Vec<StoredEvent> {
        let first = self.next_seq_nr(stream_id);
        let slice = slice_for_stream_id(stream_id);
        let written: Vec<StoredEvent> = payloads
            .into_iter()
            .zip(first..)
            .map(|(payload, seq_nr)| {
                StoredEvent::builder()
                    .category(category.to_string())
                    .stream_id(stream_id.to_string())
                    .seq_nr(seq_nr)
                    .slice(slice)
                    .db_timestamp(db_timestamp)
                    .read_db_timestamp(db_timestamp)
                    .payload(payload)
                    .build()
            })
            .collect();
        self.rows.extend(written.iter().cloned());
        written
    }
}

#[derive(Default)]
pub struct InMemoryEventLog {
    inner: RwLock<Inner>,
    fan_out: Option<Arc<dyn LiveFanOut>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提交后发布到扇出（`publish-events = on`）
    pub fn with_fan_out(fan_out: Arc<dyn LiveFanOut>) -> Self {
        Self {
            inner: RwLock::default(),
            fan_out: Some(fan_out),
        }
    }

    /// 写入一批事件（同一事务，共享提交时间戳），返回写入的行
    pub async fn append(
        &self,
        category: &str,
        stream_id: &str,
        payloads: Vec<Value>,
    ) -> Result<Vec<StoredEvent>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }

        let written = {
            let mut inner = self.inner.write();
            let ts = inner.next_timestamp();
            inner.insert(category, stream_id, payloads, ts)
        };

        if let Some(fan_out) = &self.fan_out {
            let envelopes: Vec<Envelope> = written
                .iter()
                .cloned()
                .map(|row| {
                    let offset =
                        Offset::for_event(row.db_timestamp(), row.stream_id(), row.seq_nr());
                    row.into_envelope(offset, EnvelopeSource::PubSub)
                })
                .collect();
            if let Err(err) = fan_out.publish_batch(&envelopes).await {
                tracing::debug!(error = %err, stream_id, "publish after commit failed");
            }
        }

        Ok(written)
    }

    /// 以指定提交时间戳写入，不发布到扇出
    pub fn append_at(
        &self,
        category: &str,
        stream_id: &str,
        payloads: Vec<Value>,
        db_timestamp: DateTime<Utc>,
    ) -> Vec<StoredEvent> {
        self.inner
            .write()
            .insert(category, stream_id, payloads, db_timestamp)
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLog {
    async fn current_timestamp(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now())
    }

    async fn rows_by_slices(&self, query: &SliceRangeQuery) -> Result<Vec<StoredEvent>> {
        let now = Utc::now();
        let behind = TimeDelta::from_std(query.behind_current_time)
            .map_err(|e| EventLogError::invalid_value(e.to_string()))?;
        let visible_before = now - behind;

        let mut rows: Vec<StoredEvent> = self
            .inner
            .read()
            .rows
            .iter()
            .filter(|row| {
                row.category() == query.category
                    && (query.min_slice..=query.max_slice).contains(&row.slice())
                    && row.db_timestamp() >= query.from_timestamp
                    && query.to_timestamp.is_none_or(|to| row.db_timestamp() <= to)
                    && row.db_timestamp() < visible_before
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            a.db_timestamp()
                .cmp(&b.db_timestamp())
                .then_with(|| a.stream_id().cmp(b.stream_id()))
                .then_with(|| a.seq_nr().cmp(&b.seq_nr()))
        });
        rows.truncate(query.limit);

        Ok(rows
            .into_iter()
            .map(|row| {
                let row = row.with_read_db_timestamp(now);
                if query.backtracking {
                    row.without_payload()
                } else {
                    row
                }
            })
            .collect())
    }

    async fn load_event(&self, stream_id: &str, seq_nr: u64) -> Result<Option<StoredEvent>> {
        Ok(self
            .inner
            .read()
            .rows
            .iter()
            .find(|row| row.stream_id() == stream_id && row.seq_nr() == seq_nr)
            .cloned())
    }
}
