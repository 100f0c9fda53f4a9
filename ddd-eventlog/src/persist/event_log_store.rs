//! 事件日志存储协议（EventLogStore）
//!
//! 查询引擎对存储的全部依赖：存储时钟、按切片区间的有界范围查询、单条事件加载。
//!
use crate::{error::EventLogResult as Result, persist::StoredEvent, slice::Slice};
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// 按切片区间的范围查询
///
/// 返回满足以下条件的行，按 `(db_timestamp, seq_nr)` 升序，最多 `limit` 条：
/// - `category` 相同，`slice` 位于 `[min_slice, max_slice]`；
/// - `db_timestamp >= from_timestamp`，若给定 `to_timestamp` 则 `db_timestamp <= to_timestamp`；
/// - `db_timestamp < 存储时钟 - behind_current_time`。
///
/// `backtracking` 为真时不加载负载。
#[derive(Debug, Clone, Builder)]
pub struct SliceRangeQuery {
    #[builder(into)]
    pub category: String,
    pub min_slice: Slice,
    pub max_slice: Slice,
    pub from_timestamp: DateTime<Utc>,
    pub to_timestamp: Option<DateTime<Utc>>,
    #[builder(default)]
    pub behind_current_time: Duration,
    #[builder(default)]
    pub backtracking: bool,
    pub limit: usize,
}

#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// 存储时钟的当前时间
    async fn current_timestamp(&self) -> Result<DateTime<Utc>>;

    /// 切片区间范围查询，语义见 [`SliceRangeQuery`]
    async fn rows_by_slices(&self, query: &SliceRangeQuery) -> Result<Vec<StoredEvent>>;

    /// 加载单条事件（含负载）
    async fn load_event(&self, stream_id: &str, seq_nr: u64) -> Result<Option<StoredEvent>>;

    /// 事件的提交时间戳
    async fn timestamp_of(&self, stream_id: &str, seq_nr: u64) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .load_event(stream_id, seq_nr)
            .await?
            .map(|row| row.db_timestamp()))
    }
}

#[async_trait]
impl<T> EventLogStore for Arc<T>
where
    T: EventLogStore + ?Sized,
{
    async fn current_timestamp(&self) -> Result<DateTime<Utc>> {
        (**self).current_timestamp().await
    }

    async fn rows_by_slices(&self, query: &SliceRangeQuery) -> Result<Vec<StoredEvent>> {
        (**self).rows_by_slices(query).await
    }

    async fn load_event(&self, stream_id: &str, seq_nr: u64) -> Result<Option<StoredEvent>> {
        (**self).load_event(stream_id, seq_nr).await
    }

    async fn timestamp_of(&self, stream_id: &str, seq_nr: u64) -> Result<Option<DateTime<Utc>>> {
        (**self).timestamp_of(stream_id, seq_nr).await
    }
}
