//! 存储行模型（StoredEvent）
//!
//! 事件在持久化层的标准形态，由轮询器转换为 `Envelope`。
//!
use crate::{
    envelope::{Envelope, EnvelopeSource},
    offset::Offset,
    slice::Slice,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct StoredEvent {
    /// 类别（实体类型）
    category: String,
    /// 流标识
    stream_id: String,
    /// 流内序号
    seq_nr: u64,
    /// 所属切片，写入时由流标识计算
    slice: Slice,
    /// 提交时间戳（存储时钟）
    db_timestamp: DateTime<Utc>,
    /// 读取该行时的存储时钟
    read_db_timestamp: DateTime<Utc>,
    /// 事件负载；回溯查询不加载
    payload: Option<Value>,
}

impl StoredEvent {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn seq_nr(&self) -> u64 {
        self.seq_nr
    }

    pub fn slice(&self) -> Slice {
        self.slice
    }

    pub fn db_timestamp(&self) -> DateTime<Utc> {
        self.db_timestamp
    }

    pub fn read_db_timestamp(&self) -> DateTime<Utc> {
        self.read_db_timestamp
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn with_read_db_timestamp(mut self, read_db_timestamp: DateTime<Utc>) -> Self {
        self.read_db_timestamp = read_db_timestamp;
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.payload = None;
        self
    }

    /// 以给定位点与来源转为信封；无负载的行总是成为回溯信封
    pub fn into_envelope(self, offset: Offset, source: EnvelopeSource) -> Envelope {
        let source = if self.payload.is_none() {
            EnvelopeSource::Backtracking
        } else {
            source
        };

        Envelope::builder()
            .category(self.category)
            .stream_id(self.stream_id)
            .seq_nr(self.seq_nr)
            .maybe_payload(self.payload)
            .produced_at(self.db_timestamp)
            .offset(offset)
            .slice(self.slice)
            .source(source)
            .build()
    }
}
