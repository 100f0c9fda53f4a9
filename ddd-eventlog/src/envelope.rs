//! 事件信封（Envelope）
//!
//! 查询向消费者交付的最小单元。`payload` 缺失即为回溯信封（仅元数据），
//! 这是区分“完整”与“回溯”信封的唯一依据；`source` 只用于诊断。
//!
use crate::{offset::Offset, slice::Slice};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 信封来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeSource {
    /// 常规轮询
    #[default]
    Query,
    /// 回溯轮询（无负载）
    Backtracking,
    /// 实时扇出
    PubSub,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Envelope {
    /// 类别（实体类型），查询与扇出主题均按类别划分
    category: String,
    /// 流标识
    stream_id: String,
    /// 流内序号，从 1 开始严格递增
    seq_nr: u64,
    /// 事件负载；回溯信封不携带
    payload: Option<Value>,
    /// 写入时间（存储时钟）
    produced_at: DateTime<Utc>,
    /// 续读位点
    offset: Offset,
    /// 所属切片
    slice: Slice,
    #[builder(default)]
    source: EnvelopeSource,
}

impl Envelope {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn seq_nr(&self) -> u64 {
        self.seq_nr
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn offset(&self) -> &Offset {
        &self.offset
    }

    pub fn slice(&self) -> Slice {
        self.slice
    }

    pub fn source(&self) -> EnvelopeSource {
        self.source
    }

    /// 是否为回溯信封（无负载）
    pub fn is_backtracking(&self) -> bool {
        self.payload.is_none()
    }

    /// 去重键：`(stream_id, seq_nr)`
    pub fn key(&self) -> (&str, u64) {
        (&self.stream_id, self.seq_nr)
    }

    /// 去掉负载，转为回溯信封
    pub fn into_backtracking(mut self) -> Self {
        self.payload = None;
        self.source = EnvelopeSource::Backtracking;
        self
    }

    pub fn with_source(mut self, source: EnvelopeSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtracking_is_signalled_by_missing_payload() {
        let now = Utc::now();
        let full = Envelope::builder()
            .category("order".into())
            .stream_id("order-1".into())
            .seq_nr(2)
            .payload(serde_json::json!({"amount": 10}))
            .produced_at(now)
            .offset(Offset::for_event(now, "order-1", 2))
            .slice(crate::slice::slice_for_stream_id("order-1"))
            .build();

        assert!(!full.is_backtracking());
        assert_eq!(full.source(), EnvelopeSource::Query);
        assert_eq!(full.key(), ("order-1", 2));

        let back = full.clone().into_backtracking();
        assert!(back.is_backtracking());
        assert_eq!(back.source(), EnvelopeSource::Backtracking);
        assert_eq!(back.key(), full.key());
        assert_eq!(back.offset(), full.offset());
    }
}
