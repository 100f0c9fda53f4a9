//! 内存版扇出（InMemoryFanOut）
//!
//! 每个主题一个 `tokio::sync::broadcast` 通道，登记在 `DashMap` 中，首次订阅时惰性创建：
//! - `publish`：克隆并广播，来源标记为 `PubSub`；主题不存在或无订阅者时忽略；
//! - `subscribe`：返回 `'static` 事件流；订阅者落后于缓冲区时跳过被覆盖的事件。
//!
use crate::envelope::{Envelope, EnvelopeSource};
use crate::error::EventLogResult as Result;
use crate::eventing::{LiveFanOut, Topic};
use crate::slice::Slice;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub struct InMemoryFanOut {
    topics: DashMap<Topic, broadcast::Sender<Envelope>>,
    capacity: usize,
}

impl InMemoryFanOut {
    /// `capacity` 为每个主题的广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// 主题当前订阅者数量
    pub fn subscriber_count(&self, category: &str, slice: Slice) -> usize {
        self.topics
            .get(&Topic::new(category, slice))
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// 已创建的主题数量
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for InMemoryFanOut {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl LiveFanOut for InMemoryFanOut {
    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let topic = Topic::new(envelope.category(), envelope.slice());
        if let Some(tx) = self.topics.get(&topic) {
            // 无订阅者时 send 返回错误，扇出尽力而为，忽略
            let _ = tx.send(envelope.clone().with_source(EnvelopeSource::PubSub));
        }
        Ok(())
    }

    fn subscribe(&self, category: &str, slice: Slice) -> BoxStream<'static, Envelope> {
        let topic = Topic::new(category, slice);
        let rx = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            future::ready(match item {
                Ok(envelope) => Some(envelope),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(%topic, skipped, "fan-out subscriber lagged, events dropped");
                    None
                }
            })
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::Offset;
    use crate::slice::slice_for_stream_id;
    use chrono::Utc;

    fn mk_envelope(stream_id: &str, seq_nr: u64) -> Envelope {
        let now = Utc::now();
        Envelope::builder()
            .category("order".into())
            .stream_id(stream_id.into())
            .seq_nr(seq_nr)
            .payload(serde_json::json!({"seq": seq_nr}))
            .produced_at(now)
            .offset(Offset::for_event(now, stream_id, seq_nr))
            .slice(slice_for_stream_id(stream_id))
            .build()
    }

    #[tokio::test]
    async fn subscriber_receives_published_envelopes_for_its_topic() {
        let fan_out = InMemoryFanOut::new(16);
        let slice = slice_for_stream_id("order-1");
        let mut sub = fan_out.subscribe("order", slice);
        assert_eq!(fan_out.subscriber_count("order", slice), 1);

        fan_out.publish(&mk_envelope("order-1", 1)).await.unwrap();
        fan_out.publish(&mk_envelope("order-1", 2)).await.unwrap();

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(first.seq_nr(), 1);
        assert_eq!(second.seq_nr(), 2);
        assert_eq!(first.source(), EnvelopeSource::PubSub);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ignored() {
        let fan_out = InMemoryFanOut::default();
        fan_out.publish(&mk_envelope("order-1", 1)).await.unwrap();
        assert_eq!(fan_out.topic_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_stream_unsubscribes() {
        let fan_out = InMemoryFanOut::default();
        let slice = slice_for_stream_id("order-1");
        let sub = fan_out.subscribe("order", slice);
        assert_eq!(fan_out.subscriber_count("order", slice), 1);
        drop(sub);
        assert_eq!(fan_out.subscriber_count("order", slice), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_overwritten_envelopes() {
        let fan_out = InMemoryFanOut::new(2);
        let slice = slice_for_stream_id("order-1");
        let mut sub = fan_out.subscribe("order", slice);

        for seq in 1..=5 {
            fan_out.publish(&mk_envelope("order-1", seq)).await.unwrap();
        }

        // 缓冲区仅保留最后两条
        assert_eq!(sub.next().await.unwrap().seq_nr(), 4);
        assert_eq!(sub.next().await.unwrap().seq_nr(), 5);
    }
}
