//! 扇出（LiveFanOut）协议
//!
//! 发布为异步（写入路径可能跨进程），订阅为同步并返回 `'static` 事件流，
//! 以便查询在构造时即可完成订阅、在取消时随流一起同步退订。
//!
use crate::{envelope::Envelope, error::EventLogResult as Result, slice::Slice};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// 扇出主题：每个 `(category, slice)` 一个
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    category: String,
    slice: Slice,
}

impl Topic {
    pub fn new(category: impl Into<String>, slice: Slice) -> Self {
        Self {
            category: category.into(),
            slice,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn slice(&self) -> Slice {
        self.slice
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eventlog-{}-{}", self.category, self.slice)
    }
}

#[async_trait]
pub trait LiveFanOut: Send + Sync {
    /// 发布到信封所属 `(category, slice)` 主题；无订阅者不视为错误
    async fn publish(&self, envelope: &Envelope) -> Result<()>;

    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<()> {
        for envelope in envelopes {
            self.publish(envelope).await?;
        }
        Ok(())
    }

    /// 订阅单个切片主题；丢弃返回的流即退订
    fn subscribe(&self, category: &str, slice: Slice) -> BoxStream<'static, Envelope>;
}

#[async_trait]
impl<T> LiveFanOut for Arc<T>
where
    T: LiveFanOut + ?Sized,
{
    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        (**self).publish(envelope).await
    }

    fn subscribe(&self, category: &str, slice: Slice) -> BoxStream<'static, Envelope> {
        (**self).subscribe(category, slice)
    }
}
