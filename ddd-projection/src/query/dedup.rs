//! 去重过滤（Deduplicate）
//!
//! 以固定容量、按插入顺序淘汰的缓存剔除重复的完整信封：
//! - 无负载（回溯）信封无条件放行，不查询也不修改缓存；
//! - 完整信封以 `(stream_id, seq_nr)` 为键，命中即丢弃，未命中则放行并插入；
//! - 超出容量时淘汰最早插入的键，命中不会提升键的位置。
//!
use crate::error::{ProjectionError, ProjectionResult as Result};
use ddd_eventlog::envelope::Envelope;
use futures_core::Stream;
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

type DedupKey = (String, u64);

/// 有界 FIFO 键集合
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    keys: HashSet<DedupKey>,
    order: VecDeque<DedupKey>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ProjectionError::InvalidCapacity { capacity });
        }
        Ok(Self {
            capacity,
            keys: HashSet::with_capacity(capacity.min(4096)),
            order: VecDeque::with_capacity(capacity.min(4096)),
        })
    }

    pub fn contains(&self, stream_id: &str, seq_nr: u64) -> bool {
        // HashSet<(String, u64)> 无法以 (&str, u64) 借用查询
        self.keys.contains(&(stream_id.to_string(), seq_nr))
    }

    /// 插入键；已存在时返回 false 且不改变顺序
    pub fn insert(&mut self, stream_id: &str, seq_nr: u64) -> bool {
        let key = (stream_id.to_string(), seq_nr);
        if !self.keys.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 同步去重过滤器，单个查询独占
#[derive(Debug)]
pub struct DedupFilter {
    cache: DedupCache,
}

impl DedupFilter {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            cache: DedupCache::new(capacity)?,
        })
    }

    /// 是否放行该信封
    pub fn accept(&mut self, envelope: &Envelope) -> bool {
        if envelope.is_backtracking() {
            return true;
        }
        let (stream_id, seq_nr) = envelope.key();
        self.cache.insert(stream_id, seq_nr)
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }
}

/// 流适配器，见 [`EnvelopeStreamExt::deduplicate`]
pub struct Deduplicate<S> {
    inner: S,
    filter: DedupFilter,
}

impl<S> Deduplicate<S> {
    pub fn new(inner: S, capacity: usize) -> Result<Self> {
        Ok(Self {
            inner,
            filter: DedupFilter::new(capacity)?,
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S> Stream for Deduplicate<S>
where
    S: Stream<Item = Envelope> + Unpin,
{
    type Item = Envelope;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(envelope)) => {
                    if this.filter.accept(&envelope) {
                        return Poll::Ready(Some(envelope));
                    }
                    tracing::trace!(
                        stream_id = envelope.stream_id(),
                        seq_nr = envelope.seq_nr(),
                        "duplicate envelope dropped"
                    );
                }
                other => return other,
            }
        }
    }
}

pub trait EnvelopeStreamExt: Stream<Item = Envelope> + Sized {
    /// 以容量 `capacity` 的去重缓存过滤重复的完整信封；容量为 0 时报错
    fn deduplicate(self, capacity: usize) -> Result<Deduplicate<Self>> {
        Deduplicate::new(self, capacity)
    }
}

impl<S> EnvelopeStreamExt for S where S: Stream<Item = Envelope> + Sized {}
