//! 流合并（StreamMerger）
//!
//! 把常规轮询、回溯轮询与实时扇出三路源合并为一条按需拉取的流：
//! - 每次 `poll_next` 从上一次产出的下一路开始轮询，避免某一路饿死其它路；
//! - 自身不缓冲，背压由轮询器的有界通道承担；
//! - 某一路结束即移出，全部结束时合并流结束；
//! - 实时信封经 `LiveSequenceGuard` 检查，只有是所在流的下一个序号时才放行；
//!   放行时位点替换为常规轮询器当前的位点，续读位置不会越过存储已读到的地方。
//!
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::offset::Offset;
use futures_core::Stream;
use futures_core::stream::BoxStream;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;

/// 合并源的类别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Query,
    Backtracking,
    Live,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Query => f.write_str("query"),
            SourceKind::Backtracking => f.write_str("backtracking"),
            SourceKind::Live => f.write_str("live"),
        }
    }
}

/// 每个流已放行的最大序号（仅统计完整信封），按插入顺序淘汰
#[derive(Debug)]
pub(crate) struct LiveSequenceGuard {
    capacity: usize,
    last: HashMap<String, u64>,
    order: VecDeque<String>,
}

impl LiveSequenceGuard {
    pub(crate) fn new(capacity: usize, start: &Offset) -> Self {
        let mut guard = Self {
            capacity: capacity.max(1),
            last: HashMap::new(),
            order: VecDeque::new(),
        };
        for (stream_id, seq_nr) in start.seen() {
            guard.record(stream_id, *seq_nr);
        }
        guard
    }

    /// 实时信封是否为所在流的下一个序号
    pub(crate) fn admits(&self, envelope: &Envelope) -> bool {
        let expected = self
            .last
            .get(envelope.stream_id())
            .map_or(1, |last| last + 1);
        envelope.seq_nr() == expected
    }

    pub(crate) fn observe(&mut self, envelope: &Envelope) {
        if envelope.is_backtracking() {
            return;
        }
        self.record(envelope.stream_id(), envelope.seq_nr());
    }

    fn record(&mut self, stream_id: &str, seq_nr: u64) {
        match self.last.get_mut(stream_id) {
            Some(last) => *last = (*last).max(seq_nr),
            None => {
                self.last.insert(stream_id.to_string(), seq_nr);
                self.order.push_back(stream_id.to_string());
                if self.order.len() > self.capacity {
                    if let Some(oldest) = self.order.pop_front() {
                        self.last.remove(&oldest);
                    }
                }
            }
        }
    }
}

pub struct StreamMerger {
    sources: Vec<(SourceKind, BoxStream<'static, Envelope>)>,
    next: usize,
    guard: LiveSequenceGuard,
    primary: Option<watch::Receiver<Offset>>,
}

impl StreamMerger {
    pub(crate) fn new(guard: LiveSequenceGuard) -> Self {
        Self {
            sources: Vec::with_capacity(3),
            next: 0,
            guard,
            primary: None,
        }
    }

    /// 跟随常规轮询器的位点，用于改写实时信封的位点
    pub(crate) fn follow_primary(&mut self, primary: watch::Receiver<Offset>) {
        self.primary = Some(primary);
    }

    /// 实时信封的提交时间可能领先常规轮询器；以其位点续读会跳过尚未轮询到的事件
    fn rebase_live(&self, envelope: Envelope) -> Envelope {
        let Some(primary) = &self.primary else {
            return envelope;
        };
        let read_timestamp = envelope.offset().read_timestamp();
        let offset = primary.borrow().clone().with_read_timestamp(read_timestamp);
        envelope.with_offset(offset)
    }

    pub(crate) fn push(&mut self, kind: SourceKind, source: BoxStream<'static, Envelope>) {
        self.sources.push((kind, source));
    }

    /// 丢弃全部源：实时订阅随之退订，轮询器的发送端随之失效
    pub(crate) fn clear(&mut self) {
        self.sources.clear();
        self.next = 0;
    }

    /// 仍在运行的源
    pub fn active_sources(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Stream for StreamMerger {
    type Item = Envelope;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        let this = self.get_mut();
        let mut polled = 0;

        while polled < this.sources.len() {
            let index = this.next % this.sources.len();
            let (kind, source) = &mut this.sources[index];
            let kind = *kind;

            match source.as_mut().poll_next(cx) {
                Poll::Ready(Some(envelope)) => {
                    if kind == SourceKind::Live && !this.guard.admits(&envelope) {
                        tracing::trace!(
                            stream_id = envelope.stream_id(),
                            seq_nr = envelope.seq_nr(),
                            "out-of-sequence live envelope left to the poller"
                        );
                        // 继续拉取同一路，保证其唤醒器已登记
                        continue;
                    }
                    this.guard.observe(&envelope);
                    this.next = index + 1;
                    let envelope = match kind {
                        SourceKind::Live => this.rebase_live(envelope),
                        _ => envelope,
                    };
                    return Poll::Ready(Some(envelope));
                }
                Poll::Ready(None) => {
                    tracing::debug!(source = %kind, "merged source finished");
                    this.sources.remove(index);
                    // 删除后下一路落在同一下标上
                    this.next = index;
                }
                Poll::Pending => {
                    this.next = index + 1;
                    polled += 1;
                }
            }
        }

        if this.sources.is_empty() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ddd_eventlog::slice::slice_for_stream_id;
    use futures_util::{StreamExt, stream};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn env(stream_id: &str, seq_nr: u64) -> Envelope {
        let now = Utc::now();
        Envelope::builder()
            .category("order".into())
            .stream_id(stream_id.into())
            .seq_nr(seq_nr)
            .payload(serde_json::json!(seq_nr))
            .produced_at(now)
            .offset(Offset::for_event(now, stream_id, seq_nr))
            .slice(slice_for_stream_id(stream_id))
            .build()
    }

    fn keys(envelopes: &[Envelope]) -> Vec<(String, u64)> {
        envelopes
            .iter()
            .map(|e| (e.stream_id().to_string(), e.seq_nr()))
            .collect()
    }

    fn merger() -> StreamMerger {
        StreamMerger::new(LiveSequenceGuard::new(100, &Offset::zero()))
    }

    #[tokio::test]
    async fn interleaves_sources_round_robin() {
        let mut merger = merger();
        merger.push(
            SourceKind::Query,
            stream::iter(vec![env("a", 1), env("a", 2), env("a", 3)]).boxed(),
        );
        merger.push(
            SourceKind::Backtracking,
            stream::iter(vec![env("b", 1).into_backtracking(), env("b", 2).into_backtracking()])
                .boxed(),
        );

        let out: Vec<Envelope> = merger.collect().await;
        assert_eq!(
            keys(&out),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 2),
                ("a".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn ends_when_every_source_ends() {
        let mut merger = merger();
        assert!(merger.is_terminated());
        merger.push(SourceKind::Query, stream::empty().boxed());
        merger.push(SourceKind::Live, stream::iter(vec![env("a", 1)]).boxed());
        assert_eq!(merger.active_sources(), vec![SourceKind::Query, SourceKind::Live]);

        assert_eq!(merger.next().await.map(|e| e.seq_nr()), Some(1));
        assert_eq!(merger.next().await, None);
        assert!(merger.is_terminated());
    }

    #[tokio::test]
    async fn live_envelopes_must_be_next_in_sequence() {
        let mut merger = merger();
        // a-2 先于 a-1 经由实时源到达：丢弃，留给轮询器按序补上
        merger.push(
            SourceKind::Live,
            stream::iter(vec![env("a", 2), env("a", 1), env("a", 2), env("a", 4)]).boxed(),
        );
        let out: Vec<Envelope> = merger.collect().await;
        assert_eq!(keys(&out), vec![("a".to_string(), 1), ("a".to_string(), 2)]);
    }

    #[tokio::test]
    async fn polled_envelopes_advance_the_live_guard() {
        let (tx, rx) = mpsc::channel(8);
        let (live_tx, live_rx) = mpsc::channel(8);
        let mut merger = merger();
        merger.push(SourceKind::Query, ReceiverStream::new(rx).boxed());
        merger.push(SourceKind::Live, ReceiverStream::new(live_rx).boxed());

        tx.send(env("a", 1)).await.unwrap();
        tx.send(env("a", 2)).await.unwrap();
        assert_eq!(merger.next().await.map(|e| e.seq_nr()), Some(1));
        assert_eq!(merger.next().await.map(|e| e.seq_nr()), Some(2));

        live_tx.send(env("a", 3)).await.unwrap();
        assert_eq!(merger.next().await.map(|e| e.seq_nr()), Some(3));
    }

    #[tokio::test]
    async fn live_envelopes_carry_the_primary_cursor() {
        let behind = Offset::for_event(Utc::now() - chrono::TimeDelta::seconds(5), "b", 1);
        let (primary_tx, primary_rx) = watch::channel(behind.clone());
        let (live_tx, live_rx) = mpsc::channel(8);
        let mut merger = merger();
        merger.follow_primary(primary_rx);
        merger.push(SourceKind::Live, ReceiverStream::new(live_rx).boxed());

        live_tx.send(env("a", 1)).await.unwrap();
        let first = merger.next().await.unwrap();
        assert_eq!(first.offset(), &behind);

        let ahead = Offset::for_event(Utc::now(), "b", 2);
        primary_tx.send_replace(ahead.clone());
        live_tx.send(env("a", 2)).await.unwrap();
        assert_eq!(merger.next().await.unwrap().offset(), &ahead);
    }

    #[tokio::test]
    async fn polled_envelopes_keep_their_own_offset() {
        let (_primary_tx, primary_rx) = watch::channel(Offset::zero());
        let mut merger = merger();
        merger.follow_primary(primary_rx);
        let polled = env("a", 1);
        let expected = polled.offset().clone();
        merger.push(SourceKind::Query, stream::iter(vec![polled]).boxed());

        assert_eq!(merger.next().await.unwrap().offset(), &expected);
    }

    #[test]
    fn guard_is_seeded_from_the_start_offset() {
        let start = Offset::for_event(Utc::now(), "a", 7);
        let guard = LiveSequenceGuard::new(10, &start);
        assert!(guard.admits(&env("a", 8)));
        assert!(!guard.admits(&env("a", 1)));
        assert!(guard.admits(&env("b", 1)));
        assert!(!guard.admits(&env("b", 2)));
    }

    #[test]
    fn guard_forgets_oldest_streams_beyond_capacity() {
        let mut guard = LiveSequenceGuard::new(2, &Offset::zero());
        guard.observe(&env("a", 1));
        guard.observe(&env("b", 1));
        guard.observe(&env("c", 1));
        // a 已被淘汰，视为未知流
        assert!(guard.admits(&env("a", 1)));
        assert!(guard.admits(&env("c", 2)));
        // 回溯信封不计入
        guard.observe(&env("c", 5).into_backtracking());
        assert!(guard.admits(&env("c", 2)));
    }
}
