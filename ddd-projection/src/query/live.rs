//! 实时源：订阅切片区间内每个切片的扇出主题，合并为一条流
//!
use super::SliceRange;
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::eventing::LiveFanOut;
use futures_core::stream::BoxStream;
use futures_util::stream::select_all;
use futures_util::{StreamExt, future};

/// 订阅在调用时即完成；丢弃返回的流即退订全部主题
pub(crate) fn subscribe_range(
    fan_out: &dyn LiveFanOut,
    range: &SliceRange,
) -> BoxStream<'static, Envelope> {
    let category = range.category.clone();
    let subscriptions = (range.min_slice..=range.max_slice)
        .map(|slice| fan_out.subscribe(&category, slice))
        .collect::<Vec<_>>();

    tracing::debug!(
        category = %category,
        min_slice = range.min_slice,
        max_slice = range.max_slice,
        "subscribed to live fan-out"
    );

    select_all(subscriptions)
        // 主题按类别划分，不同类别不应出现在同一订阅中
        .filter(move |envelope| future::ready(envelope.category() == category))
        .boxed()
}
