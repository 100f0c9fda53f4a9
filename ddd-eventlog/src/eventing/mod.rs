//! 实时扇出（eventing）
//!
//! 写入路径在提交后把新事件尽力发布到 `(category, slice)` 主题，查询侧按切片订阅以降低延迟：
//! - `LiveFanOut`：发布/订阅协议；
//! - `Topic`：主题标识；
//! - `InMemoryFanOut`：基于 `tokio::sync::broadcast` 的进程内实现。
//!
//! 扇出只是优化手段：尽力而为、每次发布至多一次、无订阅者时直接丢弃，
//! 持久化存储始终是事实来源。
//!
mod fan_out;
#[cfg(feature = "inmemory")]
mod fan_out_inmemory;

pub use fan_out::{LiveFanOut, Topic};
#[cfg(feature = "inmemory")]
pub use fan_out_inmemory::InMemoryFanOut;
