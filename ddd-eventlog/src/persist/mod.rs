//! 持久化协议（persist）
//!
//! 定义事件日志在存储层的行形态（`StoredEvent`）与按切片区间查询的存储协议
//! （`EventLogStore`）。生产环境的存储引擎（写入路径、表结构、连接池）由上层提供实现并注入；
//! `inmemory` 特性下附带一个内存实现，覆盖写入、提交后扇出与查询。
//!
mod event_log_store;
#[cfg(feature = "inmemory")]
mod in_memory;
mod stored_event;

pub use event_log_store::{EventLogStore, SliceRangeQuery};
#[cfg(feature = "inmemory")]
pub use in_memory::InMemoryEventLog;
pub use stored_event::StoredEvent;
