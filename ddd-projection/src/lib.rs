//! 按切片分区的实时事件查询
//!
//! - `query`：常规轮询 + 回溯轮询 + 实时扇出的合并查询，带有界去重；
//! - `processing`：逐信封的事务性处理；
//! - `settings`：查询配置。
//!
pub mod error;
pub mod processing;
pub mod query;
pub mod settings;
