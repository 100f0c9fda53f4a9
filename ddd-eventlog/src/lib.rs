//! 事件日志基础库（ddd-eventlog）
//!
//! 为按切片分区的仅追加事件日志提供数据模型与协作方协议：
//! - 切片（`slice`）：流标识到固定范围整数桶的确定性映射；
//! - 位点（`offset`）：时间戳 + 每流已见序号，可比较、可续读；
//! - 信封（`envelope`）：交付给消费者的事件单元，负载可选；
//! - 持久化（`persist`）：存储行模型与按切片区间查询的 `EventLogStore` 协议；
//! - 扇出（`eventing`）：`(category, slice)` 主题上的尽力而为发布/订阅。
//!
//! 本 crate 不绑定具体存储与传输，`inmemory` 特性（默认开启）附带进程内实现，
//! 供测试、示例与本地开发使用。
//!
pub mod envelope;
pub mod error;
pub mod eventing;
pub mod offset;
pub mod persist;
pub mod slice;
