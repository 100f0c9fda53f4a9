//! 事务性处理（processing）
//!
//! 把查询流交给逐信封的事务性回调：
//! - `TransactionManager` / `Transaction`：事务的开启、提交与回滚；
//! - `TransactionalHandler`：持有事务句柄处理单个信封；
//! - `ProcessingRunner`：严格串行地驱动处理器。
//!
mod handler;
mod runner;
mod transaction;

pub use handler::TransactionalHandler;
pub use runner::ProcessingRunner;
pub use transaction::{Transaction, TransactionManager};
