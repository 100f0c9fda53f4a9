//! 事务协议（Transaction / TransactionManager）
//!
//! 处理回调所需的作用域事务：由管理器开启，处理成功提交、失败回滚。
//! 启用 `infra-sqlx` 特性时为 `sqlx::PgPool` 提供实现。
//!
use crate::error::ProjectionResult as Result;
use async_trait::async_trait;

#[async_trait]
pub trait Transaction: Send + Sized {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Transaction;

    /// 为一个信封开启事务
    async fn begin(&self) -> Result<Self::Tx>;
}

#[cfg(feature = "infra-sqlx")]
mod postgres {
    use super::{Transaction, TransactionManager};
    use crate::error::{ProjectionError, ProjectionResult as Result};
    use async_trait::async_trait;
    use sqlx::{PgPool, Postgres};

    #[async_trait]
    impl Transaction for sqlx::Transaction<'static, Postgres> {
        async fn commit(self) -> Result<()> {
            sqlx::Transaction::commit(self)
                .await
                .map_err(|e| ProjectionError::Transaction(e.to_string()))
        }

        async fn rollback(self) -> Result<()> {
            sqlx::Transaction::rollback(self)
                .await
                .map_err(|e| ProjectionError::Transaction(e.to_string()))
        }
    }

    #[async_trait]
    impl TransactionManager for PgPool {
        type Tx = sqlx::Transaction<'static, Postgres>;

        async fn begin(&self) -> Result<Self::Tx> {
            sqlx::Pool::begin(self)
                .await
                .map_err(|e| ProjectionError::Transaction(e.to_string()))
        }
    }
}
