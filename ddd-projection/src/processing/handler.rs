//! 事务性处理器（TransactionalHandler）
//!
use async_trait::async_trait;
use ddd_eventlog::envelope::Envelope;

/// 逐个信封处理，每次调用都在独立事务中执行
#[async_trait]
pub trait TransactionalHandler<Tx>: Send + Sync
where
    Tx: Send,
{
    /// 处理器名称（用于日志与错误）
    fn handler_name(&self) -> &str;

    /// 首个信封之前调用一次
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 处理信封；返回错误时事务回滚，处理终止
    async fn process(&self, tx: &mut Tx, envelope: &Envelope) -> anyhow::Result<()>;

    /// 处理结束（流结束、取消或失败）后调用一次
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
