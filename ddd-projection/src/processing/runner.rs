//! 处理运行器（ProcessingRunner）
//!
//! 从查询流逐个拉取信封，为每个信封开启事务并调用处理器：
//! - 成功即提交，记录该信封的位点；
//! - 失败即回滚，停止处理器并以 `ProjectionError::Handler` 终止；
//! - 上一个信封的处理与提交完成前不会拉取下一个，调用严格串行；
//! - 流结束或取消时正常返回最后提交的位点，供调用方持久化后续读。
//!
use super::handler::TransactionalHandler;
use super::transaction::{Transaction, TransactionManager};
use crate::error::{ProjectionError, ProjectionResult as Result};
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::offset::Offset;
use futures_core::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ProcessingRunner<M, H>
where
    M: TransactionManager,
    H: TransactionalHandler<M::Tx> + ?Sized,
{
    manager: Arc<M>,
    handler: Arc<H>,
}

impl<M, H> ProcessingRunner<M, H>
where
    M: TransactionManager,
    H: TransactionalHandler<M::Tx> + ?Sized,
{
    pub fn new(manager: Arc<M>, handler: Arc<H>) -> Self {
        Self { manager, handler }
    }

    pub fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    /// 运行至流结束、取消或首个处理失败
    pub async fn run<S>(&self, mut envelopes: S, token: CancellationToken) -> Result<Option<Offset>>
    where
        S: Stream<Item = Envelope> + Unpin + Send,
    {
        let name = self.handler.handler_name().to_string();
        self.handler
            .start()
            .await
            .map_err(|e| ProjectionError::Lifecycle {
                handler: name.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(handler = %name, "processing started");

        let mut last_committed: Option<Offset> = None;
        loop {
            let envelope = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = envelopes.next() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            if let Err(err) = self.process_one(&envelope).await {
                if let Err(stop_err) = self.handler.stop().await {
                    tracing::warn!(handler = %name, error = %stop_err, "handler stop failed");
                }
                return Err(err);
            }
            last_committed = Some(envelope.offset().clone());
        }

        self.handler
            .stop()
            .await
            .map_err(|e| ProjectionError::Lifecycle {
                handler: name.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(handler = %name, "processing stopped");
        Ok(last_committed)
    }

    async fn process_one(&self, envelope: &Envelope) -> Result<()> {
        let mut tx = self.manager.begin().await?;

        match self.handler.process(&mut tx, envelope).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                tracing::error!(
                    handler = self.handler.handler_name(),
                    stream_id = envelope.stream_id(),
                    seq_nr = envelope.seq_nr(),
                    error = %err,
                    "envelope processing failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(ProjectionError::Handler {
                    handler: self.handler.handler_name().to_string(),
                    stream_id: envelope.stream_id().to_string(),
                    seq_nr: envelope.seq_nr(),
                    reason: err.to_string(),
                })
            }
        }
    }
}
