//! 账户余额投影演示
//!
//! 写入侧持续追加存取款事件并发布到扇出，查询侧以实时按切片查询驱动事务性投影。
//! 可选参数：查询配置 JSON 文件路径。`RUST_LOG=debug` 可观察轮询与扇出细节。
//!
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::eventing::InMemoryFanOut;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::InMemoryEventLog;
use ddd_projection::error::ProjectionResult;
use ddd_projection::processing::{
    ProcessingRunner, Transaction, TransactionManager, TransactionalHandler,
};
use ddd_projection::query::SliceQueryEngine;
use ddd_projection::settings::QuerySettings;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const CATEGORY: &str = "account";

#[derive(Clone, Default)]
struct BalanceTable {
    rows: Arc<Mutex<BTreeMap<String, i64>>>,
}

struct BalanceTx {
    table: BalanceTable,
    pending: Vec<(String, i64)>,
}

#[async_trait]
impl Transaction for BalanceTx {
    async fn commit(self) -> ProjectionResult<()> {
        let mut rows = self.table.rows.lock().unwrap_or_else(|e| e.into_inner());
        for (account, delta) in self.pending {
            *rows.entry(account).or_default() += delta;
        }
        Ok(())
    }

    async fn rollback(self) -> ProjectionResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for BalanceTable {
    type Tx = BalanceTx;

    async fn begin(&self) -> ProjectionResult<BalanceTx> {
        Ok(BalanceTx {
            table: self.clone(),
            pending: Vec::new(),
        })
    }
}

struct BalanceProjection;

#[async_trait]
impl TransactionalHandler<BalanceTx> for BalanceProjection {
    fn handler_name(&self) -> &str {
        "account-balance"
    }

    async fn process(&self, tx: &mut BalanceTx, envelope: &Envelope) -> anyhow::Result<()> {
        // 回溯信封只说明该事件存在，余额以完整信封为准
        let Some(payload) = envelope.payload() else {
            tracing::debug!(
                stream_id = envelope.stream_id(),
                seq_nr = envelope.seq_nr(),
                "backtracking envelope"
            );
            return Ok(());
        };
        let delta = payload["delta"]
            .as_i64()
            .context("payload without delta")?;
        tx.pending.push((envelope.stream_id().to_string(), delta));
        tracing::info!(
            account = envelope.stream_id(),
            seq_nr = envelope.seq_nr(),
            delta,
            source = ?envelope.source(),
            "applied"
        );
        Ok(())
    }
}

fn load_settings() -> AnyResult<QuerySettings> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading settings from {path}"))?;
            Ok(QuerySettings::from_json_str(&json)?)
        }
        None => Ok(QuerySettings {
            publish_events: true,
            refresh_interval: Duration::from_millis(500),
            behind_current_time: Duration::from_millis(50),
            backtracking_interval: Duration::from_secs(2),
            backtracking_behind_current_time: Duration::from_secs(1),
            ..Default::default()
        }),
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let fan_out = Arc::new(InMemoryFanOut::default());
    let log = Arc::new(InMemoryEventLog::with_fan_out(fan_out.clone()));
    let engine = SliceQueryEngine::builder()
        .store(log.clone())
        .fan_out(fan_out)
        .settings(settings)
        .build();

    let table = BalanceTable::default();
    let runner = ProcessingRunner::new(Arc::new(table.clone()), Arc::new(BalanceProjection));
    let query = engine.events_by_slices(CATEGORY, 0, 1023, Offset::zero())?;

    let token = CancellationToken::new();
    let writer = {
        let log = log.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let accounts = ["acc-1", "acc-2", "acc-3"];
            for round in 1..=10i64 {
                for account in accounts {
                    let delta = if round % 4 == 0 { -round } else { round * 10 };
                    let payload = vec![json!({ "delta": delta })];
                    if let Err(err) = log.append(CATEGORY, account, payload).await {
                        tracing::warn!(error = %err, "append failed");
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            // 留出时间让轮询与回溯追平
            tokio::time::sleep(Duration::from_secs(3)).await;
            token.cancel();
        })
    };

    let stopper = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.cancel();
        }
    });

    let last = runner.run(query, token).await?;
    writer.await?;

    let rows = table.rows.lock().unwrap_or_else(|e| e.into_inner());
    for (account, balance) in rows.iter() {
        println!("{account}: {balance}");
    }
    if let Some(offset) = last {
        println!("resume from: {}", serde_json::to_string(&offset)?);
    }
    Ok(())
}
