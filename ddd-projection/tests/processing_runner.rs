use anyhow::Result as AnyResult;
use async_trait::async_trait;
use ddd_eventlog::envelope::Envelope;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::InMemoryEventLog;
use ddd_projection::error::{ProjectionError, ProjectionResult};
use ddd_projection::processing::{
    ProcessingRunner, Transaction, TransactionManager, TransactionalHandler,
};
use ddd_projection::query::SliceQueryEngine;
use ddd_projection::settings::QuerySettings;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 以内存 Map 模拟读模型表：事务内暂存，提交时写入
#[derive(Clone, Default)]
struct ReadModel {
    balances: Arc<Mutex<HashMap<String, i64>>>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

struct StagedTx {
    model: ReadModel,
    staged: Vec<(String, i64)>,
}

#[async_trait]
impl Transaction for StagedTx {
    async fn commit(self) -> ProjectionResult<()> {
        let mut balances = self.model.balances.lock().unwrap();
        for (account, delta) in self.staged {
            *balances.entry(account).or_default() += delta;
        }
        self.model.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> ProjectionResult<()> {
        self.model.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for ReadModel {
    type Tx = StagedTx;

    async fn begin(&self) -> ProjectionResult<StagedTx> {
        Ok(StagedTx {
            model: self.clone(),
            staged: Vec::new(),
        })
    }
}

/// 记录并发度；金额为负时失败
#[derive(Default)]
struct BalanceProjection {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: AtomicUsize,
}

#[async_trait]
impl TransactionalHandler<StagedTx> for BalanceProjection {
    fn handler_name(&self) -> &str {
        "balance-projection"
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process(&self, tx: &mut StagedTx, envelope: &Envelope) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let amount = envelope
            .payload()
            .and_then(|p| p["amount"].as_i64())
            .ok_or_else(|| anyhow::anyhow!("missing amount"))?;
        tx.staged.push((envelope.stream_id().to_string(), amount));
        if amount < 0 {
            anyhow::bail!("negative amount {amount}");
        }
        Ok(())
    }
}

fn engine(log: Arc<InMemoryEventLog>) -> SliceQueryEngine {
    SliceQueryEngine::builder()
        .store(log)
        .settings(QuerySettings {
            refresh_interval: Duration::from_millis(20),
            behind_current_time: Duration::ZERO,
            backtracking_enabled: false,
            ..Default::default()
        })
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn processes_sequentially_and_commits_each_envelope() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::new());
    for account in ["acc-1", "acc-2"] {
        log.append(
            "account",
            account,
            vec![json!({"amount": 10}), json!({"amount": 5})],
        )
        .await?;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;

    let model = ReadModel::default();
    let handler = Arc::new(BalanceProjection::default());
    let runner = ProcessingRunner::new(Arc::new(model.clone()), handler.clone());

    let query = engine(log).current_events_by_slices("account", 0, 1023, Offset::zero())?;
    let last = runner.run(query, CancellationToken::new()).await?;

    assert!(last.is_some());
    assert_eq!(model.commits.load(Ordering::SeqCst), 4);
    assert_eq!(model.rollbacks.load(Ordering::SeqCst), 0);
    assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(handler.started.load(Ordering::SeqCst), 1);

    let balances = model.balances.lock().unwrap();
    assert_eq!(balances.get("acc-1"), Some(&15));
    assert_eq!(balances.get("acc-2"), Some(&15));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_failure_rolls_back_and_ends_the_run() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::new());
    log.append(
        "account",
        "acc-1",
        vec![
            json!({"amount": 10}),
            json!({"amount": -1}),
            json!({"amount": 7}),
        ],
    )
    .await?;

    let model = ReadModel::default();
    let runner = ProcessingRunner::new(
        Arc::new(model.clone()),
        Arc::new(BalanceProjection::default()),
    );

    // 无限查询：只有处理失败才会结束
    let query = engine(log).events_by_slices("account", 0, 1023, Offset::zero())?;
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run(query, CancellationToken::new()),
    )
    .await?
    .unwrap_err();

    match err {
        ProjectionError::Handler {
            handler,
            stream_id,
            seq_nr,
            reason,
        } => {
            assert_eq!(handler, "balance-projection");
            assert_eq!(stream_id, "acc-1");
            assert_eq!(seq_nr, 2);
            assert!(reason.contains("negative"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(model.commits.load(Ordering::SeqCst), 1);
    assert_eq!(model.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(model.balances.lock().unwrap().get("acc-1"), Some(&10));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_the_token_ends_a_live_run() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::new());
    log.append("account", "acc-1", vec![json!({"amount": 1})]).await?;

    let model = ReadModel::default();
    let runner = ProcessingRunner::new(
        Arc::new(model.clone()),
        Arc::new(BalanceProjection::default()),
    );
    let query = engine(log).events_by_slices("account", 0, 1023, Offset::zero())?;

    let token = CancellationToken::new();
    let stopper = token.clone();
    let commits = model.commits.clone();
    tokio::spawn(async move {
        while commits.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stopper.cancel();
    });

    let last = tokio::time::timeout(Duration::from_secs(5), runner.run(query, token)).await??;
    assert_eq!(last.map(|o| o.seen().get("acc-1").copied()), Some(Some(1)));
    Ok(())
}
