/// 实时按切片查询示例
/// 写入侧开启 publish-events 后，新事件经扇出低延迟送达，轮询器随后重读到的同一事件被去重
use anyhow::Result as AnyResult;
use ddd_eventlog::eventing::InMemoryFanOut;
use ddd_eventlog::offset::Offset;
use ddd_eventlog::persist::InMemoryEventLog;
use ddd_projection::query::SliceQueryEngine;
use ddd_projection::settings::QuerySettings;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let fan_out = Arc::new(InMemoryFanOut::default());
    let log = Arc::new(InMemoryEventLog::with_fan_out(fan_out.clone()));

    let settings = QuerySettings::from_json_str(
        r#"{
            "publish-events": true,
            "refresh-interval": 500,
            "behind-current-time": 50,
            "backtracking-interval": 2000
        }"#,
    )?;
    let engine = SliceQueryEngine::builder()
        .store(log.clone())
        .fan_out(fan_out)
        .settings(settings)
        .build();

    // 把切片空间分给 4 个消费者，这里只演示第一个
    let ranges = engine.slice_ranges(4)?;
    println!("slice ranges: {ranges:?}");

    let mut query = engine.events_by_slices("order", 0, 1023, Offset::zero())?;

    let writer = {
        let log = log.clone();
        tokio::spawn(async move {
            for i in 1..=5 {
                let id = format!("order-{}", i % 2);
                if let Err(err) = log.append("order", &id, vec![json!({ "line": i })]).await {
                    tracing::warn!(error = %err, "append failed");
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };

    let mut received = 0;
    while received < 5 {
        let Some(envelope) = query.next().await else {
            break;
        };
        if envelope.is_backtracking() {
            continue;
        }
        received += 1;
        println!(
            "{} #{} via {:?} (slice {}): {}",
            envelope.stream_id(),
            envelope.seq_nr(),
            envelope.source(),
            envelope.slice(),
            envelope.payload().map(|p| p.to_string()).unwrap_or_default()
        );
    }

    writer.await?;
    query.join().await;
    Ok(())
}
