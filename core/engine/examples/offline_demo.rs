//! Minimal composition-root example: a SQLite-backed engine over a real
//! HTTP transport.
//!
//! Run with `RUST_LOG=debug cargo run --example offline_demo`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backhaul_common::{Method, Priority};
use backhaul_engine::{EngineConfig, HttpTransport, SyncEngine};
use backhaul_store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(SqliteStore::open("backhaul-demo.db")?);
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(30))?);
    let engine = SyncEngine::new(store, transport, EngineConfig::default());
    engine.start();

    // Pretend the link just dropped: queue a write instead of sending it.
    engine.monitor().set_online(false);
    let action_id = engine
        .enqueue(
            "create-order",
            "https://httpbin.org/post",
            Method::Post,
            HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            Some(br#"{"sku":"A-1","qty":3}"#.to_vec()),
            Priority::High,
        )
        .await?;
    println!("queued {action_id} while offline");

    // Connectivity returns; the engine drains on its own.
    engine.monitor().set_online(true);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = engine.status().await?;
    println!(
        "pending={} draining={} online={}",
        status.pending_count, status.draining, status.online
    );
    for record in engine.sync_history(5).await? {
        println!(
            "drain at {}: {} succeeded, {} dropped",
            record.ran_at, record.succeeded, record.failed
        );
    }

    Ok(())
}
