//! Connection pooling with metrics example.
//!
//! Runs the pool against the scripted in-memory server, so no database is
//! needed: concurrent queries queue behind a small pool, a killed session
//! is replaced, and a queued request times out.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=mariadb_driver_pool=debug cargo run -p mariadb-driver-pool --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use mariadb_client::{Config, Params, params};
use mariadb_driver_pool::{Pool, PoolConfig};
use mariadb_testing::{MockResponse, MockServer};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = MockServer::builder()
        .with_response(
            "SELECT ? AS a",
            MockResponse::custom(|_, params| {
                let value = params.get(0).and_then(|v| v.as_i64()).unwrap_or_default();
                MockResponse::scalar_int(value).delayed(Duration::from_millis(50))
            }),
        )
        .with_response(
            "SELECT SLEEP(1)",
            MockResponse::scalar_int(0).delayed(Duration::from_secs(1)),
        )
        .build();

    let conn_str = "Server=localhost;User=app;Password=secret;Connection Limit=3;Min Connections=1;Acquire Timeout=500";
    let config = Config::from_connection_string(conn_str)?;
    let pool_config = PoolConfig::from_connection_string(conn_str)?;

    println!("=== Connection Pool with Metrics Example ===\n");
    println!("Pool configuration:");
    println!("  Connection limit: {}", pool_config.connection_limit);
    println!("  Min connections: {}", pool_config.min_connections);
    println!("  Acquire timeout: {:?}", pool_config.acquire_timeout);
    println!();

    let pool = Pool::new(Arc::new(server.clone()), config, pool_config).await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    print_pool_status(&pool);

    // Example 1: Concurrent usage
    println!("\n1. Concurrent pool usage (10 queries, 3 sessions):");
    let start = Instant::now();
    let handles: Vec<_> = (0..10i64)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.query("SELECT ? AS a", &params![i]).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    print_pool_status(&pool);

    let mut completed = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            completed += 1;
        }
    }
    println!("  Completed {} queries in {:?}", completed, start.elapsed());

    // Example 2: Transactions are rolled back on release
    println!("\n2. Implicit rollback:");
    let mut session = pool.get().await?;
    session.begin_transaction().await?;
    session
        .execute("INSERT INTO audit (event) VALUES (?)", &params!["login"])
        .await?;
    let thread_id = session.thread_id();
    session.release().await?;
    println!("  Statements on thread {}: {:?}", thread_id, server.statements(thread_id));

    // Example 3: A killed session is replaced
    println!("\n3. Server-side kill:");
    let err = pool
        .query("KILL CONNECTION_ID()", &Params::new())
        .await
        .unwrap_err();
    println!("  Error (fatal={}): {}", err.is_fatal(), err);
    print_pool_status(&pool);
    tokio::time::sleep(Duration::from_millis(10)).await;
    print_pool_status(&pool);

    // Example 4: Acquisition timeout
    println!("\n4. Acquisition timeout:");
    let busy: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.query("SELECT SLEEP(1)", &Params::new()).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    match pool.get().await {
        Ok(_) => println!("  Unexpectedly got a session"),
        Err(err) => println!("  {} ({})", err, err.code()),
    }
    for handle in busy {
        handle.await??;
    }

    println!("\n5. Final pool metrics:");
    print_pool_metrics(&pool);

    println!("\n6. Graceful shutdown:");
    pool.end().await?;
    print_pool_status(&pool);
    println!("  Open server connections: {}", server.open_connections());

    Ok(())
}

fn print_pool_status(pool: &Pool) {
    let status = pool.status();
    println!(
        "  Status: {} active, {} idle, {} queued, {}/{} connections ({:.1}% utilization)",
        status.active,
        status.idle,
        status.queued,
        status.total,
        status.max,
        status.utilization()
    );
}

fn print_pool_metrics(pool: &Pool) {
    let metrics = pool.metrics();
    println!("  Metrics:");
    println!("    Connections created: {}", metrics.connections_created);
    println!("    Connections closed: {}", metrics.connections_closed);
    println!(
        "    Checkout success rate: {:.2}%",
        metrics.checkout_success_rate() * 100.0
    );
    println!("    Acquire timeouts: {}", metrics.acquire_timeouts);
    println!(
        "    Rollbacks: {} performed, {} failed",
        metrics.rollbacks_performed, metrics.rollbacks_failed
    );
}
