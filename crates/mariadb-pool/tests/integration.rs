//! Pool scheduler tests against the scripted server.
//!
//! All tests run on a paused clock, so timeouts fire at exact offsets.
//!
//! Run with:
//! ```bash
//! cargo test -p mariadb-driver-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mariadb_client::{ErrorCode, ErrorKind, Executor, Params, SessionState, params};
use mariadb_driver_pool::{Pool, PoolConfig};
use mariadb_testing::fixtures::{init_tracing, standard_server, test_config};
use mariadb_testing::{MockResponse, MockServer};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok, assert_pending};

async fn pool_with(server: &MockServer, config: PoolConfig) -> Pool {
    init_tracing();
    Pool::new(Arc::new(server.clone()), test_config(), config)
        .await
        .unwrap()
}

/// Let spawned pool tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn wait_for_queue(pool: &Pool, len: u32) {
    while pool.task_queue_size() < len {
        tokio::task::yield_now().await;
    }
}

fn assert_counts(pool: &Pool, active: u32, idle: u32) {
    let status = pool.status();
    assert_eq!(status.active, active, "active in {status:?}");
    assert_eq!(status.idle, idle, "idle in {status:?}");
    assert_eq!(status.total, active + idle, "total in {status:?}");
}

// =============================================================================
// Growth and Reuse
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pool_grows_lazily() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(10)).await;
    settle().await;
    assert_counts(&pool, 0, 0);
    assert_eq!(server.connect_count(), 0);

    let session = pool.get().await.unwrap();
    assert_counts(&pool, 1, 0);
    assert_eq!(session.state(), SessionState::Active);

    assert_ok!(session.release().await);
    assert_counts(&pool, 0, 1);
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_prewarms_min_connections() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new().connection_limit(4).min_connections(2),
    )
    .await;
    settle().await;

    assert_counts(&pool, 0, 2);
    assert_eq!(pool.task_queue_size(), 0);
    assert_eq!(pool.metrics().connections_created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pool_reuses_released_session() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2)).await;

    let first = pool.get().await.unwrap();
    let thread_id = first.thread_id();
    first.release().await.unwrap();

    let second = pool.get().await.unwrap();
    assert_eq!(second.thread_id(), thread_id);
    assert_eq!(server.connect_count(), 1);
    assert_eq!(pool.metrics().checkouts_successful, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pool_query_and_execute() {
    let server = standard_server();
    server.set_response("SELECT ? as a", MockResponse::custom(|_, params| {
        let value = params.get(0).and_then(|v| v.as_i64()).unwrap_or_default();
        MockResponse::scalar_int(value)
    }));
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let result = pool.query("SELECT ? as a", &params![7i64]).await.unwrap();
    assert_eq!(result.scalar().and_then(|v| v.as_i64()), Some(7));

    let result = pool.execute("DO 1", &Params::new()).await.unwrap();
    assert_eq!(result.affected_rows, 0);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_as_executor() {
    async fn select_one<E: Executor>(executor: &mut E) -> i64 {
        executor
            .query("SELECT 1", &Params::new())
            .await
            .unwrap()
            .scalar()
            .and_then(|v| v.as_i64())
            .unwrap()
    }

    let server = standard_server();
    let mut pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    assert_eq!(select_one(&mut pool).await, 1);

    let mut session = pool.get().await.unwrap();
    assert_eq!(select_one(&mut session).await, 1);
    session.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sessions_serialize_at_capacity_one() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let started = Instant::now();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.query("SELECT SLEEP(1)", &Params::new()).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(server.connect_count(), 1);
}

// =============================================================================
// Wait Queue
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_waiters_served_in_arrival_order() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let holder = pool.get().await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for i in 1..=5u32 {
        let pool_ref = pool.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let session = pool_ref.get().await.unwrap();
            order.lock().unwrap().push(i);
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.release().await.unwrap();
        }));
        wait_for_queue(&pool, i).await;
    }

    assert_eq!(pool.task_queue_size(), 5);
    holder.release().await.unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(server.connect_count(), 1);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_timeout_error() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .acquire_timeout(Duration::from_millis(200)),
    )
    .await;
    let holder = pool.get().await.unwrap();

    let err = pool.get().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pool);
    assert_eq!(err.errno(), 45028);
    assert_eq!(err.sql_state(), "HY000");
    assert_eq!(err.code(), ErrorCode::GetConnectionTimeout);
    assert!(!err.is_fatal());
    assert!(
        err.to_string()
            .starts_with("retrieve connection from pool timeout after 200")
    );
    assert!(
        err.to_string()
            .contains("(pool connections: active=1 idle=0 limit=1)")
    );
    assert_eq!(pool.task_queue_size(), 0);
    assert_eq!(pool.metrics().acquire_timeouts, 1);

    holder.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_measured_from_each_enqueue() {
    let server = standard_server();
    server.set_response(
        "SELECT SLEEP(2)",
        MockResponse::scalar_int(0).delayed(Duration::from_secs(2)),
    );
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .acquire_timeout(Duration::from_millis(500)),
    )
    .await;
    let started = Instant::now();

    let mut holder = pool.get().await.unwrap();
    let long = tokio::spawn(async move {
        let outcome = holder.query("SELECT SLEEP(2)", &Params::new()).await;
        holder.release().await.unwrap();
        outcome
    });

    let timed_query = |sql: &'static str| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let err = pool.query(sql, &Params::new()).await.unwrap_err();
            (err, started.elapsed())
        })
    };

    let first = timed_query("SELECT 1");
    let second = timed_query("SELECT 2");
    tokio::time::sleep(Duration::from_millis(200)).await;
    let third = timed_query("SELECT 3");

    for (task, expected) in [(first, 500), (second, 500), (third, 700)] {
        let (err, elapsed) = task.await.unwrap();
        assert_eq!(err.code(), ErrorCode::GetConnectionTimeout);
        assert!(
            elapsed >= Duration::from_millis(expected)
                && elapsed < Duration::from_millis(expected + 50),
            "timed out after {elapsed:?}, expected just after {expected}ms"
        );
    }

    assert_ok!(long.await.unwrap());
    assert_eq!(server.count("SELECT 1"), 0);
    assert_eq!(server.count("SELECT 3"), 0);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_waiter_removed_in_place() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .acquire_timeout(Duration::from_millis(300)),
    )
    .await;
    let holder = pool.get().await.unwrap();

    let early = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.thread_id()) })
    };
    wait_for_queue(&pool, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let late = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let session = pool.get().await?;
            let thread_id = session.thread_id();
            session.release().await?;
            Ok::<_, mariadb_client::Error>(thread_id)
        })
    };
    wait_for_queue(&pool, 2).await;

    // The first waiter gives up at 300ms; the second is still queued.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let err = early.await.unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::GetConnectionTimeout);
    assert_eq!(pool.task_queue_size(), 1);

    let thread_id = holder.thread_id();
    holder.release().await.unwrap();
    assert_eq!(late.await.unwrap().unwrap(), thread_id);
    assert_eq!(pool.task_queue_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_acquire_leaves_queue() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let holder = pool.get().await.unwrap();

    let waiting = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await })
    };
    wait_for_queue(&pool, 1).await;
    waiting.abort();
    assert!(waiting.await.unwrap_err().is_cancelled());
    assert_eq!(pool.task_queue_size(), 0);

    holder.release().await.unwrap();
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_timeout_waits_forever() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .acquire_timeout(Duration::ZERO),
    )
    .await;
    let holder = pool.get().await.unwrap();

    let waiting = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.thread_id()) })
    };
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(pool.task_queue_size(), 1);

    holder.release().await.unwrap();
    assert_ok!(waiting.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_counts_stay_consistent_under_load() {
    let server = standard_server();
    server.set_response(
        "SELECT SLEEP(0.01)",
        MockResponse::scalar_int(0).delayed(Duration::from_millis(10)),
    );
    let pool = pool_with(&server, PoolConfig::new().connection_limit(3)).await;

    let tasks: Vec<_> = (0..30)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.query("SELECT SLEEP(0.01)", &Params::new()).await })
        })
        .collect();

    while tasks.iter().any(|t| !t.is_finished()) {
        let status = pool.status();
        assert_eq!(status.total, status.active + status.idle);
        assert!(status.total + status.connecting <= 3, "{status:?}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for task in tasks {
        assert_ok!(task.await.unwrap());
    }

    assert_eq!(server.connect_count(), 3);
    assert_counts(&pool, 0, 3);
}

// =============================================================================
// Release and Rollback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_release_without_transaction_skips_rollback() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let mut session = pool.get().await.unwrap();
    session.query("SELECT 1", &Params::new()).await.unwrap();
    session.release().await.unwrap();

    assert_eq!(server.count("ROLLBACK"), 0);
    assert_eq!(pool.metrics().rollbacks_performed, 0);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_rolls_back_open_transaction() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let mut session = pool.get().await.unwrap();
    let thread_id = session.thread_id();
    session.begin_transaction().await.unwrap();
    session
        .execute("INSERT INTO t VALUES (?)", &params![1i64])
        .await
        .unwrap();
    assert!(session.in_transaction());
    session.end().await.unwrap();

    assert_eq!(
        server.statements(thread_id),
        ["START TRANSACTION", "INSERT INTO t VALUES (?)", "ROLLBACK"]
    );
    assert_eq!(pool.metrics().rollbacks_performed, 1);
    assert_counts(&pool, 0, 1);

    let session = pool.get().await.unwrap();
    assert!(!session.in_transaction());
    session.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reset_on_release_disabled_keeps_transaction() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new().connection_limit(1).reset_on_release(false),
    )
    .await;

    let mut session = pool.get().await.unwrap();
    session.begin_transaction().await.unwrap();
    session.release().await.unwrap();

    assert_eq!(server.count("ROLLBACK"), 0);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_rollback_closes_session() {
    let server = standard_server();
    server.set_response("ROLLBACK", MockResponse::DropLink);
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let mut session = pool.get().await.unwrap();
    session.begin_transaction().await.unwrap();
    let err = session.release().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code(), ErrorCode::SocketUnexpectedClose);

    assert_eq!(pool.metrics().rollbacks_failed, 1);
    assert_eq!(pool.active_connections(), 0);
    settle().await;
    assert_counts(&pool, 0, 1);
    assert_eq!(server.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_returns_session() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let session = pool.get().await.unwrap();
    drop(session);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_with_open_transaction_rolls_back() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let mut session = pool.get().await.unwrap();
    session.begin_transaction().await.unwrap();
    drop(session);
    settle().await;

    assert_eq!(server.count("ROLLBACK"), 1);
    assert_counts(&pool, 0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_hands_off_to_waiter() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let holder = pool.get().await.unwrap();

    let waiting = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await })
    };
    wait_for_queue(&pool, 1).await;

    holder.release().await.unwrap();
    // Routed to the waiter without passing through the idle set.
    assert_counts(&pool, 1, 0);
    assert_eq!(pool.task_queue_size(), 0);

    let session = waiting.await.unwrap().unwrap();
    session.release().await.unwrap();
    assert_counts(&pool, 0, 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_wrong_query_is_not_fatal() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let err = pool.query("wrong query", &Params::new()).await.unwrap_err();
    assert!(err.to_string().contains("You have an error in your SQL syntax"));
    assert_eq!(err.sql_state(), "42000");
    assert_eq!(err.code().symbol(), "ER_PARSE_ERROR");
    assert!(!err.is_fatal());

    assert_counts(&pool, 0, 1);
    assert_eq!(pool.metrics().connections_closed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_replaces_session() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(2)
            .min_connections(2)
            .min_delay_validation(Duration::from_millis(200)),
    )
    .await;
    settle().await;
    assert_counts(&pool, 0, 2);

    let mut session = pool.get().await.unwrap();
    assert_counts(&pool, 1, 1);

    let err = session
        .query("KILL CONNECTION_ID()", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.sql_state(), "70100");
    assert!(err.is_fatal());

    // Counted out the moment it failed, replacement already on its way.
    assert_counts(&pool, 0, 1);
    assert_eq!(pool.status().connecting, 1);

    session.end().await.unwrap();
    settle().await;
    assert_counts(&pool, 0, 2);
    assert_eq!(server.connect_count(), 3);
    assert_eq!(pool.metrics().connections_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pooled_query_fatal_error_recovers() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2).min_connections(2)).await;
    settle().await;

    let err = pool
        .query("KILL CONNECTION_ID()", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.errno(), 1927);
    assert!(err.to_string().contains("sql: KILL CONNECTION_ID() - parameters:[]"));

    settle().await;
    assert_counts(&pool, 0, 2);
    assert_ok!(pool.query("DO 1", &Params::new()).await);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_opens_replacement() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2).min_connections(2)).await;
    settle().await;

    let session = pool.get().await.unwrap();
    let thread_id = session.thread_id();
    session.destroy();
    assert_counts(&pool, 0, 1);
    assert!(!server.open_thread_ids().contains(&thread_id));

    settle().await;
    assert_counts(&pool, 0, 2);
}

#[tokio::test(start_paused = true)]
async fn test_validation_after_min_delay() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .min_delay_validation(Duration::from_millis(200)),
    )
    .await;

    pool.get().await.unwrap().release().await.unwrap();
    pool.get().await.unwrap().release().await.unwrap();
    assert_eq!(server.ping_count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let session = pool.get().await.unwrap();
    assert_eq!(server.ping_count(), 1);
    assert!(session.metadata().unwrap().last_checked_at.is_some());
    session.release().await.unwrap();

    pool.get().await.unwrap().release().await.unwrap();
    assert_eq!(server.ping_count(), 1);
    assert_eq!(pool.metrics().health_checks_performed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_min_delay_always_validates() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .min_delay_validation(Duration::ZERO),
    )
    .await;

    for _ in 0..3 {
        pool.get().await.unwrap().release().await.unwrap();
    }
    assert_eq!(server.ping_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_retries_with_new_session() {
    let server = standard_server();
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .min_delay_validation(Duration::from_millis(100)),
    )
    .await;

    let first = pool.get().await.unwrap();
    let stale_thread = first.thread_id();
    first.release().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    server.fail_pings(true);

    let session = pool.get().await.unwrap();
    assert_ne!(session.thread_id(), stale_thread);
    assert_eq!(server.connect_count(), 2);

    let metrics = pool.metrics();
    assert_eq!(metrics.health_checks_performed, 1);
    assert_eq!(metrics.health_checks_failed, 1);
    assert_eq!(metrics.connections_closed, 1);
    session.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stalled_health_check_times_out() {
    let server = standard_server();
    server.set_ping_delay(Some(Duration::from_secs(60)));
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .acquire_timeout(Duration::from_millis(500))
            .min_delay_validation(Duration::ZERO),
    )
    .await;

    let start = Instant::now();
    let err = pool.get().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GetConnectionTimeout);
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_secs(1));

    // The stalled session is closed and replaced.
    settle().await;
    assert_eq!(pool.metrics().connections_closed, 1);
    assert_counts(&pool, 0, 1);

    server.set_ping_delay(None);
    let session = pool.get().await.unwrap();
    assert_eq!(server.connect_count(), 2);
    session.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_link_drop_evicts_session() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2).min_connections(1)).await;
    settle().await;
    let open = server.open_thread_ids();
    assert_eq!(open.len(), 1);
    let thread_id = open[0];

    server.drop_link(thread_id);
    settle().await;

    assert_counts(&pool, 0, 1);
    assert_eq!(server.connect_count(), 2);
    assert_eq!(pool.metrics().connections_closed, 1);
    let session = pool.get().await.unwrap();
    assert_ne!(session.thread_id(), thread_id);
    assert_eq!(server.ping_count(), 0);
    session.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_reaches_waiter() {
    let server = standard_server();
    server.reject_next_connects(1);
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let err = pool.get().await.unwrap_err();
    assert_eq!(err.errno(), 1045);
    assert_eq!(err.sql_state(), "28000");
    assert!(err.is_fatal());
    assert_eq!(pool.metrics().checkouts_failed, 1);

    assert_ok!(pool.get().await);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_retried_for_remaining_waiters() {
    let server = standard_server();
    server.reject_next_connects(1);
    server.set_connect_delay(Some(Duration::from_millis(10)));
    let pool = pool_with(
        &server,
        PoolConfig::new()
            .connection_limit(1)
            .create_retry_backoff(Duration::from_millis(50)),
    )
    .await;

    let first = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.thread_id()) })
    };
    wait_for_queue(&pool, 1).await;
    let second = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.thread_id()) })
    };
    wait_for_queue(&pool, 2).await;
    assert_eq!(pool.status().connecting, 1);

    let err = first.await.unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccessDenied);
    assert_ok!(second.await.unwrap());
    assert_eq!(server.connect_count(), 1);
}

// =============================================================================
// try_get and detach
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_try_get_never_creates() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2)).await;

    assert!(pool.try_get().await.unwrap().is_none());
    settle().await;
    assert_eq!(server.connect_count(), 0);
    assert_eq!(pool.task_queue_size(), 0);

    pool.get().await.unwrap().release().await.unwrap();
    let session = pool.try_get().await.unwrap();
    assert!(session.is_some());
    assert_counts(&pool, 1, 0);
}

#[tokio::test(start_paused = true)]
async fn test_detach_takes_session_out_of_pool() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let pooled = pool.get().await.unwrap();
    let mut session = pooled.detach().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(pool.active_connections(), 0);

    settle().await;
    assert_counts(&pool, 0, 1);

    assert_ok!(session.query("SELECT 1", &Params::new()).await);
    session.end().await.unwrap();
    assert_counts(&pool, 0, 1);
}

// =============================================================================
// Pool End
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_get_after_end() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    pool.end().await.unwrap();
    assert!(pool.is_closed());

    let err = pool.get().await.unwrap_err();
    assert!(err.to_string().contains("pool is closed"));
    assert_eq!(err.sql_state(), "HY000");
    assert_eq!(err.errno(), 45027);
    assert_eq!(err.code().symbol(), "ER_POOL_ALREADY_CLOSED");

    let err = pool.query("select ?", &params![1i64]).await.unwrap_err();
    assert_eq!(err.errno(), 45027);
    assert_eq!(
        err.to_string(),
        "pool is closed\nsql: select ? - parameters:[1]"
    );
    assert_err!(pool.try_get().await);
}

#[tokio::test(start_paused = true)]
async fn test_end_closes_idle_sessions() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(3).min_connections(3)).await;
    settle().await;
    assert_eq!(server.open_connections(), 3);

    pool.end().await.unwrap();
    assert_counts(&pool, 0, 0);
    assert_eq!(server.open_connections(), 0);
    assert_eq!(pool.metrics().connections_closed, 3);

    // Idempotent.
    assert_ok!(pool.end().await);
}

#[tokio::test(start_paused = true)]
async fn test_end_rejects_queued_requests() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let holder = pool.get().await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get().await.map(|s| s.thread_id()) })
        })
        .collect();
    wait_for_queue(&pool, 3).await;

    let ending = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.end().await })
    };
    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::PoolAlreadyClosed);
    }
    assert_eq!(pool.task_queue_size(), 0);
    assert!(!ending.is_finished());

    holder.release().await.unwrap();
    assert_ok!(ending.await.unwrap());
    assert_counts(&pool, 0, 0);
    assert_eq!(pool.status().connecting, 0);
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_after_end_began_closes_session() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;
    let holder = pool.get().await.unwrap();

    let mut queued = tokio_test::task::spawn(pool.get());
    assert_pending!(queued.poll());
    assert_eq!(pool.task_queue_size(), 1);

    // Handed straight to the queued request, which has not run yet.
    holder.release().await.unwrap();
    assert_eq!(pool.task_queue_size(), 0);
    assert_counts(&pool, 1, 0);

    let ending = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.end().await })
    };
    settle().await;
    assert!(!ending.is_finished());

    drop(queued);
    assert_counts(&pool, 0, 0);
    assert_ok!(ending.await.unwrap());
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_commands_refused_after_end_began() {
    let server = standard_server();
    let pool = pool_with(&server, PoolConfig::new().connection_limit(1)).await;

    let mut session = pool.get().await.unwrap();
    session.begin_transaction().await.unwrap();

    let ending = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.end().await })
    };
    settle().await;

    let err = session.query("SELECT 1", &Params::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PoolAlreadyClosed);
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("sql: SELECT 1 - parameters:[]"));
    assert_eq!(session.state(), SessionState::Active);

    session.release().await.unwrap();
    assert_eq!(server.count("ROLLBACK"), 1);
    assert_ok!(ending.await.unwrap());
    assert_counts(&pool, 0, 0);
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_end_waits_for_sessions_being_opened() {
    let server = standard_server();
    server.set_connect_delay(Some(Duration::from_millis(100)));
    let pool = pool_with(&server, PoolConfig::new().connection_limit(2).min_connections(2)).await;

    pool.end().await.unwrap();
    assert_eq!(pool.status().connecting, 0);
    assert_eq!(server.open_connections(), 0);
    assert_eq!(pool.metrics().connections_created, 2);
}
