//! Test fixture utilities.

use std::sync::Once;

use mariadb_client::{Column, Config, SqlValue};

use crate::mock_server::{MockResponse, MockServer};

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Client configuration pointing at the mock server.
#[must_use]
pub fn test_config() -> Config {
    Config::new()
        .host("mock")
        .user("test")
        .password("test")
        .database("testn")
}

/// A server answering the statements the behavioural suites rely on:
/// `SELECT 1`, `SELECT 2`, `DO 1`, a missing table, a syntax error and
/// a slow `SELECT SLEEP(1)`.
#[must_use]
pub fn standard_server() -> MockServer {
    MockServer::builder()
        .with_response("SELECT 1", MockResponse::scalar_int(1))
        .with_response("SELECT 2", MockResponse::scalar_int(2))
        .with_response("DO 1", MockResponse::affected(0))
        .with_response(
            "wrong query",
            MockResponse::error(
                1064,
                "42000",
                "You have an error in your SQL syntax; check the manual that corresponds to \
                 your MariaDB server version for the right syntax to use near 'wrong query' at line 1",
            ),
        )
        .with_response(
            "SELECT * FROM non_existing_table",
            MockResponse::error(1146, "42S02", "Table 'testn.non_existing_table' doesn't exist"),
        )
        .with_response(
            "SELECT SLEEP(1)",
            MockResponse::rows(
                vec![Column::new("SLEEP(1)", "BIGINT")],
                vec![vec![SqlValue::BigInt(0)]],
            )
            .delayed(std::time::Duration::from_secs(1)),
        )
        .build()
}
