//! # mariadb-testing
//!
//! Test infrastructure for the MariaDB client and pool.
//!
//! ## Features
//!
//! - Scripted in-memory server implementing the client's `Connector` and
//!   `Transport` traits (no database or network required)
//! - Server-side behaviours the pool must react to: killed connections,
//!   dropped links, rejected or slow connects, failing health probes
//! - A command journal per thread id for asserting what reached the server
//! - Test fixture utilities
//!
//! ## Example
//!
//! ```rust,ignore
//! use mariadb_client::Session;
//! use mariadb_testing::fixtures::{standard_server, test_config};
//!
//! #[tokio::test]
//! async fn test_select() {
//!     let server = standard_server();
//!     let mut session = Session::connect(&server, &test_config()).await.unwrap();
//!     let rs = session.query("SELECT 1", &Default::default()).await.unwrap();
//!     assert_eq!(server.count("SELECT 1"), 1);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{JournalEntry, MockResponse, MockServer, MockTransport};
