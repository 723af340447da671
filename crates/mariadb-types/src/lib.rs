//! # mariadb-types
//!
//! Value types shared by the MariaDB/MySQL client crates.
//!
//! Values flow in two directions: callers bind them as command parameters,
//! and transports hand them back as column values. Every value also has a
//! log literal form used when an error message has to reproduce the failing
//! call.
//!
//! ## Features
//!
//! - `chrono` (default): Enable date/time type support via chrono
//! - `uuid` (default): Enable UUID type support
//! - `decimal` (default): Enable decimal type support via rust_decimal
//!
//! ## Type Mappings
//!
//! | MariaDB Type | Rust Type |
//! |--------------|-----------|
//! | `BOOLEAN` | `bool` |
//! | `TINYINT` | `i8` |
//! | `SMALLINT` | `i16` |
//! | `INT` | `i32` |
//! | `BIGINT` | `i64` |
//! | `BIGINT UNSIGNED` | `u64` |
//! | `FLOAT` | `f32` |
//! | `DOUBLE` | `f64` |
//! | `DECIMAL` | `rust_decimal::Decimal` |
//! | `VARCHAR`/`TEXT` | `String` |
//! | `VARBINARY`/`BLOB` | `bytes::Bytes` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `DATETIME` | `chrono::NaiveDateTime` |
//! | `UUID` | `uuid::Uuid` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod literal;
pub mod to_sql;
pub mod value;

pub use error::TypeError;
pub use literal::Literal;
pub use to_sql::ToSql;
pub use value::SqlValue;
