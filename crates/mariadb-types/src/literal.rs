//! Log literal rendering of values.
//!
//! Error messages reproduce the failing call as
//! `sql: <text> - parameters:[<values>]`. The values are rendered here, in
//! a form that does not depend on the process locale or time zone:
//!
//! | Value | Literal |
//! |-------|---------|
//! | NULL | `null` |
//! | numbers, booleans | as written in Rust (`1`, `2.5`, `true`) |
//! | strings | single-quoted, `'` and `\` backslash-escaped |
//! | binaries | `0x` followed by lowercase hex |
//! | dates | `'MM/DD/YYYY'` |
//! | times | `'HH:MM:SS.mmm'` |
//! | date-times | `'MM/DD/YYYY HH:MM:SS.mmm'` |

use std::fmt::{self, Write};

use crate::value::SqlValue;

#[cfg(feature = "chrono")]
const DATE_FORMAT: &str = "%m/%d/%Y";
#[cfg(feature = "chrono")]
const TIME_FORMAT: &str = "%H:%M:%S%.3f";
#[cfg(feature = "chrono")]
const DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S%.3f";

/// Display adapter rendering a [`SqlValue`] as a log literal.
///
/// ```
/// use mariadb_types::{Literal, SqlValue};
///
/// let value = SqlValue::Binary(bytes::Bytes::from_static(&[0x01, 0xff]));
/// assert_eq!(Literal(&value).to_string(), "0x01ff");
/// assert_eq!(Literal(&SqlValue::from("it's")).to_string(), r"'it\'s'");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Literal<'a>(pub &'a SqlValue);

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SqlValue::Null => f.write_str("null"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::TinyInt(v) => write!(f, "{v}"),
            SqlValue::SmallInt(v) => write!(f, "{v}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::BigInt(v) => write!(f, "{v}"),
            SqlValue::UnsignedBigInt(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Double(v) => write!(f, "{v}"),
            SqlValue::String(v) => write_quoted(f, v),
            SqlValue::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(v) => write!(f, "{v}"),
            #[cfg(feature = "uuid")]
            SqlValue::Uuid(v) => write!(f, "'{}'", v.hyphenated()),
            #[cfg(feature = "chrono")]
            SqlValue::Date(v) => write!(f, "'{}'", v.format(DATE_FORMAT)),
            #[cfg(feature = "chrono")]
            SqlValue::Time(v) => write!(f, "'{}'", v.format(TIME_FORMAT)),
            #[cfg(feature = "chrono")]
            SqlValue::DateTime(v) => write!(f, "'{}'", v.format(DATETIME_FORMAT)),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('\'')
}
