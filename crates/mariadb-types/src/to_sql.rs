//! Trait for converting Rust types to SQL values.

use bytes::Bytes;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted to SQL values.
///
/// This trait is implemented for common Rust types to enable
/// type-safe parameter binding in commands.
pub trait ToSql {
    /// Convert this value to a SQL value.
    fn to_sql(&self) -> Result<SqlValue, TypeError>;

    /// Get the SQL type name for this value.
    fn sql_type(&self) -> &'static str;
}

macro_rules! impl_to_sql {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> Result<SqlValue, TypeError> {
                Ok(SqlValue::$variant(*self))
            }

            fn sql_type(&self) -> &'static str {
                $name
            }
        }
    };
}

impl_to_sql!(bool, Bool, "BOOLEAN");
impl_to_sql!(i8, TinyInt, "TINYINT");
impl_to_sql!(i16, SmallInt, "SMALLINT");
impl_to_sql!(i32, Int, "INT");
impl_to_sql!(i64, BigInt, "BIGINT");
impl_to_sql!(u64, UnsignedBigInt, "BIGINT UNSIGNED");
impl_to_sql!(f32, Float, "FLOAT");

impl ToSql for f64 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        if self.is_nan() {
            return Err(TypeError::UnsupportedConversion {
                from: "NaN".into(),
                to: "DOUBLE",
            });
        }
        Ok(SqlValue::Double(*self))
    }

    fn sql_type(&self) -> &'static str {
        "DOUBLE"
    }
}

impl ToSql for usize {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        i64::try_from(*self)
            .map(SqlValue::BigInt)
            .map_err(|_| TypeError::OutOfRange {
                target_type: "BIGINT",
            })
    }

    fn sql_type(&self) -> &'static str {
        "BIGINT"
    }
}

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }

    fn sql_type(&self) -> &'static str {
        "VARCHAR"
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "VARCHAR"
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for Bytes {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }

    fn sql_type(&self) -> &'static str {
        self.type_name()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            Some(v) => v.sql_type(),
            None => "NULL",
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (*self).to_sql()
    }

    fn sql_type(&self) -> &'static str {
        (*self).sql_type()
    }
}

#[cfg(feature = "uuid")]
impl_to_sql!(uuid::Uuid, Uuid, "UUID");

#[cfg(feature = "decimal")]
impl_to_sql!(rust_decimal::Decimal, Decimal, "DECIMAL");

#[cfg(feature = "chrono")]
impl_to_sql!(chrono::NaiveDate, Date, "DATE");

#[cfg(feature = "chrono")]
impl_to_sql!(chrono::NaiveTime, Time, "TIME");

#[cfg(feature = "chrono")]
impl_to_sql!(chrono::NaiveDateTime, DateTime, "DATETIME");
