//! Positional command parameters.
//!
//! Parameters bind to `?` placeholders by position. A slot may be explicitly
//! left unset, which mirrors a caller passing an undefined value; validation
//! rejects such a slot before the command reaches the transport.
//!
//! ```rust
//! use mariadb_client::{params, Params};
//!
//! let params: Params = params![1i32, "hh", Option::<i32>::None];
//! assert_eq!(params.render(), "1,'hh',null");
//! ```

use mariadb_types::{Literal, SqlValue, ToSql, TypeError};

pub(crate) static NO_PARAMS: Params = Params::EMPTY;

/// An ordered list of positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<Option<SqlValue>>,
}

impl Params {
    /// An empty parameter list.
    pub const EMPTY: Params = Params { values: Vec::new() };

    /// Create an empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bound value.
    #[must_use]
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(Some(value.into()));
        self
    }

    /// Append a slot with no value bound.
    #[must_use]
    pub fn unset(mut self) -> Self {
        self.values.push(None);
        self
    }

    /// Append any value implementing [`ToSql`].
    pub fn try_bind(mut self, value: &dyn ToSql) -> Result<Self, TypeError> {
        self.values.push(Some(value.to_sql()?));
        Ok(self)
    }

    /// Push a bound value in place.
    pub fn push(&mut self, value: impl Into<SqlValue>) {
        self.values.push(Some(value.into()));
    }

    /// Number of slots, bound or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at a zero-based position. `None` if the slot is unset or
    /// does not exist.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Iterate over all slots.
    pub fn iter(&self) -> impl Iterator<Item = Option<&SqlValue>> {
        self.values.iter().map(Option::as_ref)
    }

    /// Render the list as it appears in error messages: comma separated,
    /// values as SQL literals, unset slots as `undefined`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, slot) in self.values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match slot {
                Some(value) => out.push_str(&Literal(value).to_string()),
                None => out.push_str("undefined"),
            }
        }
        out
    }

    /// First problem with binding this list to `expected` placeholders, as
    /// `(1-based position, slot is present but unset)`.
    pub(crate) fn first_missing(&self, expected: usize) -> Option<(usize, bool)> {
        (0..expected).find_map(|i| match self.values.get(i) {
            Some(Some(_)) => None,
            Some(None) => Some((i + 1, true)),
            None => Some((i + 1, false)),
        })
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }
}

impl From<Vec<Option<SqlValue>>> for Params {
    fn from(values: Vec<Option<SqlValue>>) -> Self {
        Self { values }
    }
}

impl FromIterator<SqlValue> for Params {
    fn from_iter<I: IntoIterator<Item = SqlValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Some).collect(),
        }
    }
}

/// Build [`Params`] from a list of values convertible into [`SqlValue`].
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::new()$(.bind($value))+
    };
}

/// Count `?` placeholders in SQL text.
///
/// Placeholders inside quoted strings, quoted identifiers and comments are
/// ignored. Backslash escapes are honoured inside quotes.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'?' => count += 1,
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' && quote != b'`' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'#' => i = skip_line(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).is_none_or(u8::is_ascii_whitespace) =>
            {
                i = skip_line(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    count
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_render_mixed() {
        let params = Params::new()
            .bind(1i32)
            .bind(Bytes::from_static(&[0x01, 0xff]))
            .bind("hh")
            .bind(SqlValue::Null)
            .unset();
        assert_eq!(params.render(), "1,0x01ff,'hh',null,undefined");
    }

    #[test]
    fn test_macro() {
        let params = params![1i32, 2i64, "x"];
        assert_eq!(params.len(), 3);
        assert_eq!(params.get(2), Some(&SqlValue::String("x".into())));
        assert!(params![].is_empty());
    }

    #[test]
    fn test_try_bind() {
        let params = Params::new().try_bind(&42i32).unwrap();
        assert_eq!(params.get(0), Some(&SqlValue::Int(42)));
        assert!(Params::new().try_bind(&f64::NAN).is_err());
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(count_placeholders("INSERT INTO t VALUES (?, ?, ?)"), 3);
        assert_eq!(count_placeholders("SELECT '?', \"?\", `?` FROM t WHERE a = ?"), 1);
        assert_eq!(count_placeholders("SELECT 'it\\'s ?' , ?"), 1);
        assert_eq!(count_placeholders("SELECT ? -- why?\n, ?"), 2);
        assert_eq!(count_placeholders("SELECT ? # why?\n"), 1);
        assert_eq!(count_placeholders("SELECT /* ? */ ?"), 1);
        assert_eq!(count_placeholders("SELECT 5--?"), 1);
    }

    #[test]
    fn test_first_missing() {
        let sql_slots = 3;
        assert_eq!(params![1i32, 3i32].first_missing(sql_slots), Some((3, false)));
        assert_eq!(Params::new().first_missing(sql_slots), Some((1, false)));
        let with_hole = Params::new().bind(1i32).unset().bind(3i32);
        assert_eq!(with_hole.first_missing(sql_slots), Some((2, true)));
        assert_eq!(params![1i32, 2i32, 3i32, 4i32].first_missing(sql_slots), None);
    }
}
