//! Event-style command results.
//!
//! A [`QueryStream`] replays the outcome of one command as a sequence of
//! [`QueryEvent`]s: an optional `Error`, or `Fields` followed by one `Row`
//! per result row, and always exactly one closing `End`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::Error;
use crate::row::{Column, ResultSet, Row};

/// One notification from a [`QueryStream`].
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// The command failed. No `Fields` or `Row` event follows.
    Error(Error),
    /// Column metadata, emitted once before the first row.
    Fields(Arc<[Column]>),
    /// One result row.
    Row(Row),
    /// The command finished. Always the last event.
    End {
        /// Rows affected by a DML statement.
        affected_rows: u64,
        /// Auto-increment id generated by the statement.
        last_insert_id: u64,
    },
}

enum Pending {
    Error(Error),
    Fields(ResultSet),
    Rows(VecDeque<Row>, u64, u64),
    End(u64, u64),
    Done,
}

/// Lazily iterated outcome of a single command.
///
/// # Example
///
/// ```rust,ignore
/// use futures_util::StreamExt;
///
/// let mut stream = session.query_stream("SELECT id FROM users", &Params::new()).await;
/// while let Some(event) = stream.next().await {
///     match event {
///         QueryEvent::Error(err) => eprintln!("{err}"),
///         QueryEvent::Row(row) => println!("{:?}", row.get(0)),
///         _ => {}
///     }
/// }
/// ```
pub struct QueryStream {
    pending: Pending,
}

impl QueryStream {
    /// Wrap the outcome of a command.
    #[must_use]
    pub fn new(outcome: Result<ResultSet, Error>) -> Self {
        let pending = match outcome {
            Ok(result) => Pending::Fields(result),
            Err(err) => Pending::Error(err),
        };
        Self { pending }
    }

    /// Next event, or `None` after `End` has been delivered.
    pub fn next_event(&mut self) -> Option<QueryEvent> {
        match std::mem::replace(&mut self.pending, Pending::Done) {
            Pending::Error(err) => {
                self.pending = Pending::End(0, 0);
                Some(QueryEvent::Error(err))
            }
            Pending::Fields(result) => {
                let (affected, id) = (result.affected_rows, result.last_insert_id);
                if result.columns.is_empty() {
                    return Some(QueryEvent::End {
                        affected_rows: affected,
                        last_insert_id: id,
                    });
                }
                self.pending = Pending::Rows(result.rows.into(), affected, id);
                Some(QueryEvent::Fields(result.columns))
            }
            Pending::Rows(mut rows, affected, id) => match rows.pop_front() {
                Some(row) => {
                    self.pending = Pending::Rows(rows, affected, id);
                    Some(QueryEvent::Row(row))
                }
                None => Some(QueryEvent::End {
                    affected_rows: affected,
                    last_insert_id: id,
                }),
            },
            Pending::End(affected, id) => Some(QueryEvent::End {
                affected_rows: affected,
                last_insert_id: id,
            }),
            Pending::Done => None,
        }
    }

    /// Check if `End` has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.pending, Pending::Done)
    }

    /// Drain the stream into rows, or the command's error.
    pub fn collect_rows(mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        while let Some(event) = self.next_event() {
            match event {
                QueryEvent::Error(err) => return Err(err),
                QueryEvent::Row(row) => rows.push(row),
                QueryEvent::Fields(_) | QueryEvent::End { .. } => {}
            }
        }
        Ok(rows)
    }
}

impl Stream for QueryStream {
    type Item = QueryEvent;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next_event())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ErrorKind};
    use mariadb_types::SqlValue;

    fn labels(mut stream: QueryStream) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Some(event) = stream.next_event() {
            out.push(match event {
                QueryEvent::Error(_) => "error",
                QueryEvent::Fields(_) => "fields",
                QueryEvent::Row(_) => "row",
                QueryEvent::End { .. } => "end",
            });
        }
        out
    }

    #[test]
    fn test_rows_in_order() {
        let rs = ResultSet::rows(
            vec![Column::new("1", "BIGINT")],
            vec![vec![SqlValue::BigInt(1)], vec![SqlValue::BigInt(2)]],
        );
        assert_eq!(labels(QueryStream::new(Ok(rs))), ["fields", "row", "row", "end"]);
    }

    #[test]
    fn test_error_suppresses_fields_and_rows() {
        let err = Error::new(ErrorKind::Server, ErrorCode::ParseError, "syntax");
        assert_eq!(labels(QueryStream::new(Err(err))), ["error", "end"]);
    }

    #[test]
    fn test_statement_without_result_set() {
        let stream = QueryStream::new(Ok(ResultSet::affected(2)));
        assert_eq!(labels(stream), ["end"]);
    }

    #[test]
    fn test_end_fires_once() {
        let mut stream = QueryStream::new(Ok(ResultSet::affected(1)));
        assert!(matches!(stream.next_event(), Some(QueryEvent::End { affected_rows: 1, .. })));
        assert!(stream.is_finished());
        assert!(stream.next_event().is_none());
        assert!(stream.next_event().is_none());
    }

    #[test]
    fn test_collect_rows() {
        let rs = ResultSet::rows(vec![Column::new("a", "INT")], vec![vec![SqlValue::Int(7)]]);
        let rows = QueryStream::new(Ok(rs)).collect_rows().unwrap();
        assert_eq!(rows[0].get(0), Some(&SqlValue::Int(7)));
    }
}
