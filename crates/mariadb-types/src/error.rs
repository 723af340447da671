//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur when converting a Rust value into a [`SqlValue`].
///
/// [`SqlValue`]: crate::SqlValue
#[derive(Debug, Clone, Error)]
pub enum TypeError {
    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Unsupported type conversion.
    #[error("unsupported conversion from {from} to {to}")]
    UnsupportedConversion {
        /// Source type.
        from: String,
        /// Target type.
        to: &'static str,
    },
}
