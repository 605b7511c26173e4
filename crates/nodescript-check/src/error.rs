//! Codec error types.

use serde::{Deserialize, Serialize};

/// Errors produced while coercing a value to a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be interpreted as the expected type.
    #[error("cannot convert {got} to {expected}{}", path_suffix(.path))]
    InvalidValue {
        expected: String,
        got: String,
        /// Dotted path of the offending value inside the converted one.
        path: String,
    },
}

fn path_suffix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at '{path}'")
    }
}

impl CodecError {
    pub(crate) fn invalid(expected: &str, got: &str, path: &str) -> Self {
        CodecError::InvalidValue {
            expected: expected.to_string(),
            got: got.to_string(),
            path: path.to_string(),
        }
    }
}
