use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelyxCoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid addressing: {0}")]
    InvalidAddressing(String),

    #[error("Singular block coefficient in row {row}")]
    SingularBlock { row: usize },

    #[error("Algorithm did not converge")]
    NonConvergence,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unknown {kind} '{name}', valid entries are: {valid:?}")]
    UnknownSelection {
        kind: String,
        name: String,
        valid: Vec<String>,
    },

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("Message encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Message decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, HelyxCoreError>;

/// A violated usage contract. These are never recovered from: the full
/// context is logged and the thread panics with the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    pub operation: String,
    pub object: String,
    pub message: String,
}

impl FatalError {
    pub fn new(
        operation: impl Into<String>,
        object: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn raise(self) -> ! {
        log::error!("{}", self);
        panic!("{}", self)
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FOAM FATAL ERROR in {} for {}: {}",
            self.operation, self.object, self.message
        )
    }
}

/// Builds a [`FatalError`] from an operation, an object identity and a
/// formatted message, then raises it.
#[macro_export]
macro_rules! fatal_error {
    ($operation:expr, $object:expr, $($arg:tt)+) => {
        $crate::error::FatalError::new($operation, $object, format!($($arg)+)).raise()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_error_display_carries_context() {
        let err = FatalError::new("operator=", "BlockLduSystem(U)", "attempted assignment to self");
        assert_eq!(
            err.to_string(),
            "FOAM FATAL ERROR in operator= for BlockLduSystem(U): attempted assignment to self"
        );
    }

    #[test]
    #[should_panic(expected = "Inconsistent dimensions")]
    fn test_fatal_error_macro_panics() {
        fatal_error!("operator+=", "p", "Inconsistent dimensions {} += {}", "[0 2 -2]", "[1 -1 -2]");
    }
}
