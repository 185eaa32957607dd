use helyx_core::HelyxCoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionError {
    #[error("Helyx core error: {0}")]
    HelyxCoreError(#[from] HelyxCoreError), // Bad or missing dictionary entries

    #[error("Unknown fvOption type '{0}', valid types are: {1:?}")]
    UnknownType(String, Vec<String>),

    #[error("fvOption '{0}' is missing keyword '{1}'")]
    MissingKeyword(String, String),

    #[error("fvOption '{0}' has a bad value for '{1}': {2}")]
    BadValue(String, String, String),

    #[error("Duplicate fvOption name found: {0}")]
    DuplicateName(String),

    #[error("fvOption '{0}' does not support fields of type {1}")]
    UnsupportedFieldType(String, String),
}
