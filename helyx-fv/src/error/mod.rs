mod option_error;

pub use option_error::OptionError;
use derive_more::From;

use helyx_core::HelyxCoreError;

pub type Result<T> = core::result::Result<T, FvError>;

#[derive(Debug, From)]
pub enum FvError {
    // -- Externals
    #[from]
    HelyxCoreError(HelyxCoreError),

    #[from]
    Json(serde_json::Error),

    #[from]
    Encode(rmp_serde::encode::Error),

    #[from]
    Decode(rmp_serde::decode::Error),

    #[from]
    OptionError(OptionError),

    MeshError(String),

    FieldError(String),

    ObjectNotFound(String),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for FvError {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for FvError {}

// endregion: --- Error Boilerplate
