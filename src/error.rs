//! Crate-level error type.

use crate::data::LoaderError;
use crate::results::ResultError;
use crate::segmentation::DispatchError;
use crate::settings_store::SettingsError;

/// Any error surfaced by a [`Session`](crate::session::Session) operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Results(#[from] ResultError),

    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Missing or invalid configuration detected before any work started
    #[error("Invalid input: {0}")]
    InputValidation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
