//! Error types shared by every resource subsystem.

use std::time::Duration;

use crate::res::Identifier;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Resource {} could not be found.", _0)]
    NotFound(Identifier),
    #[fail(display = "Resource {} has been registered already.", _0)]
    AlreadyExists(Identifier),
    #[fail(display = "Resource {} is being loaded by another thread.", _0)]
    AlreadyLoading(Identifier),
    #[fail(display = "Timed out after {:?} while waiting for resource {}.", _1, _0)]
    Timeout(Identifier, Duration),
    #[fail(display = "Failed to decode resource {}: {}", _0, _1)]
    DecodeFailure(Identifier, failure::Error),
    #[fail(display = "Out of memory while {}.", _0)]
    AllocationFailure(String),
    #[fail(display = "Cache has not been initialized.")]
    NotInitialized,
    #[fail(
        display = "Resource {} weighs {} which exceeds the cache budget {}.",
        _0, _1, _2
    )]
    OverBudget(Identifier, usize, usize),
    #[fail(display = "{}", _0)]
    InvalidParams(String),
    #[fail(display = "{}", _0)]
    Settings(serde_json::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Settings(err)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(err: std::collections::TryReserveError) -> Self {
        Error::AllocationFailure(format!("reserving storage ({})", err))
    }
}
