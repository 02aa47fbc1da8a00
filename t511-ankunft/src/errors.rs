//! Error handling.
//!
//! Configuration and dependency errors are fatal and only happen at
//! startup. Fetch and parse errors are scoped to one source for one
//! refresh cycle.

pub use failure::Error;
use failure_derive::Fail;
use t511_util::impl_from_for_error;
use t511_util::http::{StatusCode, ListenError};
use siri_types::errors::ParseError;
use reqwest::Error as ReqwestError;
use std::io::Error as IoError;

/// Something wrong with the operator-supplied configuration.
#[derive(Fail, Debug)]
pub enum ConfigError {
    /// `sources` was empty or missing.
    #[fail(display = "at least one source must be configured")]
    NoSources,
    #[fail(display = "invalid duration {:?} for {}: {}", value, field, reason)]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: &'static str
    },
    #[fail(display = "invalid size {:?} for {}", value, field)]
    InvalidSize {
        field: &'static str,
        value: String
    },
    #[fail(display = "invalid color {:?} for palette entry {}", value, name)]
    InvalidColor {
        name: String,
        value: String
    },
    /// A color reference didn't name a palette entry.
    #[fail(display = "{} refers to unknown color {:?}", field, name)]
    UnknownColor {
        field: String,
        name: String
    },
    #[fail(display = "refresh interval ({} ms) is shorter than one scheduler tick ({} ms)", _0, _1)]
    IntervalBelowTick(u64, u64),
    #[fail(display = "{} must be positive", _0)]
    NotPositive(&'static str),
}

/// A collaborator we can't run without.
#[derive(Fail, Debug)]
pub enum DependencyError {
    #[fail(display = "time source unavailable")]
    TimeSource,
    #[fail(display = "failed to build HTTP client: {}", _0)]
    HttpClient(ReqwestError),
    #[fail(display = "{}", _0)]
    Listen(ListenError),
}
impl_from_for_error!(DependencyError,
                     ListenError => Listen);

/// Failure to fetch one source.
#[derive(Fail, Debug)]
pub enum FetchError {
    #[fail(display = "reqwest: {}", _0)]
    Reqwest(ReqwestError),
    #[fail(display = "I/O error reading response: {}", _0)]
    Io(IoError),
    #[fail(display = "unexpected status code {}", _0)]
    StatusCode(u16),
    /// The response didn't fit in the source's buffer.
    #[fail(display = "response larger than {} bytes", limit)]
    Oversize {
        limit: usize
    },
}
impl_from_for_error!(FetchError,
                     ReqwestError => Reqwest,
                     IoError => Io);

/// Why a source contributed no arrivals this cycle.
#[derive(Fail, Debug)]
pub enum CycleError {
    #[fail(display = "fetch failed: {}", _0)]
    Fetch(FetchError),
    #[fail(display = "parse failed: {}", _0)]
    Parse(ParseError),
    #[fail(display = "time source unavailable")]
    ClockUnavailable,
}
impl_from_for_error!(CycleError,
                     FetchError => Fetch,
                     ParseError => Parse);

/// Error that could occur when processing a request.
#[derive(Fail, Debug)]
pub enum AnkunftError {
    /// The given entity was not found.
    #[fail(display = "not found")]
    NotFound,
    /// A query parameter failed to parse.
    #[fail(display = "bad query parameter {}", _0)]
    BadParameter(&'static str),
}

impl StatusCode for AnkunftError {
    fn status_code(&self) -> u16 {
        use self::AnkunftError::*;

        match *self {
            NotFound => 404,
            BadParameter(_) => 400,
        }
    }
}

pub type AnkunftResult<T> = ::std::result::Result<T, AnkunftError>;
pub type Result<T, E = Error> = ::std::result::Result<T, E>;
