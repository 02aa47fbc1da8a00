//! Error handling.

use failure_derive::Fail;
use t511_util::impl_from_for_error;
use serde_json::Error as JsonError;

pub type Result<T> = ::std::result::Result<T, ParseError>;

/// Reasons a payload yielded no arrivals.
#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "no JSON object in payload")]
    NoJsonObject,
    #[fail(display = "payload truncated after {} bytes", _0)]
    Truncated(usize),
    #[fail(display = "JSON error: {}", _0)]
    Json(#[cause] JsonError),
    #[fail(display = "missing {}", _0)]
    Missing(&'static str),
    #[fail(display = "invalid timestamp {:?}", _0)]
    Timestamp(String),
}
impl_from_for_error! {
    ParseError,
    JsonError => Json
}
