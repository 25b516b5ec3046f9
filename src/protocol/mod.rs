//! Wire formats of the provider's APIs.
//!
//! * [`player`] - Web API player endpoints: playback state, devices and
//!   commands
//!
//! Types here mirror the JSON exactly. Conversions into the domain types of
//! [`crate::state`] live next to them.

pub mod player;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Parses and logs a JSON response.
///
/// Successful parses are logged at TRACE level. On failure the raw body is
/// logged too: pretty-printed if it is valid JSON of another shape, verbatim
/// otherwise.
///
/// # Errors
///
/// Returns an error if `body` is not valid JSON or does not match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                error!("{origin}: unexpected response ({e})");
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
