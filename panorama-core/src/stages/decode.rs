//! Strict decoding of model responses into stage payload types.
//!
//! Models wrap JSON in prose or markdown fences; decoding slices out the
//! outermost JSON object and deserializes it into the target type. Anything
//! that does not decode cleanly fails the stage rather than passing partial
//! data downstream.

use serde::de::DeserializeOwned;

use crate::error::StageError;

/// Slice the outermost JSON object out of a model response.
///
/// `find`/`rfind` return byte offsets, and `{`/`}` are single-byte ASCII,
/// so the offsets are always valid slice boundaries.
fn json_window(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// Decode a model response into `T`, failing the stage on any mismatch.
pub fn decode_response<T: DeserializeOwned>(stage: &str, response: &str) -> Result<T, StageError> {
    let window = json_window(response).ok_or_else(|| StageError::Decode {
        message: format!("no JSON object in {} response", stage),
    })?;
    serde_json::from_str(window).map_err(|e| StageError::Decode {
        message: format!("malformed {} response: {}", stage, e),
    })
}
