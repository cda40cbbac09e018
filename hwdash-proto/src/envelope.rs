use serde::Deserialize;

use crate::HardwareSnapshot;

/// Outer JSON envelope returned by the REST store.
///
/// Two command variants exist in the wild: `GET` wraps the payload in a
/// single string, `XREVRANGE ... COUNT 1` wraps it in a list of stream
/// entries. The shape is detected at parse time. `result: null` (key never
/// written) and a missing `result` key both mean "nothing published yet".
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    result: Option<ResultField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultField {
    Single(String),
    Range(Vec<RangeEntry>),
}

/// One stream entry: `[entry-id, [field, value, ...]]`.
#[derive(Debug, Deserialize)]
struct RangeEntry(String, Vec<String>);

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized response envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed snapshot payload: {0}")]
    Payload(#[source] serde_json::Error),
}

impl Envelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(body).map_err(DecodeError::Envelope)
    }

    /// Inner JSON string carried by either envelope shape, if any.
    ///
    /// For the range shape only the newest entry counts, and the value sits
    /// right after the field name.
    fn payload(&self) -> Option<&str> {
        match self.result.as_ref()? {
            ResultField::Single(raw) => Some(raw),
            ResultField::Range(entries) => {
                let RangeEntry(_, fields) = entries.first()?;
                fields.get(1).map(String::as_str)
            }
        }
    }

    /// Decode the carried payload into a snapshot.
    ///
    /// `Ok(None)` means the store legitimately holds no value yet.
    pub fn into_snapshot(self) -> Result<Option<HardwareSnapshot>, DecodeError> {
        let Some(raw) = self.payload() else {
            return Ok(None);
        };

        let snapshot = serde_json::from_str(raw).map_err(DecodeError::Payload)?;
        Ok(Some(snapshot))
    }
}

/// Decode a raw response body into the latest snapshot, if one exists.
pub fn decode_latest(body: &[u8]) -> Result<Option<HardwareSnapshot>, DecodeError> {
    Envelope::from_slice(body)?.into_snapshot()
}
