//! The message envelope carried through the exchange.
//!
//! On the wire an envelope is a JSON object with exactly two string fields:
//!
//! ```json
//! {"name": "log", "data": "user logged in"}
//! ```
//!
//! `data` is opaque. Producers frequently put a further JSON-encoded string in
//! it; the relay never looks inside.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};

/// Logical event name plus an opaque payload string.
///
/// Envelopes are immutable once built: every publish constructs a fresh one.
///
/// # Example
///
/// ```
/// use event_relay_core::envelope::Envelope;
///
/// let envelope = Envelope::new("log", "user logged in");
/// let bytes = envelope.to_json_bytes().unwrap();
/// assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical event name, used for dispatch routing
    #[serde(default)]
    name: String,
    /// Opaque payload
    #[serde(default)]
    data: String,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The logical event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque payload.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, RelayError> {
        serde_json::to_vec(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Strictly decode an envelope from a message body.
    ///
    /// Missing fields decode as empty strings and unknown fields are ignored;
    /// anything that is not a JSON object with string fields is an error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Deserialization`] if the body is not a valid envelope.
    pub fn decode(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body).map_err(|e| RelayError::Deserialization(e.to_string()))
    }

    /// Decode an envelope, substituting the empty envelope for malformed bodies.
    ///
    /// The decode error, if any, is handed back so callers can record it.
    #[must_use]
    pub fn decode_lenient(body: &[u8]) -> (Self, Option<RelayError>) {
        match Self::decode(body) {
            Ok(envelope) => (envelope, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_has_two_string_fields() {
        let bytes = Envelope::new("log", "user logged in").to_json_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "name": "log", "data": "user logged in" })
        );
    }

    #[test]
    fn double_encoded_payload_is_opaque() {
        let inner = r#"{"name":"log","data":"x"}"#;
        let envelope = Envelope::new("log", inner);
        let decoded = Envelope::decode(&envelope.to_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded.data(), inner);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let decoded = Envelope::decode(br#"{"name":"auth","extra":1}"#).unwrap();
        assert_eq!(decoded.name(), "auth");
        assert_eq!(decoded.data(), "");
    }

    #[test]
    fn lenient_decode_substitutes_default() {
        let (envelope, error) = Envelope::decode_lenient(b"not json at all");
        assert_eq!(envelope, Envelope::default());
        assert!(matches!(error, Some(RelayError::Deserialization(_))));
    }

    #[test]
    fn lenient_decode_rejects_non_string_fields() {
        let (envelope, error) = Envelope::decode_lenient(br#"{"name":42,"data":"x"}"#);
        assert_eq!(envelope.name(), "");
        assert!(error.is_some());
    }
}
