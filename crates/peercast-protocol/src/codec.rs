//! Codec for encoding and decoding envelopes.
//!
//! Each transport frame carries exactly one JSON-encoded envelope.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, EventType};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An event that requires a payload arrived without one.
    #[error("Missing data for {0} event")]
    MissingData(EventType),

    /// Payload has a JSON type that cannot hold the expected value.
    #[error("Unexpected data type: {0}")]
    UnexpectedData(&'static str),
}

/// Encode an envelope to bytes.
///
/// # Errors
///
/// Returns an error if the envelope is too large or encoding fails.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode an envelope from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or not a valid envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

/// Decode a typed payload from an envelope's `data` value.
///
/// Clients send payloads as a JSON document embedded in a string; a plain
/// JSON object is accepted as well.
///
/// # Errors
///
/// Returns an error if the value is neither form or does not match `T`.
pub fn decode_data<T: DeserializeOwned>(data: &Value) -> Result<T, ProtocolError> {
    match data {
        Value::String(encoded) => Ok(serde_json::from_str(encoded)?),
        Value::Object(_) => Ok(T::deserialize(data)?),
        Value::Null => Err(ProtocolError::UnexpectedData("null")),
        Value::Bool(_) => Err(ProtocolError::UnexpectedData("bool")),
        Value::Number(_) => Err(ProtocolError::UnexpectedData("number")),
        Value::Array(_) => Err(ProtocolError::UnexpectedData("array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Signal;
    use serde_json::json;

    #[test]
    fn test_decode_envelope() {
        let env = decode(br#"{"type":"answer","from":"a","data":"{\"to\":\"b\",\"content\":\"c\"}"}"#)
            .unwrap();
        assert_eq!(env.kind, EventType::Answer);
        assert_eq!(env.from, "a");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"{not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode(b"[1,2,3]"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_frame_too_large() {
        let data = vec![b' '; MAX_FRAME_SIZE + 1];
        match decode(&data) {
            Err(ProtocolError::FrameTooLarge(n)) => assert_eq!(n, MAX_FRAME_SIZE + 1),
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }

        let env = Envelope {
            kind: EventType::ChatMessage,
            from: "a".into(),
            data: Some(Value::String("x".repeat(MAX_FRAME_SIZE))),
        };
        assert!(matches!(encode(&env), Err(ProtocolError::FrameTooLarge(_))));
    }

    #[test]
    fn test_forwarded_envelope_keeps_string_data() {
        let inbound = r#"{"type":"offer","from":"forged","data":"{\"to\":\"b\",\"content\":\"sdp\"}"}"#;
        let mut env = decode(inbound.as_bytes()).unwrap();
        env.from = "a".into();

        let encoded: Value = serde_json::from_slice(&encode(&env).unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "offer",
                "from": "a",
                "data": "{\"to\":\"b\",\"content\":\"sdp\"}"
            })
        );
    }

    #[test]
    fn test_decode_data_rejects_scalars() {
        assert!(matches!(
            decode_data::<Signal>(&json!(42)),
            Err(ProtocolError::UnexpectedData("number"))
        ));
        assert!(matches!(
            decode_data::<Signal>(&json!("{\"to\":1}")),
            Err(ProtocolError::Json(_))
        ));
    }
}
