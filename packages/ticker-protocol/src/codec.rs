//! JSON frame codec.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame as JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// Returns an error if the text is not a valid frame of type `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientRequest, Operation, ServerMessage};
    use crate::session::SessionId;

    #[test]
    fn decode_welcome() {
        let message: ServerMessage =
            decode(r#" {"type":"welcome","session_id":"s-1"} "#).unwrap();
        assert_eq!(
            message,
            ServerMessage::Welcome {
                session_id: SessionId::new("s-1")
            }
        );
    }

    #[test]
    fn decode_unknown_operation_fails() {
        let result: Result<ClientRequest, _> = decode(r#"{"id":1,"op":"buy_everything"}"#);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn encode_get_quote() {
        let text = encode(&ClientRequest::new(
            2,
            Operation::GetQuote {
                symbol: "IBM".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(text, r#"{"id":2,"op":"get_quote","symbol":"IBM"}"#);
    }
}
