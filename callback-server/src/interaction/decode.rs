//! Payload decoding for verified request bodies.
//!
//! Slack posts interactions as `application/x-www-form-urlencoded` with a
//! single `payload` field holding the JSON event.

use serde::Deserialize;
use thiserror::Error;

use super::types::CallbackEvent;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed form body")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("form body has no payload field")]
    MissingPayload,

    #[error("malformed payload json")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct InteractionForm {
    #[serde(default)]
    payload: Option<String>,
}

/// Decode a verified body into a [`CallbackEvent`].
pub fn decode_callback(body: &[u8]) -> Result<CallbackEvent, DecodeError> {
    let form: InteractionForm = serde_urlencoded::from_bytes(body)?;

    let payload = form
        .payload
        .filter(|p| !p.trim().is_empty())
        .ok_or(DecodeError::MissingPayload)?;

    Ok(serde_json::from_str(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionType;

    fn form(payload: &str) -> Vec<u8> {
        serde_urlencoded::to_string(&[("payload", payload)])
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn test_decode_block_actions() {
        let event =
            decode_callback(&form(r#"{"type":"block_actions","trigger_id":"abc"}"#)).unwrap();

        assert_eq!(event.kind, InteractionType::BlockActions);
        assert_eq!(event.trigger_id, "abc");
    }

    #[test]
    fn test_other_form_fields_are_ignored() {
        let body = format!(
            "team=T1&{}",
            String::from_utf8(form(r#"{"type":"shortcut","callback_id":"open"}"#)).unwrap()
        );

        let event = decode_callback(body.as_bytes()).unwrap();
        assert_eq!(event.kind, InteractionType::Shortcut);
        assert_eq!(event.callback_id, "open");
    }

    #[test]
    fn test_missing_payload() {
        assert!(matches!(
            decode_callback(b"team=T1"),
            Err(DecodeError::MissingPayload)
        ));
        assert!(matches!(
            decode_callback(b""),
            Err(DecodeError::MissingPayload)
        ));
        assert!(matches!(
            decode_callback(b"payload="),
            Err(DecodeError::MissingPayload)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            decode_callback(&form(r#"{"type":"block_actions""#)),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_callback(&form(r#"{"trigger_id":"abc"}"#)),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_payload_is_rejected() {
        assert!(matches!(
            decode_callback(b"payload=%7B%7D&payload=%7B%7D"),
            Err(DecodeError::Form(_))
        ));
    }
}
