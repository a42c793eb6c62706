use crate::{Event, ID};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("invalid label")]
    InvalidLabel,
    #[error("invalid {0} envelope")]
    InvalidEnvelope(String),
    #[error("unknown envelope label: {0}")]
    UnknownLabel(String),
    #[error("JSON parsing error")]
    Json(#[from] serde_json::Error),
    #[error("ID parsing error")]
    IdParsing(#[from] crate::types::IDError),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// messages a relay can send us, parsed from their JSON array form
#[derive(Debug, Clone)]
pub enum Envelope {
    /// `["EVENT", <subscription id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// `["NOTICE", <message>]`
    Notice(String),
    /// `["EOSE", <subscription id>]`
    Eose { subscription_id: String },
    /// `["OK", <event id>, <accepted>, <message>]`
    Ok {
        event_id: ID,
        accepted: bool,
        message: String,
    },
}

impl Envelope {
    /// get the label for this envelope type
    pub fn label(&self) -> &'static str {
        match self {
            Envelope::Event { .. } => "EVENT",
            Envelope::Notice(_) => "NOTICE",
            Envelope::Eose { .. } => "EOSE",
            Envelope::Ok { .. } => "OK",
        }
    }
}

/// parse a relay message into an envelope
///
/// labels are matched case-insensitively. an unrecognized label is an
/// `UnknownLabel` error so callers can drop it without treating it as a
/// malformed frame.
pub fn parse_message(message: &str) -> Result<Envelope> {
    let arr: Vec<Value> = serde_json::from_str(message)?;
    if arr.is_empty() {
        return Err(EnvelopeError::EmptyMessage);
    }

    let label = arr[0].as_str().ok_or(EnvelopeError::InvalidLabel)?;

    match label.to_ascii_uppercase().as_str() {
        "EVENT" => {
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("EVENT".to_string()));
            }
            Ok(Envelope::Event {
                subscription_id: arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("EVENT".to_string()))?
                    .to_string(),
                event: serde_json::from_value(arr[2].clone())?,
            })
        }
        "NOTICE" => {
            if arr.len() < 2 {
                return Err(EnvelopeError::InvalidEnvelope("NOTICE".to_string()));
            }
            Ok(Envelope::Notice(
                arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("NOTICE".to_string()))?
                    .to_string(),
            ))
        }
        "EOSE" => {
            if arr.len() < 2 {
                return Err(EnvelopeError::InvalidEnvelope("EOSE".to_string()));
            }
            Ok(Envelope::Eose {
                subscription_id: arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("EOSE".to_string()))?
                    .to_string(),
            })
        }
        "OK" => {
            // some relays omit the trailing message, tolerate 3 elements
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("OK".to_string()));
            }
            Ok(Envelope::Ok {
                event_id: ID::from_hex(
                    arr[1]
                        .as_str()
                        .ok_or(EnvelopeError::InvalidEnvelope("OK".to_string()))?,
                )?,
                accepted: arr[2]
                    .as_bool()
                    .ok_or(EnvelopeError::InvalidEnvelope("OK".to_string()))?,
                message: arr
                    .get(3)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        _ => Err(EnvelopeError::UnknownLabel(label.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventTemplate, Kind, SecretKey, Tags, Timestamp};

    fn event_json() -> (String, ID) {
        let sk = SecretKey::generate();
        let event = EventTemplate {
            created_at: Timestamp(1700000000),
            kind: Kind(1),
            tags: Tags::default(),
            content: "hello".to_string(),
        }
        .finalize(&sk);
        let id = event.id;
        (serde_json::to_string(&event).unwrap(), id)
    }

    #[test]
    fn test_parse_event() {
        let (json, id) = event_json();
        let message = format!(r#"["EVENT","sub1",{}]"#, json);

        match parse_message(&message).unwrap() {
            Envelope::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(event.id, id);
            }
            other => panic!("wrong envelope: {}", other.label()),
        }
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        let message = r#"["notice","slow down"]"#;
        match parse_message(message).unwrap() {
            Envelope::Notice(text) => assert_eq!(text, "slow down"),
            other => panic!("wrong envelope: {}", other.label()),
        }
    }

    #[test]
    fn test_parse_eose() {
        match parse_message(r#"["EOSE","sub1"]"#).unwrap() {
            Envelope::Eose { subscription_id } => assert_eq!(subscription_id, "sub1"),
            other => panic!("wrong envelope: {}", other.label()),
        }
    }

    #[test]
    fn test_parse_ok_with_and_without_message() {
        let id_hex = "5c83da77af1dec6d7289834998ad7aafbd9e2191396d75ec3cc27f5a77226f36";

        let full = format!(r#"["OK","{}",true,"duplicate:"]"#, id_hex);
        match parse_message(&full).unwrap() {
            Envelope::Ok {
                event_id,
                accepted,
                message,
            } => {
                assert_eq!(event_id.to_hex(), id_hex);
                assert!(accepted);
                assert_eq!(message, "duplicate:");
            }
            other => panic!("wrong envelope: {}", other.label()),
        }

        let short = format!(r#"["OK","{}",false]"#, id_hex);
        match parse_message(&short).unwrap() {
            Envelope::Ok {
                accepted, message, ..
            } => {
                assert!(!accepted);
                assert_eq!(message, "");
            }
            other => panic!("wrong envelope: {}", other.label()),
        }
    }

    #[test]
    fn test_unknown_label() {
        assert!(matches!(
            parse_message(r#"["AUTH","challenge-string"]"#),
            Err(EnvelopeError::UnknownLabel(label)) if label == "AUTH"
        ));
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(
            parse_message("[]"),
            Err(EnvelopeError::EmptyMessage)
        ));
        assert!(matches!(
            parse_message("[1,2,3]"),
            Err(EnvelopeError::InvalidLabel)
        ));
        assert!(matches!(
            parse_message(r#"["EVENT","sub-only"]"#),
            Err(EnvelopeError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            parse_message("this is not json"),
            Err(EnvelopeError::Json(_))
        ));
        // event object that is not a valid event
        assert!(parse_message(r#"["EVENT","sub1",{"id":"tooshort"}]"#).is_err());
    }
}
