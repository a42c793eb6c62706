//! canonical event serialization
//!
//! the byte sequence that gets hashed into the event ID. the array form is
//! `[0,<pubkey>,<created_at>,<kind>,<tags>,<content>]` and must be
//! byte-identical across implementations for identical field values.

use crate::{Kind, PubKey, Tags, Timestamp};

/// escape a string for the canonical JSON encoding
///
/// backslash, double quote and the two-character C escapes get their short
/// forms, every other character below U+0020 becomes `\u00xx`, and
/// everything else (including non-ASCII) passes through untouched. this
/// matches what serde_json emits, so canonical output re-parses cleanly.
pub fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\u{08}' => result.push_str("\\b"),
            '\u{09}' => result.push_str("\\t"),
            '\u{0A}' => result.push_str("\\n"),
            '\u{0C}' => result.push_str("\\f"),
            '\u{0D}' => result.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }

    result.push('"');
    result
}

/// serialize the five signed fields of an event for ID computation
///
/// pure: element order and tag order are preserved exactly as given.
pub fn serialize_event(
    pubkey: &PubKey,
    created_at: Timestamp,
    kind: Kind,
    tags: &Tags,
    content: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(content.len() + 128);

    out.push_str("[0,");
    out.push_str(&escape_string(&pubkey.to_hex()));
    out.push(',');
    out.push_str(&created_at.0.to_string());
    out.push(',');
    out.push_str(&kind.0.to_string());
    out.push(',');

    out.push('[');
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        for (j, item) in tag.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push_str(&escape_string(item));
        }
        out.push(']');
    }
    out.push(']');

    out.push(',');
    out.push_str(&escape_string(content));
    out.push(']');

    out.into_bytes()
}
