//! Frame-size aware chunker.
//!
//! Rules:
//! - A message whose single-frame encoding fits is never chunked.
//! - Only chat text is split; command/event payloads must fit one frame.
//! - Cuts land on `char` boundaries and account for JSON escaping, so every
//!   produced envelope encodes to at most `max_frame_bytes`.

use crate::error::{AvatarError, Result};
use crate::protocol::envelope::{encoded_len, Body, ChatPayload, Envelope};

/// Bytes `c` occupies inside a JSON string literal as written by `serde_json`.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\u{08}' | '\u{0C}' | '\n' | '\r' | '\t' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Longest prefix of `text` whose escaped size fits `budget`; returns its byte length.
fn fitting_prefix(text: &str, budget: usize) -> usize {
    let mut used = 0;
    for (pos, c) in text.char_indices() {
        let w = escaped_len(c);
        if used + w > budget {
            return pos;
        }
        used += w;
    }
    text.len()
}

/// Split `body` into envelopes no larger than `max_frame_bytes`.
pub fn split(message_id: &str, body: &Body, max_frame_bytes: usize) -> Result<Vec<Envelope>> {
    let single = Envelope::single(message_id, body.clone());
    let size = encoded_len(&single)?;
    if size <= max_frame_bytes {
        return Ok(vec![single]);
    }

    let chat = match body {
        Body::Chat(chat) => chat,
        other => {
            return Err(AvatarError::PayloadTooLarge {
                kind: other.kind().as_str(),
                size,
                max: max_frame_bytes,
            })
        }
    };

    let mut frames = Vec::new();
    let mut rest = chat.text.as_str();
    let mut index: u32 = 0;

    while !rest.is_empty() {
        // Overhead with `"fin":false`, one byte wider than the final frame's `true`.
        let empty = Envelope::chunk(message_id, index, false, chat_body(String::new(), &chat.from));
        let overhead = encoded_len(&empty)?;
        let budget = max_frame_bytes.saturating_sub(overhead);
        if budget == 0 {
            return Err(AvatarError::Configuration(format!(
                "max_frame_bytes {max_frame_bytes} leaves no room for chat text (overhead {overhead})"
            )));
        }

        let cut = fitting_prefix(rest, budget);
        if cut == 0 {
            return Err(AvatarError::Encoding(format!(
                "character at chunk {index} does not fit a {max_frame_bytes} byte frame"
            )));
        }

        let (head, tail) = rest.split_at(cut);
        frames.push(Envelope::chunk(message_id, index, false, chat_body(head.to_owned(), &chat.from)));
        rest = tail;
        index = index
            .checked_add(1)
            .ok_or_else(|| AvatarError::Encoding("chunk index overflow".into()))?;
    }

    match frames.last_mut().and_then(|f| f.chunk.as_mut()) {
        Some(mark) => mark.is_final = true,
        // Oversized even with empty text (e.g. a huge speaker tag).
        None => {
            return Err(AvatarError::PayloadTooLarge {
                kind: body.kind().as_str(),
                size,
                max: max_frame_bytes,
            })
        }
    }

    if frames.len() < 2 {
        // Single frame would have fitted; only reachable through escaping drift.
        return Err(AvatarError::Internal(format!(
            "chunking {message_id} produced a single oversized frame"
        )));
    }

    tracing::trace!(mid = %message_id, chunks = frames.len(), bytes = size, "chat payload chunked");
    Ok(frames)
}

fn chat_body(text: String, from: &str) -> Body {
    Body::Chat(ChatPayload {
        text,
        from: from.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn escaped_len_matches_serde_json() {
        for c in ['a', '"', '\\', '\n', '\u{01}', '\u{7f}', 'é', '語', '🦀'] {
            let encoded = serde_json::to_string(&c.to_string()).unwrap();
            assert_eq!(escaped_len(c), encoded.len() - 2, "char {c:?}");
        }
    }

    #[test]
    fn fitting_prefix_never_splits_a_char() {
        let s = "ab語c";
        assert_eq!(fitting_prefix(s, 2), 2);
        assert_eq!(fitting_prefix(s, 4), 2);
        assert_eq!(fitting_prefix(s, 5), 5);
        assert_eq!(fitting_prefix(s, 100), s.len());
    }
}
