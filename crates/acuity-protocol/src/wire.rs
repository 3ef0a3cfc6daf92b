//! Wire format: UTF-8 text, one message per newline-terminated line.
//!
//! Outbound:
//!   `Answer <n>\n`
//!
//! Inbound:
//!   `true` / `false` (any case)    answer feedback
//!   `end <payload>` (any case)     session over, payload is the result
//!   any line containing `from`     informational, ignored
//!
//! `\r\n` and `\n` terminators are both accepted.

use acuity_types::{InboundMessage, OutboundMessage};
use tracing::trace;

use crate::error::ProtocolError;

/// Default maximum inbound line length (4 KiB). Longer lines are discarded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4 * 1024;

/// Lines containing this token are informational and never surfaced.
pub const IGNORE_MARKER: &str = "from";

/// Keyword that starts a termination line.
pub const END_KEYWORD: &str = "end";

/// Encode an outbound message as a complete wire line, terminator included.
pub fn encode_message(msg: &OutboundMessage) -> String {
    match msg {
        OutboundMessage::SubmitAnswer(n) => format!("Answer {n}\n"),
    }
}

/// Decode one received line.
///
/// Returns `Ok(None)` for blank and informational lines, and
/// [`ProtocolError::Malformed`] for anything that is neither a boolean nor a
/// termination line.
pub fn decode_line(line: &str) -> Result<Option<InboundMessage>, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.trim().is_empty() || line.contains(IGNORE_MARKER) {
        trace!(line, "ignoring informational line");
        return Ok(None);
    }

    let body = line.trim();
    if starts_with_ignore_case(body, END_KEYWORD) {
        return body
            .split_whitespace()
            .nth(1)
            .map(|payload| Some(InboundMessage::SessionEnded(payload.to_string())))
            .ok_or_else(|| ProtocolError::Malformed(line.to_string()));
    }

    if body.eq_ignore_ascii_case("true") {
        Ok(Some(InboundMessage::AnswerFeedback(true)))
    } else if body.eq_ignore_ascii_case("false") {
        Ok(Some(InboundMessage::AnswerFeedback(false)))
    } else {
        Err(ProtocolError::Malformed(line.to_string()))
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
