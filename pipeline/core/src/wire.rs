//! Wire Format
//!
//! Server-pushed events arrive as newline-delimited fields grouped into
//! blocks, one event per block, separated by a blank line.
//!
//! ```text
//! event: step_started
//! id: 42
//! data: {"event_type":"step_started","message":"doing work",
//! data:  "data":{"agent_name":"JAX"}}
//!
//! data: ping
//!
//! ```
//!
//! - `data:` lines are joined with `\n` to form the JSON payload
//! - `event:` overrides the payload's `event_type`
//! - `id:` sets the event id
//! - comment lines (`:`) and any other field (`retry:`) are ignored
//!
//! [`FrameDecoder`] buffers raw bytes and yields complete [`RawFrame`]s;
//! [`decode_frame`] turns one frame into an [`Event`], a heartbeat, or
//! nothing. A malformed frame is a [`DecodeError`] for that frame only.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::events::{parse_timestamp, Event, EventData, EventType};

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Type assigned when neither the `event:` field nor the payload names one
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Payload text that marks a keep-alive frame
pub const PING_PAYLOAD: &str = "ping";

/// One blank-line-delimited block, fields collected but not yet interpreted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Value of the last `event:` line
    pub event: Option<String>,
    /// Value of the last `id:` line
    pub id: Option<String>,
    /// Values of all `data:` lines, in order
    pub data: Vec<String>,
}

impl RawFrame {
    /// The payload text (`data:` lines joined by newline)
    #[must_use]
    pub fn payload(&self) -> String {
        self.data.join("\n")
    }

    /// Whether no field of interest was seen
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.data.is_empty()
    }

    /// Whether this frame is a keep-alive
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        if self.event.as_deref().map(str::trim) == Some("heartbeat") {
            return true;
        }
        !self.data.is_empty() && self.payload().trim() == PING_PAYLOAD
    }

    /// Apply one field line to the frame
    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Incremental decoder from stream bytes to [`RawFrame`]s
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Fields collected for the block in progress
    pending: RawFrame,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            pending: RawFrame::default(),
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed as complete lines
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to take the next complete frame
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        while let Some(offset) = self.buffer[self.read_pos..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let line_end = self.read_pos + offset;
            let mut line = &self.buffer[self.read_pos..line_end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            self.read_pos = line_end + 1;

            if line.is_empty() {
                if self.pending.is_empty() {
                    continue;
                }
                return Some(std::mem::take(&mut self.pending));
            }

            self.pending.apply_line(&line);
        }

        None
    }

    /// Flush a trailing block at end of stream
    ///
    /// Consumes any unterminated final line and returns the block in
    /// progress, if it carried any field.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if self.available() > 0 {
            let rest = String::from_utf8_lossy(&self.buffer[self.read_pos..]).into_owned();
            let rest = rest.trim_end_matches('\r');
            if !rest.is_empty() {
                self.pending.apply_line(rest);
            }
            self.read_pos = self.buffer.len();
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Result of decoding one frame
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A real event
    Event(Event),
    /// Keep-alive; never reaches a sink
    Heartbeat,
    /// A block without payload (e.g. only `retry:`), nothing to do
    Skip,
}

/// JSON payload schema
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePayload {
    id: Option<Value>,
    execution_id: Option<String>,
    event_type: Option<String>,
    step_id: Option<String>,
    message: Option<String>,
    data: Option<Value>,
    timestamp: Option<String>,
}

/// Interpret a raw frame
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is not valid JSON or its
/// timestamp matches none of the tolerated formats.
pub fn decode_frame(frame: &RawFrame) -> Result<Decoded, DecodeError> {
    if frame.is_heartbeat() {
        return Ok(Decoded::Heartbeat);
    }
    if frame.data.is_empty() {
        return Ok(Decoded::Skip);
    }

    let payload: WirePayload = serde_json::from_str(&frame.payload())?;

    let type_name = frame
        .event
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| payload.event_type.as_deref().map(str::trim))
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_EVENT_TYPE);
    let event_type = EventType::parse(type_name);
    if event_type == EventType::Heartbeat {
        return Ok(Decoded::Heartbeat);
    }

    let timestamp = match payload.timestamp.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_timestamp(raw)?,
        _ => Utc::now(),
    };

    let id = frame
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| payload.id.as_ref().and_then(id_text));

    let data = match payload.data {
        Some(Value::Object(map)) => EventData::new(map),
        Some(Value::Null) | None => EventData::default(),
        Some(other) => {
            tracing::debug!(data = %other, "ignoring non-object event data");
            EventData::new(Map::new())
        }
    };

    Ok(Decoded::Event(Event {
        id,
        execution_id: payload.execution_id.unwrap_or_default(),
        event_type,
        step_id: payload.step_id.filter(|s| !s.is_empty()),
        message: payload.message.unwrap_or_default(),
        data,
        timestamp,
    }))
}

/// Payload ids may be strings or numbers
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn frames(input: &str) -> Vec<RawFrame> {
        let mut decoder = FrameDecoder::new();
        decoder.push(input.as_bytes());
        let mut out = Vec::new();
        while let Some(frame) = decoder.next_frame() {
            out.push(frame);
        }
        out
    }

    fn decode_one(input: &str) -> Decoded {
        let frame = frames(input).pop().unwrap();
        decode_frame(&frame).unwrap()
    }

    #[test]
    fn test_step_started_block() {
        let decoded = decode_one(
            "event: step_started\n\
             data: {\"event_type\":\"step_started\",\"message\":\"doing work\",\"data\":{\"agent_name\":\"JAX\"}}\n\n",
        );

        let Decoded::Event(event) = decoded else {
            panic!("expected an event, got {decoded:?}");
        };
        assert_eq!(event.event_type, EventType::StepStarted);
        assert_eq!(event.message, "doing work");
        assert_eq!(event.data.str("agent_name"), Some("JAX"));
    }

    #[test]
    fn test_block_fields_carry_into_event() {
        let decoded = decode_one(concat!(
            "id: evt-7\n",
            "data: {\"execution_id\":\"exec-1\",\"event_type\":\"tool_call_started\",",
            "\"step_id\":\"s1\",\"message\":\"calling\",\"data\":{\"tool_name\":\"search\"},",
            "\"timestamp\":\"2024-01-02T03:04:05Z\"}\n",
            "\n"
        ));

        let Decoded::Event(event) = decoded else {
            panic!("expected an event");
        };
        assert_eq!(event.id.as_deref(), Some("evt-7"));
        assert_eq!(event.execution_id, "exec-1");
        assert_eq!(event.event_type, EventType::ToolCallStarted);
        assert_eq!(event.step_id.as_deref(), Some("s1"));
        assert_eq!(event.message, "calling");
        assert_eq!(event.data.str("tool_name"), Some("search"));
        assert_eq!(event.timestamp.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_event_field_overrides_payload_type() {
        let decoded = decode_one(
            "event: step_completed\ndata: {\"event_type\":\"step_started\"}\n\n",
        );
        let Decoded::Event(event) = decoded else {
            panic!("expected an event");
        };
        assert_eq!(event.event_type, EventType::StepCompleted);
    }

    #[test]
    fn test_payload_id_used_without_id_field() {
        let decoded = decode_one("data: {\"id\": 12, \"event_type\":\"step_started\"}\n\n");
        let Decoded::Event(event) = decoded else {
            panic!("expected an event");
        };
        assert_eq!(event.id.as_deref(), Some("12"));
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let input = "data: {\"event_type\":\"llm_response\",\ndata: \"message\":\"hi\"}\n\n";
        let frame = frames(input).pop().unwrap();
        assert_eq!(frame.data.len(), 2);
        assert_eq!(
            frame.payload(),
            "{\"event_type\":\"llm_response\",\n\"message\":\"hi\"}"
        );
        assert!(matches!(decode_frame(&frame), Ok(Decoded::Event(_))));
    }

    #[test]
    fn test_ping_is_heartbeat() {
        assert_eq!(decode_one("data: ping\n\n"), Decoded::Heartbeat);
        assert_eq!(decode_one("data:  ping \n\n"), Decoded::Heartbeat);
    }

    #[test]
    fn test_heartbeat_type_is_heartbeat() {
        assert_eq!(
            decode_one("data: {\"event_type\":\"heartbeat\"}\n\n"),
            Decoded::Heartbeat
        );
        assert_eq!(decode_one("event: heartbeat\ndata: {}\n\n"), Decoded::Heartbeat);
    }

    #[test]
    fn test_retry_only_block_is_skipped() {
        assert_eq!(decode_one("retry: 3000\nid: 5\n\n"), Decoded::Skip);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let all = frames(": keep-alive comment\n\nretry: 10\nfoo: bar\ndata: {}\n\n");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].data, vec!["{}".to_string()]);
    }

    #[test]
    fn test_missing_type_defaults_to_message() {
        let Decoded::Event(event) = decode_one("data: {\"message\":\"hello\"}\n\n") else {
            panic!("expected an event");
        };
        assert_eq!(event.event_type, EventType::Other(DEFAULT_EVENT_TYPE.to_string()));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let frame = frames("data: {not json\n\n").pop().unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let frame = frames("data: {\"event_type\":\"step_started\",\"timestamp\":\"noon\"}\n\n")
            .pop()
            .unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_naive_fractional_timestamp_accepted() {
        let Decoded::Event(event) = decode_one(
            "data: {\"event_type\":\"step_started\",\"timestamp\":\"2024-01-02T03:04:05.123456\"}\n\n",
        ) else {
            panic!("expected an event");
        };
        assert_eq!(
            event.timestamp.to_rfc3339(),
            "2024-01-02T03:04:05.123456+00:00"
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let all = frames("event: step_started\r\ndata: {}\r\n\r\n");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].event.as_deref(), Some("step_started"));
    }

    #[test]
    fn test_partial_chunks_wait_for_blank_line() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"message\":");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"\"x\"}\n");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"\n");
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.payload(), "{\"message\":\"x\"}");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "data: {\"message\":\"héllo\"}\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..split]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&bytes[split..]);

        let Decoded::Event(event) = decode_frame(&decoder.next_frame().unwrap()).unwrap() else {
            panic!("expected an event");
        };
        assert_eq!(event.message, "héllo");
    }

    #[test]
    fn test_finish_flushes_unterminated_block() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"event: execution_completed\ndata: {}");
        assert!(decoder.next_frame().is_none());

        let frame = decoder.finish().unwrap();
        assert_eq!(frame.event.as_deref(), Some("execution_completed"));
        assert_eq!(frame.data, vec!["{}".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_non_object_data_is_ignored() {
        let Decoded::Event(event) =
            decode_one("data: {\"event_type\":\"step_started\",\"data\":\"oops\"}\n\n")
        else {
            panic!("expected an event");
        };
        assert!(event.data.is_empty());
    }

    proptest! {
        #[test]
        fn test_well_formed_block_decodes_to_its_fields(
            id in "[A-Za-z0-9_-]{1,16}",
            event_type in prop::sample::select(vec![
                "execution_started",
                "execution_completed",
                "execution_failed",
                "step_started",
                "step_completed",
                "llm_response",
                "tool_call_started",
                "tool_call_completed",
                "custom_progress",
            ]),
            message in any::<String>(),
            step_id in proptest::option::of("[a-z0-9-]{1,12}"),
            chunk_len in 1usize..48,
        ) {
            let payload = json!({
                "event_type": event_type,
                "message": message,
                "step_id": step_id,
            });
            let block = format!("id: {id}\ndata: {payload}\n\n");

            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in block.as_bytes().chunks(chunk_len) {
                decoder.push(chunk);
                while let Some(frame) = decoder.next_frame() {
                    frames.push(frame);
                }
            }
            prop_assert!(decoder.finish().is_none());
            prop_assert_eq!(frames.len(), 1);

            let event = match decode_frame(&frames[0]) {
                Ok(Decoded::Event(event)) => event,
                other => {
                    return Err(TestCaseError::fail(format!("expected an event, got {other:?}")));
                }
            };
            prop_assert_eq!(event.id.as_deref(), Some(id.as_str()));
            prop_assert_eq!(event.event_type.as_str(), event_type);
            prop_assert_eq!(&event.message, &message);
            prop_assert_eq!(event.step_id, step_id);
        }
    }
}
