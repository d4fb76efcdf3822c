//! State machine for re-framing Azure streaming chunks as Anthropic SSE events.
//!
//! The [`Reframer`] consumes raw upstream lines (`data: {...}`, `data: [DONE]`,
//! blanks, comments) one at a time and emits the Anthropic events each line
//! implies. It tracks the message and at most one open content block, always at
//! index 0. Only the name-bearing fragment of a streamed tool call is surfaced;
//! argument fragments are not accumulated.
//!
//! Usage:
//!   let mut reframer = Reframer::new();
//!   for line in upstream_lines {
//!       for event in reframer.push_line(&line) {
//!           // write event.to_sse()?
//!       }
//!       if reframer.is_closed() { break; }
//!   }

use futures::stream::{Stream, StreamExt};

use super::anthropic_types::{
    empty_object, Delta, DeltaUsage, MessageDeltaBody, MessageStartBody, ResponseContentBlock,
    StreamEvent, Usage,
};
use super::openai_types::{ChatCompletionChunk, ChunkChoice};
use super::response::map_finish_reason;
use super::tools::id_to_source;

const BLOCK_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing emitted yet.
    Idle,
    /// `message_start` sent, no content block open.
    MessageOpen,
    /// A content block is open at index 0.
    BlockOpen,
    /// `message_stop` sent; further input is ignored.
    Closed,
}

/// One upstream line, classified.
#[derive(Debug, PartialEq, Eq)]
enum UpstreamLine<'a> {
    Ignored,
    Done,
    Payload(&'a str),
}

fn classify(line: &str) -> UpstreamLine<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return UpstreamLine::Ignored;
    }

    let data = if let Some(stripped) = line.strip_prefix("data: ") {
        stripped.trim()
    } else if let Some(stripped) = line.strip_prefix("data:") {
        stripped.trim()
    } else {
        return UpstreamLine::Ignored;
    };

    if data == "[DONE]" {
        UpstreamLine::Done
    } else {
        UpstreamLine::Payload(data)
    }
}

#[derive(Debug)]
pub struct Reframer {
    state: StreamState,
}

impl Default for Reframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reframer {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Feed one raw upstream line, returning zero or more events.
    pub fn push_line(&mut self, line: &str) -> Vec<StreamEvent> {
        if self.is_closed() {
            return Vec::new();
        }

        match classify(line) {
            UpstreamLine::Ignored => Vec::new(),
            UpstreamLine::Done => self.close(),
            UpstreamLine::Payload(data) => match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(chunk) => self.process_chunk(&chunk),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable stream frame");
                    Vec::new()
                }
            },
        }
    }

    /// Apply one parsed chunk. Chunks without a first choice are skipped.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.is_closed() {
            return Vec::new();
        }

        let Some(choice) = chunk.choices.first() else {
            tracing::debug!("skipping stream frame without choices");
            return Vec::new();
        };

        let mut events = Vec::new();

        if self.state == StreamState::Idle {
            events.push(message_start(chunk));
            self.state = StreamState::MessageOpen;
        }

        self.apply_text(choice, &mut events);
        self.apply_tool_calls(choice, &mut events);

        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.close_block(&mut events);
            events.push(message_delta(map_finish_reason(Some(reason))));
        }

        events
    }

    /// Terminate the message: on `[DONE]`, or when the upstream ends without it.
    pub fn close(&mut self) -> Vec<StreamEvent> {
        if self.is_closed() {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.close_block(&mut events);
        events.push(message_delta("end_turn"));
        events.push(StreamEvent::MessageStop);
        self.state = StreamState::Closed;
        events
    }

    fn apply_text(&mut self, choice: &ChunkChoice, events: &mut Vec<StreamEvent>) {
        let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };

        if self.state == StreamState::MessageOpen {
            events.push(StreamEvent::ContentBlockStart {
                index: BLOCK_INDEX,
                content_block: ResponseContentBlock::Text {
                    text: String::new(),
                },
            });
            self.state = StreamState::BlockOpen;
        }

        events.push(StreamEvent::ContentBlockDelta {
            index: BLOCK_INDEX,
            delta: Delta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    fn apply_tool_calls(&mut self, choice: &ChunkChoice, events: &mut Vec<StreamEvent>) {
        let Some(ref tool_calls) = choice.delta.tool_calls else {
            return;
        };

        for tc in tool_calls {
            let name = tc
                .function
                .as_ref()
                .and_then(|f| f.name.as_deref())
                .filter(|n| !n.is_empty());

            let Some(name) = name else {
                continue;
            };

            if self.state != StreamState::MessageOpen {
                tracing::debug!(tool = name, "content block already open, tool call not surfaced");
                continue;
            }

            events.push(StreamEvent::ContentBlockStart {
                index: BLOCK_INDEX,
                content_block: ResponseContentBlock::ToolUse {
                    id: id_to_source(tc.id.as_deref().unwrap_or_default()),
                    name: name.to_string(),
                    input: empty_object(),
                },
            });
            self.state = StreamState::BlockOpen;
        }
    }

    fn close_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.state == StreamState::BlockOpen {
            events.push(StreamEvent::ContentBlockStop { index: BLOCK_INDEX });
            self.state = StreamState::MessageOpen;
        }
    }
}

fn message_start(chunk: &ChatCompletionChunk) -> StreamEvent {
    let id = chunk
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or("unknown");
    let model = chunk
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or("unknown");

    StreamEvent::MessageStart {
        message: MessageStartBody {
            id: format!("msg_{id}"),
            message_type: "message".to_string(),
            role: "assistant".to_string(),
            content: Vec::new(),
            model: model.to_string(),
            usage: Usage::default(),
        },
    }
}

fn message_delta(stop_reason: &str) -> StreamEvent {
    StreamEvent::MessageDelta {
        delta: MessageDeltaBody {
            stop_reason: stop_reason.to_string(),
        },
        usage: DeltaUsage::default(),
    }
}

/// Re-frame a stream of upstream lines into SSE text chunks, each one a
/// complete `event:`/`data:` unit ready to be written verbatim.
///
/// If the upstream ends or fails before `[DONE]`, the message is closed as if
/// `[DONE]` had arrived.
pub fn reframe_stream<S, E>(lines: S) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = std::result::Result<String, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut reframer = Reframer::new();

        tokio::pin!(lines);

        while let Some(next) = lines.next().await {
            let line = match next {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "upstream stream failed");
                    break;
                }
            };

            for event in reframer.push_line(&line) {
                match event.to_sse() {
                    Ok(frame) => { yield frame; }
                    Err(e) => tracing::warn!(error = %e, "failed to encode stream event"),
                }
            }

            if reframer.is_closed() {
                break;
            }
        }

        if !reframer.is_closed() {
            tracing::warn!(state = ?reframer.state(), "upstream stream ended without [DONE], closing message");
            for event in reframer.close() {
                match event.to_sse() {
                    Ok(frame) => { yield frame; }
                    Err(e) => tracing::warn!(error = %e, "failed to encode stream event"),
                }
            }
        }

        tracing::info!("stream completed");
    }
}
