//! Convert Anthropic messages into Azure chat messages.
//!
//! A single Anthropic message expands into zero, one, or several chat messages:
//! - plain string content is copied as-is,
//! - an assistant turn with `tool_use` blocks becomes one message with `tool_calls`,
//! - a user turn with `tool_result` blocks becomes one `tool` message per result,
//! - otherwise the text blocks are joined with spaces.
//!
//! Roles other than user/assistant, and block lists that match none of the
//! rules above, produce nothing.

use serde_json::Value;

use super::anthropic_types::{ContentBlock, Message, MessageContent, Role, ToolResultContent};
use super::openai_types::ChatMessage;
use super::tools::{call_to_destination, id_to_destination};

/// Translate a whole conversation, with the system prompt (if any) leading.
pub fn convert_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<ChatMessage> {
    let mut converted = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        converted.push(ChatMessage::text("system", system));
    }

    for msg in messages {
        converted.extend(convert_message(msg));
    }

    converted
}

fn convert_message(msg: &Message) -> Vec<ChatMessage> {
    if let Role::Other(role) = &msg.role {
        tracing::debug!(role = %role, "dropping message with unsupported role");
        return Vec::new();
    }

    match &msg.content {
        MessageContent::Text(text) => vec![ChatMessage::text(msg.role.as_str(), text.clone())],
        MessageContent::Blocks(blocks) => convert_blocks(&msg.role, blocks),
    }
}

/// Blocks of one message, grouped by kind with their relative order kept.
#[derive(Default)]
struct BlockGroups<'a> {
    texts: Vec<&'a str>,
    tool_uses: Vec<(&'a str, &'a str, &'a Value)>,
    tool_results: Vec<(&'a str, &'a ToolResultContent)>,
}

impl<'a> BlockGroups<'a> {
    fn partition(blocks: &'a [ContentBlock]) -> Self {
        let mut groups = Self::default();
        for block in blocks {
            match block {
                ContentBlock::Text { text } => groups.texts.push(text.as_str()),
                ContentBlock::ToolUse { id, name, input } => {
                    groups.tool_uses.push((id.as_str(), name.as_str(), input));
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => groups.tool_results.push((tool_use_id.as_str(), content)),
                ContentBlock::Unsupported => {}
            }
        }
        groups
    }

    fn joined_text(&self) -> Option<String> {
        if self.texts.is_empty() {
            None
        } else {
            Some(self.texts.join(" "))
        }
    }
}

fn convert_blocks(role: &Role, blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let groups = BlockGroups::partition(blocks);

    if *role == Role::Assistant && !groups.tool_uses.is_empty() {
        let tool_calls = groups
            .tool_uses
            .iter()
            .map(|&(id, name, input)| call_to_destination(id, name, input))
            .collect();

        return vec![ChatMessage {
            role: "assistant".to_string(),
            content: groups.joined_text(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }];
    }

    if *role == Role::User && !groups.tool_results.is_empty() {
        return groups
            .tool_results
            .iter()
            .map(|&(tool_use_id, content)| ChatMessage {
                role: "tool".to_string(),
                content: Some(content.to_wire_string()),
                tool_calls: None,
                tool_call_id: Some(id_to_destination(tool_use_id)),
            })
            .collect();
    }

    match groups.joined_text() {
        Some(text) => vec![ChatMessage::text(role.as_str(), text)],
        None => Vec::new(),
    }
}
