//! Tool declarations, tool invocations, and the tool-call ID namespaces.
//!
//! Anthropic tool-use IDs look like `toolu_ABC`, Azure tool-call IDs like
//! `call_ABC`. Crossing the boundary swaps the first occurrence of one prefix
//! for the other, once; IDs without the prefix pass through untouched.

use serde_json::Value;

use super::anthropic_types::{empty_object, ResponseContentBlock, Tool, ToolChoice};
use super::openai_types::{
    ChatFunction, ChatTool, ChatToolCall, ChatToolCallFunction, ChatToolChoice,
    ChatToolChoiceFunction, ChatToolChoiceSpecific,
};

pub const SOURCE_ID_PREFIX: &str = "toolu_";
pub const DESTINATION_ID_PREFIX: &str = "call_";

/// `call_ABC` -> `toolu_ABC`
pub fn id_to_source(id: &str) -> String {
    id.replacen(DESTINATION_ID_PREFIX, SOURCE_ID_PREFIX, 1)
}

/// `toolu_ABC` -> `call_ABC`
pub fn id_to_destination(id: &str) -> String {
    id.replacen(SOURCE_ID_PREFIX, DESTINATION_ID_PREFIX, 1)
}

/// Wrap an Anthropic tool declaration in the function-definition envelope.
pub fn declaration_to_destination(tool: &Tool) -> ChatTool {
    ChatTool {
        tool_type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters: tool.input_schema.clone().unwrap_or_else(empty_object),
        },
    }
}

/// Build the destination tool call for an outbound `tool_use` block.
pub fn call_to_destination(id: &str, name: &str, input: &Value) -> ChatToolCall {
    ChatToolCall {
        id: id_to_destination(id),
        call_type: "function".to_string(),
        function: ChatToolCallFunction {
            name: name.to_string(),
            arguments: serde_json::to_string(input).unwrap_or_default(),
        },
    }
}

/// Turn a tool call returned by the deployment into a `tool_use` block.
pub fn call_to_source(call: &ChatToolCall) -> ResponseContentBlock {
    ResponseContentBlock::ToolUse {
        id: id_to_source(&call.id),
        name: call.function.name.clone(),
        input: ToolArguments::parse(&call.function.arguments).into_input(),
    }
}

/// The `arguments` string of a tool call, after an attempt to parse it.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Structured(Value),
    Raw(String),
}

impl ToolArguments {
    pub fn parse(arguments: &str) -> Self {
        if arguments.is_empty() {
            return ToolArguments::Raw(String::new());
        }
        match serde_json::from_str(arguments) {
            Ok(value) => ToolArguments::Structured(value),
            Err(e) => {
                tracing::debug!(error = %e, "tool call arguments are not valid JSON");
                ToolArguments::Raw(arguments.to_string())
            }
        }
    }

    /// Structured arguments become the block input; anything else becomes `{}`.
    pub fn into_input(self) -> Value {
        match self {
            ToolArguments::Structured(value) => value,
            ToolArguments::Raw(_) => empty_object(),
        }
    }
}

/// Map an explicit Anthropic `tool_choice` onto the Azure vocabulary.
pub fn tool_choice_to_destination(choice: &ToolChoice) -> ChatToolChoice {
    match choice {
        ToolChoice::Auto => ChatToolChoice::String("auto".to_string()),
        ToolChoice::Any => ChatToolChoice::String("required".to_string()),
        ToolChoice::Disabled => ChatToolChoice::String("none".to_string()),
        ToolChoice::Tool { name } => ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}
