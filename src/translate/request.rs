//! Assemble the outbound Azure Chat Completions request.
//!
//! Pure function: takes the parsed Anthropic request plus the model mapping,
//! returns the request body to POST to the deployment.

use super::anthropic_types::MessagesRequest;
use super::messages::convert_messages;
use super::openai_types::{ChatCompletionRequest, ChatToolChoice};
use super::tools::{declaration_to_destination, tool_choice_to_destination};
use crate::models::ModelMapper;

pub fn build_destination_request(
    req: &MessagesRequest,
    models: &ModelMapper,
) -> ChatCompletionRequest {
    let system = req.system.as_ref().map(|s| s.as_text());
    let messages = convert_messages(&req.messages, system.as_deref());

    let tools: Option<Vec<_>> = req
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(declaration_to_destination).collect());

    // tool_choice only makes sense alongside tools; default to letting the model decide
    let tool_choice = tools.as_ref().map(|_| {
        req.tool_choice
            .as_ref()
            .map_or_else(|| ChatToolChoice::String("auto".to_string()), tool_choice_to_destination)
    });

    let stop = req.stop_sequences.clone().filter(|s| !s.is_empty());

    ChatCompletionRequest {
        model: models.map(&req.model).to_string(),
        messages,
        max_tokens: req.max_tokens,
        stream: req.stream,
        temperature: req.temperature,
        top_p: req.top_p,
        tools,
        tool_choice,
        stop,
    }
}
