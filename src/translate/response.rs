use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use super::openai_types::ChatCompletionResponse;
use super::tools::call_to_source;
use crate::error::{ProxyError, Result};

/// Translate a complete Azure chat completion into an Anthropic Messages response.
///
/// Only the first choice is read. A response with no choices is a shape
/// violation and fails the translation.
pub fn convert_response(resp: &ChatCompletionResponse) -> Result<MessagesResponse> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| ProxyError::translation("Azure response contained no choices"))?;

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(text) = choice.message.content.as_deref().filter(|t| !t.is_empty()) {
        content.push(ResponseContentBlock::Text {
            text: text.to_string(),
        });
    }

    if let Some(ref tool_calls) = choice.message.tool_calls {
        content.extend(tool_calls.iter().map(call_to_source));
    }

    let stop_reason = map_finish_reason(choice.finish_reason.as_deref());

    Ok(MessagesResponse {
        id: format!("msg_{}", resp.id),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage: Usage {
            input_tokens: resp.usage.prompt_tokens,
            output_tokens: resp.usage.completion_tokens,
        },
    })
}

/// Map an Azure `finish_reason` to an Anthropic `stop_reason`.
/// A missing reason counts as `stop`; anything unrecognised ends the turn.
pub fn map_finish_reason(reason: Option<&str>) -> &'static str {
    match reason.unwrap_or("stop") {
        "stop" => "end_turn",
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        "content_filter" => "stop_sequence",
        _ => "end_turn",
    }
}
