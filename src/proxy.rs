//! Transport to the Azure OpenAI deployment.
//!
//! Builds the outbound request, sends it, and hands the reply to the
//! converters: a complete response to [`convert_response`], a streaming body
//! (split into lines) to [`reframe_stream`].

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::truncate;
use crate::models::ModelMapper;
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse};
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::{build_destination_request, convert_response, reframe_stream};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;

/// Outcome of proxying a streaming request: SSE text chunks, ready to write verbatim.
pub type SseStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Build the shared outbound client.
///
/// The configured timeout bounds connecting and each read, not the whole
/// request, so a long generation keeps streaming as long as chunks keep arriving.
pub fn build_client(config: &ProxyConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.timeout())
        .read_timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Forward a non-streaming Anthropic request to Azure and translate the reply.
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    config: &ProxyConfig,
    models: &ModelMapper,
    client: &reqwest::Client,
) -> Result<MessagesResponse> {
    let azure_req = build_destination_request(req, models);
    let response = send(&azure_req, config, client).await?;

    let status = response.status().as_u16();
    let body = response.text().await?;

    if !(200..300).contains(&status) {
        tracing::warn!(status, body = truncate(&body, 500), "Azure API error");
        return Err(ProxyError::upstream(status, body));
    }

    if config.debug {
        tracing::debug!(body = %body, "Azure response");
    }

    let azure_resp: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
        ProxyError::translation(format!(
            "Failed to parse Azure response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    let resp = convert_response(&azure_resp)?;

    tracing::info!(
        id = %resp.id,
        stop_reason = resp.stop_reason.as_deref().unwrap_or_default(),
        input_tokens = resp.usage.input_tokens,
        output_tokens = resp.usage.output_tokens,
        "Completed"
    );

    Ok(resp)
}

/// Forward a streaming Anthropic request, returning the re-framed SSE stream.
///
/// The upstream status is checked before anything is streamed, so a failed
/// call surfaces as an ordinary error instead of a broken event stream.
pub async fn proxy_streaming(
    req: &MessagesRequest,
    config: &ProxyConfig,
    models: &ModelMapper,
    client: &reqwest::Client,
) -> Result<SseStream> {
    let azure_req = build_destination_request(req, models);
    let response = send(&azure_req, config, client).await?;

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status, body = truncate(&body, 500), "Azure API error (streaming)");
        return Err(ProxyError::upstream(status, body));
    }

    let lines = upstream_lines(response.bytes_stream(), config.debug);
    Ok(Box::pin(reframe_stream(lines)))
}

async fn send(
    azure_req: &ChatCompletionRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<reqwest::Response> {
    let url = config.chat_completions_url()?;
    let api_key = config.resolve_api_key()?;

    tracing::info!(
        deployment = %azure_req.model,
        stream = azure_req.stream,
        messages = azure_req.messages.len(),
        "POST chat/completions"
    );
    if config.debug {
        let body = serde_json::to_string(azure_req)?;
        tracing::debug!(url = %url, body = %body, "Azure request");
    }

    let response = client
        .post(&url)
        .header("api-key", api_key)
        .header("Content-Type", "application/json")
        .json(azure_req)
        .send()
        .await?;

    Ok(response)
}

/// Split an upstream byte stream into text lines, without the line terminator.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across network chunks decode correctly. A transport error is yielded once
/// and ends the stream.
pub fn upstream_lines<S, E>(
    byte_stream: S,
    debug: bool,
) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<ProxyError> + Send + 'static,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err::<String, ProxyError>(e.into());
                    break;
                }
            };

            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = decode_line(&raw);
                if debug && !line.trim().is_empty() {
                    tracing::debug!(line = %line, "Azure stream line");
                }
                yield Ok(line);
            }
        }

        if !buffer.is_empty() {
            yield Ok(decode_line(&buffer));
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .to_string()
}
