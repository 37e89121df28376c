/*
 * @file llm.rs
 * @brief OpenAI-compatible chat client and message types
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Chat-completion client and the message types shared with the orchestrator.
//!
//! The wire format is the OpenAI `/v1/chat/completions` shape, which Ollama,
//! LM Studio, llama.cpp's server and most local runtimes speak.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, trace};

use crate::error::LlmError;

/// One role-tagged turn of a conversation.
///
/// # Details
/// Serializes directly to the OpenAI message shape. Assistant turns either
/// carry text or a list of tool calls; tool turns answer exactly one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Plain-text assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Result of a tool invocation, tied to the call that requested it.
    pub fn tool(call: &ToolCall, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            content: content.into(),
        }
    }

    /// Wire name of the role.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Name and JSON-encoded arguments of a requested function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Always a JSON string on our side. Some servers send an object; it is
    /// re-encoded on the way in.
    #[serde(default, deserialize_with = "arguments_as_string")]
    pub arguments: String,
}

/// One entry of the tool manifest sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// How the model may use the offered tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
}

/// Everything the orchestrator hands the endpoint for one round trip.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// `None` means the call carries no manifest at all.
    pub tools: Option<Vec<ToolSpec>>,
    pub tool_choice: Option<ToolChoice>,
}

/// The model's answer: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Text content with surrounding whitespace removed, if any remains.
    pub fn trimmed_text(&self) -> Option<String> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// A chat-completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Performs one request/response round trip.
    async fn complete(&self, request: ChatRequest) -> Result<AssistantReply, LlmError>;
}

/// Client for any server implementing `/v1/chat/completions`.
///
/// Constructed once at startup; `reqwest::Client` is reference counted so the
/// struct is cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Builds a client.
    ///
    /// # Arguments
    /// * `base_url` - API root including `/v1`, e.g. `http://localhost:11434/v1`.
    /// * `model` - Model identifier sent with every request.
    /// * `api_key` - Bearer token; empty or `None` sends no header.
    /// * `timeout` - Whole-request timeout.
    ///
    /// # Errors
    /// Returns [`LlmError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists the model identifiers the endpoint serves.
    ///
    /// # Details
    /// Doubles as the startup reachability probe: any transport failure
    /// means the endpoint is down. Uses its own short timeout.
    ///
    /// # Errors
    /// Returns an error when the endpoint is unreachable or answers with a
    /// non-success status.
    pub async fn list_models(&self, timeout: Duration) -> Result<Vec<String>, LlmError> {
        let mut req = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("unreachable: {e}")))?;
        let response = check_status(response).await?;
        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }

    fn payload<'a>(&'a self, request: &'a ChatRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            tools: request.tools.as_deref(),
            tool_choice: request.tools.as_ref().and(request.tool_choice),
            stream: false,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleClient {
    async fn complete(&self, request: ChatRequest) -> Result<AssistantReply, LlmError> {
        let payload = self.payload(&request);
        debug!(
            model = %self.model,
            messages = payload.messages.len(),
            tools = payload.tools.map_or(0, <[ToolSpec]>::len),
            "sending chat completion"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full completion request");
        }

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| {
            error!(url = %self.base_url, error = %e, "chat completion transport failure");
            LlmError::Transport(e.to_string())
        })?;
        let response = check_status(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        trace!(body = %body, "full completion response");
        parse_completion(&body)
    }
}

/// Extracts the first choice of a completion response body.
///
/// # Errors
/// [`LlmError::Decode`] for malformed JSON, [`LlmError::EmptyResponse`] when
/// there are no choices.
pub fn parse_completion(body: &str) -> Result<AssistantReply, LlmError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyResponse)?;
    Ok(AssistantReply {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls,
    })
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|env| env.error.message)
        .unwrap_or(body);
    error!(%status, %message, "chat endpoint returned HTTP error");
    Err(LlmError::Status {
        status: status.as_u16(),
        message,
    })
}

fn function_kind() -> String {
    "function".to_string()
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn arguments_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => "{}".to_string(),
        other => other.to_string(),
    })
}
