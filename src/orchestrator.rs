/*
 * @file orchestrator.rs
 * @brief Conversation and tool-call orchestration
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

//! Conversation orchestration: prompt assembly, the endpoint round trips, and
//! tool execution.
//!
//! Each turn is at most two requests. The first offers the tool manifest; if
//! the model asks for tools they all run in order, their results are added to
//! the history, and a second request without any manifest asks the model to
//! narrate what happened. There is no third pass.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LlmError;
use crate::llm::{AssistantReply, ChatBackend, ChatMessage, ChatRequest, ToolChoice};
use crate::memory::MemoryStore;
use crate::tools::ToolRegistry;

/// Persona used when `config.json` does not override it.
pub const DEFAULT_PERSONA: &str = "You are SPARQL.AI, a 'Self Thinking Autonomous Real-time eXperience' agent. \
You are helpful, empathetic, and capable of performing actions. \
You have access to tools to perform actions and a long-term memory. \
When a user asks you to remember something, use the 'save_to_memory' tool.";

/// Short-term memory: the turns of the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ChatMessage) {
        self.turns.push(turn);
    }

    /// Drops every turn; the next request starts from a blank slate.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Owns the endpoint client, the tool registry, and the memory store.
pub struct Orchestrator {
    backend: Box<dyn ChatBackend>,
    tools: ToolRegistry,
    memory: MemoryStore,
    persona: String,
}

impl Orchestrator {
    pub fn new(
        backend: Box<dyn ChatBackend>,
        tools: ToolRegistry,
        memory: MemoryStore,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            tools,
            memory,
            persona: persona.into(),
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Builds the system prompt: persona followed by the current memory snapshot.
    ///
    /// # Details
    /// The memory file is re-read on every call so facts saved by a tool in
    /// the previous turn are visible immediately.
    pub fn system_prompt(&self) -> String {
        format!(
            "{}\n\n---\nHere is what you know about the user (your long-term memory):\n{}\n---",
            self.persona,
            self.memory.render_as_text()
        )
    }

    /// Runs one user turn to completion and returns the reply text.
    ///
    /// # Details
    /// Appends the user turn, the assistant turn(s), and any tool turns to
    /// `history`. Tool failures never abort the turn; they are reported to
    /// the model as text.
    ///
    /// # Arguments
    /// * `user_input` - What the user said or typed.
    /// * `history` - The session's conversation so far.
    ///
    /// # Returns
    /// * `Ok(String)` - The final natural-language reply.
    ///
    /// # Errors
    /// Returns [`LlmError`] when either round trip fails. A blank reply is
    /// not an error. `history` may then hold a partial turn; the caller is
    /// expected to discard it.
    pub async fn respond(
        &self,
        user_input: &str,
        history: &mut Conversation,
    ) -> Result<String, LlmError> {
        history.push(ChatMessage::user(user_input));
        let system_prompt = self.system_prompt();

        let manifest = self.tools.manifest();
        let first = self
            .backend
            .complete(ChatRequest {
                messages: with_system(&system_prompt, history),
                tool_choice: (!manifest.is_empty()).then_some(ToolChoice::Auto),
                tools: (!manifest.is_empty()).then_some(manifest),
            })
            .await?;

        if !first.wants_tools() {
            return Ok(finish(first, history));
        }

        let calls: Vec<_> = first
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", Uuid::new_v4().simple());
                }
                call
            })
            .collect();
        info!(count = calls.len(), "model requested tools");
        history.push(ChatMessage::Assistant {
            content: first.content,
            tool_calls: calls.clone(),
        });

        for call in &calls {
            let outcome = self.tools.dispatch(call, &self.memory).await;
            debug!(tool = %call.function.name, id = %call.id, ?outcome, "tool finished");
            history.push(ChatMessage::tool(call, outcome.into_content()));
        }

        let second = self
            .backend
            .complete(ChatRequest {
                messages: with_system(&system_prompt, history),
                tools: None,
                tool_choice: None,
            })
            .await?;
        if second.wants_tools() {
            warn!(
                count = second.tool_calls.len(),
                "ignoring tool calls in the summary pass"
            );
        }
        Ok(finish(second, history))
    }
}

fn with_system(system_prompt: &str, history: &Conversation) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.turns().iter().cloned());
    messages
}

/// Records the final reply. A blank reply is kept as an empty turn; small
/// models often answer a tool result with `content: ""`.
fn finish(reply: AssistantReply, history: &mut Conversation) -> String {
    let text = reply.trimmed_text().unwrap_or_default();
    if text.is_empty() {
        warn!("model returned a blank reply");
    }
    history.push(ChatMessage::assistant(text.clone()));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::llm::ToolCall;
    use crate::search::{SearchHit, SearchProvider};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Backend that plays back canned replies and records every request.
    #[derive(Clone, Default)]
    struct ScriptedBackend {
        replies: Arc<Mutex<VecDeque<Result<AssistantReply, LlmError>>>>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<AssistantReply, LlmError>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                requests: Arc::default(),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, request: ChatRequest) -> Result<AssistantReply, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl SearchProvider for BrokenSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Request("provider exploded".into()))
        }
    }

    fn orchestrator(backend: &ScriptedBackend) -> (TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(dir.path().join("memory.json")).unwrap();
        let tools = ToolRegistry::new(&Tool::ALL, Box::new(BrokenSearch), 3);
        let orch = Orchestrator::new(Box::new(backend.clone()), tools, memory, DEFAULT_PERSONA);
        (dir, orch)
    }

    fn roles(messages: &[ChatMessage]) -> Vec<&'static str> {
        messages.iter().map(ChatMessage::role).collect()
    }

    #[tokio::test]
    async fn plain_reply_is_single_pass() {
        let backend = ScriptedBackend::new(vec![Ok(AssistantReply::text("Hello!"))]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        let reply = orch.respond("hi", &mut history).await.unwrap();

        assert_eq!(reply, "Hello!");
        assert_eq!(roles(history.turns()), ["user", "assistant"]);
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(4));
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(roles(&requests[0].messages), ["system", "user"]);
    }

    #[tokio::test]
    async fn system_prompt_carries_memory_snapshot() {
        let backend = ScriptedBackend::new(vec![Ok(AssistantReply::text("ok"))]);
        let (_dir, orch) = orchestrator(&backend);
        orch.memory().save("user_name", "Rahul").unwrap();

        orch.respond("hi", &mut Conversation::new()).await.unwrap();

        let requests = backend.requests();
        let ChatMessage::System { content } = &requests[0].messages[0] else {
            panic!("first message must be the system prompt");
        };
        assert!(content.starts_with("You are SPARQL.AI"));
        assert!(content.contains("- user_name: Rahul"));
    }

    #[tokio::test]
    async fn empty_memory_prompt_says_so() {
        let backend = ScriptedBackend::default();
        let (_dir, orch) = orchestrator(&backend);
        assert!(orch
            .system_prompt()
            .contains(crate::memory::NO_MEMORIES));
    }

    #[tokio::test]
    async fn two_tool_calls_then_exactly_one_summary_pass() {
        let backend = ScriptedBackend::new(vec![
            Ok(AssistantReply::calls(vec![
                ToolCall::new("call_1", "save_to_memory", r#"{"key":"pet","value":"cat"}"#),
                ToolCall::new("call_2", "get_current_time", "{}"),
            ])),
            Ok(AssistantReply::text("Saved, and it is late.")),
        ]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        let reply = orch.respond("remember my pet is a cat", &mut history).await.unwrap();

        assert_eq!(reply, "Saved, and it is late.");
        assert_eq!(
            roles(history.turns()),
            ["user", "assistant", "tool", "tool", "assistant"]
        );
        let ids: Vec<_> = history
            .turns()
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["call_1", "call_2"]);

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert!(second.tools.is_none());
        assert!(second.tool_choice.is_none());
        assert_eq!(
            roles(&second.messages),
            ["system", "user", "assistant", "tool", "tool"]
        );
        assert_eq!(orch.memory().load("pet"), Some(serde_json::json!("cat")));
    }

    #[tokio::test]
    async fn failing_and_unknown_tools_do_not_stop_the_turn() {
        let backend = ScriptedBackend::new(vec![
            Ok(AssistantReply::calls(vec![
                ToolCall::new("s1", "google_search", r#"{"query":"weather"}"#),
                ToolCall::new("s2", "teleport", "{}"),
                ToolCall::new("s3", "load_from_memory", r#"{"key":"pet"}"#),
            ])),
            Ok(AssistantReply::text("Search is down, sorry.")),
        ]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        let reply = orch.respond("what's the weather", &mut history).await.unwrap();

        assert_eq!(reply, "Search is down, sorry.");
        let contents: Vec<_> = history
            .turns()
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(contents.len(), 3);
        assert!(contents[0].contains("error occurred"));
        assert!(contents[1].contains("not found"));
        assert_eq!(contents[2], "No value found for pet in memory.");
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn missing_call_ids_are_generated() {
        let backend = ScriptedBackend::new(vec![
            Ok(AssistantReply::calls(vec![ToolCall::new("", "get_current_time", "")])),
            Ok(AssistantReply::text("It is noon.")),
        ]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        orch.respond("time?", &mut history).await.unwrap();

        let ChatMessage::Assistant { tool_calls, .. } = &history.turns()[1] else {
            panic!("expected the tool-call turn");
        };
        let ChatMessage::Tool { tool_call_id, .. } = &history.turns()[2] else {
            panic!("expected the tool result turn");
        };
        assert!(tool_calls[0].id.starts_with("call_"));
        assert_eq!(&tool_calls[0].id, tool_call_id);
    }

    #[tokio::test]
    async fn tool_calls_in_summary_pass_are_not_executed() {
        let backend = ScriptedBackend::new(vec![
            Ok(AssistantReply::calls(vec![ToolCall::new("a", "get_current_time", "")])),
            Ok(AssistantReply {
                content: Some("Done.".into()),
                tool_calls: vec![ToolCall::new("b", "save_to_memory", r#"{"key":"x","value":"y"}"#)],
            }),
        ]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        assert_eq!(orch.respond("go", &mut history).await.unwrap(), "Done.");
        assert_eq!(backend.requests().len(), 2);
        assert!(orch.memory().load("x").is_none());
    }

    #[tokio::test]
    async fn blank_summary_after_tool_call_keeps_history() {
        let backend = ScriptedBackend::new(vec![
            Ok(AssistantReply::calls(vec![ToolCall::new(
                "c1",
                "save_to_memory",
                r#"{"key":"favorite_color","value":"blue"}"#,
            )])),
            Ok(AssistantReply::text("")),
        ]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();

        let reply = orch.respond("remember blue", &mut history).await.unwrap();

        assert_eq!(reply, "");
        assert_eq!(
            roles(history.turns()),
            ["user", "assistant", "tool", "assistant"]
        );
        assert_eq!(
            orch.memory().load("favorite_color"),
            Some(serde_json::json!("blue"))
        );
    }

    #[tokio::test]
    async fn blank_first_reply_is_returned_empty() {
        let backend = ScriptedBackend::new(vec![Ok(AssistantReply::text("   "))]);
        let (_dir, orch) = orchestrator(&backend);
        let mut history = Conversation::new();
        assert_eq!(orch.respond("hi", &mut history).await.unwrap(), "");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let backend =
            ScriptedBackend::new(vec![Err(LlmError::Transport("connection refused".into()))]);
        let (_dir, orch) = orchestrator(&backend);
        let result = orch.respond("hi", &mut Conversation::new()).await;
        assert!(matches!(result, Err(LlmError::Transport(_))));
    }

    #[tokio::test]
    async fn no_enabled_tools_sends_no_manifest() {
        let backend = ScriptedBackend::new(vec![Ok(AssistantReply::text("hey"))]);
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(dir.path().join("memory.json")).unwrap();
        let tools = ToolRegistry::new(&[], Box::new(BrokenSearch), 3);
        let orch = Orchestrator::new(Box::new(backend.clone()), tools, memory, "persona");

        orch.respond("hi", &mut Conversation::new()).await.unwrap();

        let requests = backend.requests();
        assert!(requests[0].tools.is_none());
        assert!(requests[0].tool_choice.is_none());
    }
}
