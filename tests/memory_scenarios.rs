//! Remember-then-recall across two assistant processes sharing a memory file.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use sparql_ai::error::{LlmError, SearchError};
use sparql_ai::llm::{AssistantReply, ChatBackend, ChatMessage, ChatRequest, ToolCall};
use sparql_ai::memory::MemoryStore;
use sparql_ai::orchestrator::{Conversation, Orchestrator, DEFAULT_PERSONA};
use sparql_ai::search::{SearchHit, SearchProvider};
use sparql_ai::tools::{Tool, ToolRegistry};

#[derive(Clone)]
struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<AssistantReply>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
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
            .ok_or(LlmError::EmptyResponse)
    }
}

struct NoSearch;

#[async_trait]
impl SearchProvider for NoSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(Vec::new())
    }
}

/// A fresh "process": new store handle, new registry, new history.
fn boot(path: &Path, backend: &ScriptedBackend) -> Orchestrator {
    let memory = MemoryStore::open(path).unwrap();
    let tools = ToolRegistry::new(&Tool::ALL, Box::new(NoSearch), 3);
    Orchestrator::new(Box::new(backend.clone()), tools, memory, DEFAULT_PERSONA)
}

#[tokio::test]
async fn remembers_favorite_color_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long_term_memory.json");

    let first = ScriptedBackend::new(vec![
        AssistantReply::calls(vec![ToolCall::new(
            "call_save",
            "save_to_memory",
            r#"{"key":"favorite_color","value":"blue"}"#,
        )]),
        AssistantReply::text("Got it, your favorite color is blue."),
    ]);
    let assistant = boot(&path, &first);
    let reply = assistant
        .respond("remember my favorite color is blue", &mut Conversation::new())
        .await
        .unwrap();
    assert_eq!(reply, "Got it, your favorite color is blue.");

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"favorite_color": "blue"}));
    {
        let requests = first.requests.lock().unwrap();
        let ChatMessage::Tool { content, .. } = requests[1].messages.last().unwrap() else {
            panic!("summary pass must end with the tool result");
        };
        assert!(content.starts_with("Successfully saved favorite_color = blue"));
    }
    drop(assistant);

    let second = ScriptedBackend::new(vec![
        AssistantReply::calls(vec![ToolCall::new(
            "call_load",
            "load_from_memory",
            r#"{"key":"favorite_color"}"#,
        )]),
        AssistantReply::text("Your favorite color is blue."),
    ]);
    let assistant = boot(&path, &second);
    let mut history = Conversation::new();
    let reply = assistant
        .respond("what is my favorite color", &mut history)
        .await
        .unwrap();
    assert_eq!(reply, "Your favorite color is blue.");

    let tool_turn = history
        .turns()
        .iter()
        .find_map(|turn| match turn {
            ChatMessage::Tool {
                tool_call_id,
                content,
                ..
            } => Some((tool_call_id.clone(), content.clone())),
            _ => None,
        })
        .expect("a tool turn");
    assert_eq!(tool_turn.0, "call_load");
    assert_eq!(
        tool_turn.1,
        "Retrieved favorite_color = blue from long-term memory."
    );

    let requests = second.requests.lock().unwrap();
    let ChatMessage::System { content } = &requests[0].messages[0] else {
        panic!("first message must be the system prompt");
    };
    assert!(content.contains("- favorite_color: blue"));
}
