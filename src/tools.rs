/*
 * @file tools.rs
 * @brief Tool manifest and dispatch
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

//! Tool registry: the fixed set of actions the model may request.
//!
//! Tools are a closed enum so every variant is forced to declare its name,
//! description, parameters, and handler. The manifest built from it is what
//! the endpoint sees; dispatch is internal.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::llm::{FunctionSpec, ToolCall, ToolSpec};
use crate::memory::{display_value, MemoryStore};
use crate::search::SearchProvider;

/// Every action the assistant knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    GetCurrentTime,
    SaveToMemory,
    LoadFromMemory,
    #[serde(rename = "google_search")]
    WebSearch,
}

/// One declared argument of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl Tool {
    pub const ALL: [Tool; 4] = [
        Tool::GetCurrentTime,
        Tool::SaveToMemory,
        Tool::LoadFromMemory,
        Tool::WebSearch,
    ];

    /// Name the model uses to request the tool.
    pub fn name(self) -> &'static str {
        match self {
            Tool::GetCurrentTime => "get_current_time",
            Tool::SaveToMemory => "save_to_memory",
            Tool::LoadFromMemory => "load_from_memory",
            Tool::WebSearch => "google_search",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::GetCurrentTime => "Returns the current date and time.",
            Tool::SaveToMemory => "Saves a fact to the user's long-term memory.",
            Tool::LoadFromMemory => "Loads a specific fact from the user's long-term memory.",
            Tool::WebSearch => {
                "Searches the web and returns the top results with title, description and URL."
            }
        }
    }

    pub fn parameters(self) -> &'static [Parameter] {
        const KEY_TO_SAVE: Parameter = Parameter {
            name: "key",
            kind: "string",
            description: "The key or category of the fact to save.",
            required: true,
        };
        const VALUE_TO_SAVE: Parameter = Parameter {
            name: "value",
            kind: "string",
            description: "The value of the fact to save.",
            required: true,
        };
        const KEY_TO_LOAD: Parameter = Parameter {
            name: "key",
            kind: "string",
            description: "The key or category of the fact to load.",
            required: true,
        };
        const QUERY: Parameter = Parameter {
            name: "query",
            kind: "string",
            description: "The search query.",
            required: true,
        };
        match self {
            Tool::GetCurrentTime => &[],
            Tool::SaveToMemory => &[KEY_TO_SAVE, VALUE_TO_SAVE],
            Tool::LoadFromMemory => &[KEY_TO_LOAD],
            Tool::WebSearch => &[QUERY],
        }
    }

    /// JSON-schema object describing the parameters.
    pub fn parameter_schema(self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.parameters() {
            properties.insert(
                param.name.to_string(),
                json!({"type": param.kind, "description": param.description}),
            );
            if param.required {
                required.push(param.name);
            }
        }
        let mut schema = json!({"type": "object", "properties": properties});
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Manifest entry for this tool.
    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            kind: "function",
            function: FunctionSpec {
                name: self.name(),
                description: self.description(),
                parameters: self.parameter_schema(),
            },
        }
    }
}

/// Result of running a tool.
///
/// Both arms carry text meant for the conversation; the distinction only
/// matters for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ToolOutcome::Failure(_))
    }

    /// Text for the `tool` turn.
    pub fn into_content(self) -> String {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Failure(text) => text,
        }
    }
}

/// The enabled tools plus whatever they need to run.
pub struct ToolRegistry {
    enabled: Vec<Tool>,
    search: Box<dyn SearchProvider>,
    search_results: usize,
}

impl ToolRegistry {
    /// Builds a registry exposing `enabled` (duplicates are dropped).
    ///
    /// # Arguments
    /// * `enabled` - Tools offered to the model, in manifest order.
    /// * `search` - Provider behind `google_search`.
    /// * `search_results` - Maximum number of hits returned per search.
    pub fn new(enabled: &[Tool], search: Box<dyn SearchProvider>, search_results: usize) -> Self {
        let mut unique = Vec::with_capacity(enabled.len());
        for tool in enabled {
            if !unique.contains(tool) {
                unique.push(*tool);
            }
        }
        Self {
            enabled: unique,
            search,
            search_results,
        }
    }

    /// Manifest shared with the endpoint.
    pub fn manifest(&self) -> Vec<ToolSpec> {
        self.enabled.iter().map(|tool| tool.spec()).collect()
    }

    /// Runs one requested invocation.
    ///
    /// # Details
    /// Never fails: an unknown or disabled tool, malformed arguments, and
    /// errors raised inside a tool all come back as [`ToolOutcome::Failure`]
    /// so the turn can continue.
    ///
    /// # Arguments
    /// * `call` - The invocation as produced by the model.
    /// * `memory` - Store used by the memory tools.
    pub async fn dispatch(&self, call: &ToolCall, memory: &MemoryStore) -> ToolOutcome {
        let name = call.function.name.as_str();
        let Some(tool) = Tool::from_name(name).filter(|tool| self.enabled.contains(tool)) else {
            warn!(tool = name, "model requested an unknown tool");
            return ToolOutcome::Failure(format!("Error: Tool '{name}' not found."));
        };
        let args = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(outcome) => return outcome,
        };
        debug!(tool = name, id = %call.id, "dispatching tool");
        let outcome = match tool {
            Tool::GetCurrentTime => current_time(),
            Tool::SaveToMemory => save_to_memory(&args, memory),
            Tool::LoadFromMemory => load_from_memory(&args, memory),
            Tool::WebSearch => self.web_search(&args).await,
        };
        if outcome.is_failure() {
            warn!(tool = name, id = %call.id, "tool failed");
        }
        outcome
    }

    async fn web_search(&self, args: &Map<String, Value>) -> ToolOutcome {
        let query = match required_str(args, "query") {
            Ok(query) => query,
            Err(outcome) => return outcome,
        };
        match self.search.search(query, self.search_results).await {
            Ok(hits) if hits.is_empty() => {
                ToolOutcome::Success(format!("No results found for '{query}'."))
            }
            Ok(hits) => ToolOutcome::Success(
                hits.iter()
                    .take(self.search_results)
                    .map(|hit| hit.to_snippet())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            Err(err) => ToolOutcome::Failure(format!("An error occurred during search: {err}")),
        }
    }
}

fn current_time() -> ToolOutcome {
    ToolOutcome::Success(chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
}

fn save_to_memory(args: &Map<String, Value>, memory: &MemoryStore) -> ToolOutcome {
    let key = match required_str(args, "key") {
        Ok(key) => key,
        Err(outcome) => return outcome,
    };
    let Some(value) = args.get("value").filter(|v| !v.is_null()) else {
        return missing_argument("value");
    };
    if value.is_object() || value.is_array() {
        return ToolOutcome::Failure(
            "Error: argument 'value' must be a string, number or boolean.".to_string(),
        );
    }
    let shown = display_value(value);
    match memory.save(key, value.clone()) {
        Ok(()) => ToolOutcome::Success(format!(
            "Successfully saved {key} = {shown} to long-term memory."
        )),
        Err(err) => ToolOutcome::Failure(format!("Error: could not save {key} to memory: {err:#}")),
    }
}

fn load_from_memory(args: &Map<String, Value>, memory: &MemoryStore) -> ToolOutcome {
    let key = match required_str(args, "key") {
        Ok(key) => key,
        Err(outcome) => return outcome,
    };
    match memory.load(key) {
        Some(value) => ToolOutcome::Success(format!(
            "Retrieved {key} = {} from long-term memory.",
            display_value(&value)
        )),
        None => ToolOutcome::Success(format!("No value found for {key} in memory.")),
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, ToolOutcome> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ToolOutcome::Failure(
            "Error: tool arguments must be a JSON object.".to_string(),
        )),
        Err(err) => Err(ToolOutcome::Failure(format!(
            "Error: could not parse tool arguments: {err}"
        ))),
    }
}

fn required_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolOutcome> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing_argument(name))
}

fn missing_argument(name: &str) -> ToolOutcome {
    ToolOutcome::Failure(format!("Error: missing required argument '{name}'."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::search::SearchHit;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedSearch(Vec<SearchHit>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl SearchProvider for BrokenSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Request("connection refused".into()))
        }
    }

    fn hit(n: usize) -> SearchHit {
        SearchHit {
            title: format!("Result {n}"),
            description: format!("About {n}"),
            url: format!("https://example.com/{n}"),
        }
    }

    fn setup(search: Box<dyn SearchProvider>) -> (TempDir, MemoryStore, ToolRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(dir.path().join("memory.json")).unwrap();
        (dir, memory, ToolRegistry::new(&Tool::ALL, search, 3))
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall::new("call_test", name, args)
    }

    #[test]
    fn names_round_trip_and_are_unique() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("launch_rockets"), None);
    }

    #[test]
    fn config_names_match_wire_names() {
        let parsed: Vec<Tool> = serde_json::from_str(
            r#"["get_current_time","save_to_memory","load_from_memory","google_search"]"#,
        )
        .unwrap();
        assert_eq!(parsed, Tool::ALL.to_vec());
    }

    #[test]
    fn manifest_uses_function_wire_shape() {
        let (_dir, _memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let manifest = serde_json::to_value(registry.manifest()).unwrap();
        assert_eq!(manifest.as_array().unwrap().len(), 4);
        assert_eq!(
            manifest[1],
            json!({
                "type": "function",
                "function": {
                    "name": "save_to_memory",
                    "description": "Saves a fact to the user's long-term memory.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "key": {"type": "string", "description": "The key or category of the fact to save."},
                            "value": {"type": "string", "description": "The value of the fact to save."}
                        },
                        "required": ["key", "value"]
                    }
                }
            })
        );
        assert_eq!(
            manifest[0]["function"]["parameters"],
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn duplicate_tools_are_listed_once() {
        let registry = ToolRegistry::new(
            &[Tool::GetCurrentTime, Tool::GetCurrentTime],
            Box::new(FixedSearch(vec![])),
            3,
        );
        assert_eq!(registry.manifest().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_raised() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let outcome = registry.dispatch(&call("launch_rockets", "{}"), &memory).await;
        assert!(outcome.is_failure());
        assert!(outcome.into_content().contains("not found"));
    }

    #[tokio::test]
    async fn disabled_tool_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(dir.path().join("m.json")).unwrap();
        let registry = ToolRegistry::new(&[Tool::GetCurrentTime], Box::new(BrokenSearch), 3);
        let outcome = registry
            .dispatch(&call("google_search", r#"{"query":"rust"}"#), &memory)
            .await;
        assert_eq!(
            outcome.into_content(),
            "Error: Tool 'google_search' not found."
        );
    }

    #[tokio::test]
    async fn save_then_load_through_dispatch() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let saved = registry
            .dispatch(
                &call("save_to_memory", r#"{"key":"favorite_color","value":"blue"}"#),
                &memory,
            )
            .await;
        assert_eq!(
            saved,
            ToolOutcome::Success(
                "Successfully saved favorite_color = blue to long-term memory.".into()
            )
        );
        let loaded = registry
            .dispatch(&call("load_from_memory", r#"{"key":"favorite_color"}"#), &memory)
            .await;
        assert_eq!(
            loaded.into_content(),
            "Retrieved favorite_color = blue from long-term memory."
        );
    }

    #[tokio::test]
    async fn load_missing_key_says_so() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let outcome = registry
            .dispatch(&call("load_from_memory", r#"{"key":"pet"}"#), &memory)
            .await;
        assert_eq!(outcome.into_content(), "No value found for pet in memory.");
    }

    #[tokio::test]
    async fn malformed_arguments_become_failure_text() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let outcome = registry
            .dispatch(&call("save_to_memory", "{key: oops"), &memory)
            .await;
        assert!(outcome.is_failure());
        assert!(outcome.into_content().starts_with("Error: could not parse"));
    }

    #[tokio::test]
    async fn missing_argument_is_reported() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let outcome = registry
            .dispatch(&call("save_to_memory", r#"{"key":"x"}"#), &memory)
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure("Error: missing required argument 'value'.".into())
        );
        assert!(memory.entries().is_empty());
    }

    #[tokio::test]
    async fn structured_values_are_not_saved() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        for args in [
            r#"{"key":"pets","value":["cat","dog"]}"#,
            r#"{"key":"home","value":{"city":"Pune"}}"#,
        ] {
            let outcome = registry.dispatch(&call("save_to_memory", args), &memory).await;
            assert!(outcome.is_failure());
            assert!(outcome.into_content().starts_with("Error: argument 'value'"));
        }
        assert!(memory.entries().is_empty());

        let saved = registry
            .dispatch(&call("save_to_memory", r#"{"key":"age","value":30}"#), &memory)
            .await;
        assert_eq!(
            saved.into_content(),
            "Successfully saved age = 30 to long-term memory."
        );
    }

    #[tokio::test]
    async fn current_time_is_iso_timestamp() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let text = registry
            .dispatch(&call("get_current_time", ""), &memory)
            .await
            .into_content();
        assert!(chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }

    #[tokio::test]
    async fn search_returns_at_most_three_snippets() {
        let hits = (1..=5).map(hit).collect();
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(hits)));
        let text = registry
            .dispatch(&call("google_search", r#"{"query":"rust"}"#), &memory)
            .await
            .into_content();
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[0],
            "Title: Result 1\nDescription: About 1\nURL: https://example.com/1"
        );
    }

    #[tokio::test]
    async fn search_without_hits_says_no_results() {
        let (_dir, memory, registry) = setup(Box::new(FixedSearch(vec![])));
        let text = registry
            .dispatch(&call("google_search", r#"{"query":"zzqx"}"#), &memory)
            .await
            .into_content();
        assert_eq!(text, "No results found for 'zzqx'.");
    }

    #[tokio::test]
    async fn search_provider_error_is_converted() {
        let (_dir, memory, registry) = setup(Box::new(BrokenSearch));
        let outcome = registry
            .dispatch(&call("google_search", r#"{"query":"rust"}"#), &memory)
            .await;
        assert!(outcome.is_failure());
        let text = outcome.into_content();
        assert!(text.contains("error occurred"));
        assert!(text.contains("connection refused"));
    }
}
