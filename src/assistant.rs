/*
 * @file assistant.rs
 * @brief Interactive shell for the SPARQL.AI assistant
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

//! Interaction shell: reads utterances, runs turns, renders replies.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

#[cfg(feature = "voice")]
use crate::audio::VoiceListener;
use crate::config::AppConfig;
use crate::llm::OpenAiCompatibleClient;
use crate::memory::MemoryStore;
use crate::orchestrator::{Conversation, Orchestrator};
use crate::search::SearxngProvider;
use crate::speech::speak;
use crate::tools::ToolRegistry;

/// Name shown in front of every reply.
pub const ASSISTANT_NAME: &str = "SPARQL.AI";

/// Typing or saying this (any case) ends the session.
const EXIT_PHRASE: &str = "exit";

/// Reply given when the user leaves.
pub const FAREWELL: &str = "Goodbye! Shutting down.";

/// Timeout for the startup reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for web searches.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Builds every component from `config` and runs the loop until the user exits.
///
/// # Errors
/// Returns an error when the LLM endpoint is unreachable at startup or the
/// memory file cannot be created. Errors during a turn never end the loop.
pub async fn run_assistant(config: AppConfig) -> Result<()> {
    let client = OpenAiCompatibleClient::new(
        &config.llm_base_url,
        &config.model,
        Some(config.api_key.clone()),
        config.request_timeout(),
    )?;
    ensure_endpoint_ready(&client, config.pull_missing_model).await?;

    let memory = MemoryStore::open(&config.memory_path).with_context(|| {
        format!(
            "Failed to open memory file {}",
            config.memory_path.display()
        )
    })?;
    let search = SearxngProvider::new(&config.search_url, SEARCH_TIMEOUT)?;
    let tools = ToolRegistry::new(&config.tools, Box::new(search), config.search_results);
    let orchestrator = Orchestrator::new(Box::new(client), tools, memory, config.persona.clone());

    let mut session = Session::new(orchestrator);
    let mut input = Input::from_config(&config);

    println!("🚀 {ASSISTANT_NAME} v{} is online.", env!("CARGO_PKG_VERSION"));
    println!("Type '{EXIT_PHRASE}' to end the session.");
    println!("{}", "-".repeat(30));

    loop {
        let text = match input.next().await? {
            Heard::Utterance(text) => text,
            Heard::Nothing => continue,
            Heard::Closed => {
                println!("\n{ASSISTANT_NAME}: {FAREWELL}");
                return Ok(());
            }
        };
        match session.handle_utterance(&text).await {
            TurnOutcome::Ignored => {}
            TurnOutcome::Exit => {
                render_reply(&config, FAREWELL);
                return Ok(());
            }
            TurnOutcome::Reply(reply) => render_reply(&config, &reply),
            TurnOutcome::Failed(err) => {
                println!("\n[ERROR] An error occurred: {err}");
                println!("Restarting conversation history...");
            }
        }
    }
}

/// What a single utterance led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing worth sending (blank input).
    Ignored,
    /// The user asked to leave.
    Exit,
    Reply(String),
    /// The turn failed; the conversation history has been discarded.
    Failed(String),
}

/// One interactive session: the orchestrator plus its short-term history.
pub struct Session {
    orchestrator: Orchestrator,
    history: Conversation,
}

impl Session {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            history: Conversation::new(),
        }
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    /// Handles one utterance end to end.
    ///
    /// # Details
    /// Checks for the exit phrase, otherwise runs a full turn. When the turn
    /// fails the whole history is dropped so the next turn starts clean;
    /// the failed turn is not retried.
    pub async fn handle_utterance(&mut self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }
        if is_exit_phrase(text) {
            return TurnOutcome::Exit;
        }
        match self.orchestrator.respond(text, &mut self.history).await {
            Ok(reply) => TurnOutcome::Reply(reply),
            Err(err) => {
                warn!(error = %err, "turn failed, discarding conversation history");
                self.history.clear();
                TurnOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Case-insensitive exact match against the exit phrase.
///
/// Trailing ASCII punctuation is ignored since Whisper transcribes a spoken
/// "exit" as `Exit.` or `Exit!`.
pub fn is_exit_phrase(text: &str) -> bool {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_end()
        .eq_ignore_ascii_case(EXIT_PHRASE)
}

enum Heard {
    Utterance(String),
    /// Nothing captured this time; listen again.
    Nothing,
    /// Input is exhausted (stdin closed).
    Closed,
}

enum Input {
    Text(Lines<BufReader<Stdin>>),
    #[cfg(feature = "voice")]
    Voice(VoiceListener),
}

impl Input {
    #[cfg(feature = "voice")]
    fn from_config(config: &AppConfig) -> Self {
        if config.input_mode == crate::config::InputMode::Voice {
            return Input::Voice(VoiceListener::new());
        }
        Self::stdin()
    }

    /// Text is the only input in builds without `voice`; `AppConfig::validate`
    /// rejects voice mode there.
    #[cfg(not(feature = "voice"))]
    fn from_config(_config: &AppConfig) -> Self {
        Self::stdin()
    }

    fn stdin() -> Self {
        Input::Text(BufReader::new(tokio::io::stdin()).lines())
    }

    async fn next(&mut self) -> Result<Heard> {
        match self {
            Input::Text(lines) => {
                print!("You: ");
                std::io::stdout().flush().ok();
                match lines.next_line().await.context("Failed to read stdin")? {
                    Some(line) => Ok(Heard::Utterance(line)),
                    None => Ok(Heard::Closed),
                }
            }
            #[cfg(feature = "voice")]
            Input::Voice(listener) => {
                let heard = tokio::task::block_in_place(|| listener.listen());
                Ok(heard.map_or(Heard::Nothing, Heard::Utterance))
            }
        }
    }
}

/// Prints the reply and speaks it when speech output is on.
fn render_reply(config: &AppConfig, reply: &str) {
    println!("\n{ASSISTANT_NAME}: {reply}\n");
    if config.speaks() && !reply.trim().is_empty() {
        if let Err(err) = speak(reply, &config.tts_command) {
            warn!(error = %format!("{err:#}"), "could not speak reply");
        }
    }
}

/// Fails fast when the endpoint is down and makes sure the model exists.
///
/// # Details
/// Lists the endpoint's models. Unreachable means fatal. A missing model is
/// only a warning since some servers load models on demand; when
/// `pull_missing` is set an `ollama pull` is attempted first.
///
/// # Errors
/// Returns an error when the endpoint cannot be reached.
async fn ensure_endpoint_ready(client: &OpenAiCompatibleClient, pull_missing: bool) -> Result<()> {
    info!(url = client.base_url(), "checking LLM endpoint");
    let models = client.list_models(PROBE_TIMEOUT).await.with_context(|| {
        format!(
            "Could not reach the LLM endpoint at {}. Is Ollama running?",
            client.base_url()
        )
    })?;
    if model_is_listed(&models, client.model()) {
        info!(model = client.model(), "model is ready");
        return Ok(());
    }
    warn!(model = client.model(), "model not listed by the endpoint");
    if pull_missing {
        println!("Model {} not found, downloading...", client.model());
        println!("This may take several minutes depending on your connection.");
        if let Err(err) = pull_model(client.model()) {
            warn!(error = %format!("{err:#}"), "model download failed");
        }
    }
    Ok(())
}

/// Ollama lists `name:latest` for models requested without a tag.
fn model_is_listed(models: &[String], model: &str) -> bool {
    models
        .iter()
        .any(|id| id == model || *id == format!("{model}:latest"))
}

/// Downloads a model using the Ollama CLI, showing its progress output.
fn pull_model(model: &str) -> Result<()> {
    let status = std::process::Command::new("ollama")
        .arg("pull")
        .arg(model)
        .status()
        .context("Failed to execute ollama pull")?;
    if !status.success() {
        anyhow::bail!("Failed to download model {}", model);
    }
    Ok(())
}
