/*
 * @file config.rs
 * @brief Runtime configuration loading
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

//! Runtime configuration: `config.json` plus environment overrides.
//!
//! Loaded before the tracing subscriber exists, so problems are reported
//! with `eprintln!`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::orchestrator::DEFAULT_PERSONA;
use crate::tools::Tool;

/// Path to the JSON configuration file that holds runtime defaults.
pub const CONFIG_PATH: &str = "config.json";

/// Where user input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Text,
    Voice,
}

impl InputMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }
}

/// Strongly typed representation of `config.json`.
///
/// # Details
/// Every field has a default so a partial file (or none at all) is valid.
/// The model identifier and the tool list are configuration because
/// different local models support different tool sets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm_base_url: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub pull_missing_model: bool,
    pub memory_path: PathBuf,
    pub search_url: String,
    pub search_results: usize,
    pub tools: Vec<Tool>,
    pub persona: String,
    pub input_mode: InputMode,
    pub speak_replies: bool,
    pub tts_command: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: "ollama".to_string(),
            request_timeout_secs: 120,
            pull_missing_model: true,
            memory_path: PathBuf::from("long_term_memory.json"),
            search_url: "http://localhost:8888/search".to_string(),
            search_results: 3,
            tools: Tool::ALL.to_vec(),
            persona: DEFAULT_PERSONA.to_string(),
            input_mode: InputMode::Text,
            speak_replies: false,
            tts_command: default_tts_command().to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads `config.json` from the working directory and applies the
    /// process environment on top.
    pub fn load() -> Self {
        let mut config = load_from_file(Path::new(CONFIG_PATH));
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Overrides fields from environment variables.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, if set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SPARQL_LLM_BASE_URL") {
            self.llm_base_url = url;
        }
        if let Some(model) = lookup("SPARQL_MODEL") {
            self.model = model;
        }
        if let Some(key) = lookup("SPARQL_API_KEY") {
            self.api_key = key;
        }
        if let Some(path) = lookup("SPARQL_MEMORY_PATH") {
            self.memory_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SPARQL_SEARCH_URL") {
            self.search_url = url;
        }
        if let Some(raw) = lookup("SPARQL_INPUT_MODE") {
            match InputMode::parse(&raw) {
                Some(mode) => self.input_mode = mode,
                None => eprintln!("Ignoring unknown SPARQL_INPUT_MODE: {raw}"),
            }
        }
        if let Some(raw) = lookup("SPARQL_SPEAK") {
            match parse_flag(&raw) {
                Some(flag) => self.speak_replies = flag,
                None => eprintln!("Ignoring non-boolean SPARQL_SPEAK: {raw}"),
            }
        }
        if let Some(command) = lookup("SPARQL_TTS_COMMAND") {
            self.tts_command = command;
        }
    }

    /// Rejects settings the runtime cannot honour.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for empty endpoint/model values, a zero
    /// result count, or voice input in a build without the `voice` feature.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.llm_base_url.trim().is_empty() {
            return Err(AppError::Config("llm_base_url must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::Config("model must not be empty".into()));
        }
        if self.search_results == 0 {
            return Err(AppError::Config("search_results must be at least 1".into()));
        }
        if self.input_mode == InputMode::Voice && !cfg!(feature = "voice") {
            return Err(AppError::Config(
                "input_mode \"voice\" needs a build with the `voice` feature".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Replies are spoken when asked for, and always in voice mode.
    pub fn speaks(&self) -> bool {
        self.speak_replies || self.input_mode == InputMode::Voice
    }
}

/// Reads a config file, falling back to defaults when it is missing or invalid.
pub fn load_from_file(path: &Path) -> AppConfig {
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("Config parse error ({}): {}", path.display(), err);
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_tts_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "say"
    } else {
        "espeak"
    }
}
