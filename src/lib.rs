/*
 * @file lib.rs
 * @brief SPARQL.AI library root
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

//! SPARQL.AI - a voice and text assistant backed by a local LLM.
//!
//! This library provides an assistant that:
//! - talks to any OpenAI-compatible chat endpoint (Ollama by default)
//! - lets the model call tools: long-term memory, the clock, web search
//! - keeps long-term memory in a JSON file and short-term memory per session
//! - optionally listens through the microphone with local Whisper
//!   (`voice` feature) and speaks replies through a TTS command
//!
//! # Example
//! ```no_run
//! use anyhow::Result;
//! use sparql_ai::{assistant, config::AppConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     dotenv::dotenv().ok();
//!     assistant::run_assistant(AppConfig::load()).await
//! }
//! ```

pub mod assistant;
#[cfg(feature = "voice")]
pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod search;
pub mod speech;
pub mod tools;
