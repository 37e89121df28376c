/*
 * @file speech.rs
 * @brief Text-to-speech output
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

//! Text-to-speech through an external command (`say`, `espeak`, ...).

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Speaks `text` by running `command <text>` and waiting for it to finish.
///
/// # Parameters
/// * `text` - The utterance to synthesize.
/// * `command` - TTS program taking the text as its only argument.
///
/// # Errors
/// Returns an error for empty text, when the command cannot be spawned, or
/// when it exits unsuccessfully.
pub fn speak(text: &str, command: &str) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Cannot speak empty text");
    }
    let status = Command::new(command)
        .arg(text)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run TTS command `{command}`"))?;
    if !status.success() {
        anyhow::bail!("TTS command `{command}` exited with {status}");
    }
    Ok(())
}
