/*
 * @file audio.rs
 * @brief Microphone capture and Whisper transcription
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

//! Voice input: microphone capture, WAV helpers, and local Whisper transcription.
//!
//! Compiled only with the `voice` feature.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, StreamError};
use hound::{WavSpec, WavWriter};
use tracing::{debug, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Capture rate in Hz; Whisper models are trained on 16 kHz audio.
const SAMPLE_RATE: u32 = 16000;

const CHANNELS: u16 = 1;

/// PCM width of the temporary WAV file.
const BITS_PER_SAMPLE: u16 = 16;

/// Length of the capture window for one utterance.
///
/// Nothing heard inside the window counts as "no input captured".
const RECORD_DURATION: Duration = Duration::from_secs(7);

/// Recordings whose RMS amplitude stays below this count as silence and are
/// never sent to Whisper.
const SILENCE_RMS_THRESHOLD: f32 = 150.0;

/// Temporary WAV file handed to Whisper.
const TEMP_AUDIO_PATH: &str = "sparql_input.wav";

/// Whisper model path (downloaded on first use).
const WHISPER_MODEL_PATH: &str = "models/ggml-base.en.bin";

const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin";

/// Speech-to-text front end used by the shell in voice mode.
///
/// # Details
/// Holds the Whisper context across iterations; it is created lazily on the
/// first utterance because loading the model takes a few seconds.
pub struct VoiceListener {
    whisper: Option<WhisperContext>,
    temp_path: PathBuf,
}

impl Default for VoiceListener {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceListener {
    pub fn new() -> Self {
        Self {
            whisper: None,
            temp_path: PathBuf::from(TEMP_AUDIO_PATH),
        }
    }

    /// Records one utterance and returns its transcription.
    ///
    /// # Details
    /// Every recoverable failure (no microphone, silence, WAV or Whisper
    /// errors) is logged and reported as `None` so the shell simply listens
    /// again.
    ///
    /// # Returns
    /// * `Some(String)` - Non-empty transcribed text.
    /// * `None` - No input was captured.
    pub fn listen(&mut self) -> Option<String> {
        println!("Listening... (speak now)");
        let samples = match record_audio() {
            Ok(samples) => samples,
            Err(err) => {
                warn!(error = %err, "microphone error");
                return None;
            }
        };
        if !contains_speech(&samples) {
            println!("Listening timed out... please speak sooner.");
            return None;
        }
        println!("Recognizing...");
        let temp_path = self.temp_path.clone();
        let _guard = TempAudioGuard::new(&temp_path);
        if let Err(err) = save_wav(&temp_path, &samples) {
            warn!(error = %err, "could not write temporary WAV");
            return None;
        }
        let text = self.transcribe_file()?;
        if text.is_empty() {
            println!("Speech Recognition could not understand audio");
            return None;
        }
        println!("You said: {text}");
        Some(text)
    }

    fn transcribe_file(&mut self) -> Option<String> {
        if self.whisper.is_none() {
            match init_whisper() {
                Ok(ctx) => self.whisper = Some(ctx),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "whisper init error");
                    return None;
                }
            }
        }
        let ctx = self.whisper.as_ref()?;
        let audio = match load_audio_for_whisper(&self.temp_path) {
            Ok(audio) => audio,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "audio load error");
                return None;
            }
        };
        match run_whisper(ctx, &audio) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "whisper transcription error");
                None
            }
        }
    }
}

/// Captures one [`RECORD_DURATION`] window from the default microphone.
///
/// # Returns
/// The window as mono 16-bit PCM at [`SAMPLE_RATE`].
///
/// # Errors
/// Returns an error if no input device is available or the stream cannot
/// be created or started.
pub fn record_audio() -> Result<Vec<i16>> {
    let device = default_input_device()?;
    let config = input_config();
    let samples = shared_samples();
    let stream = build_input_stream(&device, &config, samples.clone())?;
    stream.play()?;
    std::thread::sleep(RECORD_DURATION);
    drop(stream);
    let guard = samples
        .lock()
        .map_err(|_| anyhow::anyhow!("sample buffer poisoned"))?;
    Ok(guard.clone())
}

/// Saves audio samples to a mono 16 kHz WAV file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn save_wav(path: &Path, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Detects whether samples carry enough energy to be speech.
///
/// # Returns
/// `true` when the RMS energy reaches [`SILENCE_RMS_THRESHOLD`].
pub fn contains_speech(samples: &[i16]) -> bool {
    if samples.is_empty() {
        return false;
    }
    let energy = samples
        .iter()
        .map(|sample| (*sample as f32).powi(2))
        .sum::<f32>()
        / samples.len() as f32;
    energy.sqrt() >= SILENCE_RMS_THRESHOLD
}

fn default_input_device() -> Result<Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No input device"))
}

fn input_config() -> StreamConfig {
    StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn shared_samples() -> Arc<Mutex<Vec<i16>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    samples: Arc<Mutex<Vec<i16>>>,
) -> Result<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &_| push_samples(&samples, data),
            log_stream_error,
            None,
        )
        .map_err(|err| anyhow::anyhow!(err))
}

/// CPAL callback body: scales `[-1.0, 1.0]` floats to `i16` and buffers them.
fn push_samples(buffer: &Arc<Mutex<Vec<i16>>>, data: &[f32]) {
    if let Ok(mut guard) = buffer.lock() {
        guard.extend(data.iter().map(|&s| (s * i16::MAX as f32) as i16));
    }
}

fn log_stream_error(error: StreamError) {
    warn!(%error, "audio stream error");
}

/// Loads the Whisper model, downloading it with `curl` the first time.
fn init_whisper() -> Result<WhisperContext> {
    fs::create_dir_all("models")?;
    if !Path::new(WHISPER_MODEL_PATH).exists() {
        println!("Downloading Whisper model (this may take a few minutes)...");
        let output = Command::new("curl")
            .args(["-L", "-o", WHISPER_MODEL_PATH, WHISPER_MODEL_URL])
            .output()
            .context("Failed to execute curl")?;
        if !output.status.success() {
            anyhow::bail!("Failed to download Whisper model");
        }
    }
    let mut params = WhisperContextParameters::default();
    params.use_gpu(false);
    WhisperContext::new_with_params(WHISPER_MODEL_PATH, params)
        .context("Failed to initialize Whisper")
}

fn run_whisper(ctx: &WhisperContext, audio: &[f32]) -> Result<String> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some("en"));
    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    let mut state = ctx.create_state().context("Failed to create Whisper state")?;
    state.full(params, audio).context("Whisper inference failed")?;
    let segments = state.full_n_segments().unwrap_or(0);
    let mut text = String::new();
    for i in 0..segments {
        if let Ok(segment) = state.full_get_segment_text(i) {
            text.push_str(&segment);
            text.push(' ');
        }
    }
    debug!(segments, "whisper transcription done");
    Ok(text.trim().to_string())
}

/// Reads a WAV file as 16 kHz mono `f32` samples in [-1.0, 1.0].
fn load_audio_for_whisper(path: &Path) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read WAV samples")?;
    let normalized: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
    let mono = downmix(normalized, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Averages interleaved stereo frames into mono; other layouts pass through.
fn downmix(audio: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels == 2 {
        audio
            .chunks(2)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        audio
    }
}

/// Linear-interpolation resampler; good enough for speech recognition.
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = from_rate as f32 / to_rate as f32;
    let output_len = (input.len() as f32 / ratio) as usize;
    (0..output_len)
        .map(|i| sample_at(input, i as f32 * ratio))
        .collect()
}

fn sample_at(input: &[f32], pos: f32) -> f32 {
    let idx = pos as usize;
    if idx + 1 < input.len() {
        let frac = pos - idx as f32;
        input[idx] * (1.0 - frac) + input[idx + 1] * frac
    } else {
        input.get(idx).copied().unwrap_or(0.0)
    }
}

/// Removes the temporary WAV file when dropped, even on early returns.
struct TempAudioGuard<'a> {
    path: &'a Path,
}

impl<'a> TempAudioGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl Drop for TempAudioGuard<'_> {
    fn drop(&mut self) {
        fs::remove_file(self.path).ok();
    }
}
