//! Speech Pipeline
//!
//! The speech pipeline turns a finished utterance into text and synthesized
//! replies back into audio. Settings such as locale instructions, voice, the
//! TTS model override and the output chunk size are fixed at construction
//! time; callers never choose them per request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use tracing::debug;

/// PCM16 sample rate used on both sides of the pipeline.
pub const PCM16_SAMPLE_RATE: u32 = 24_000;

/// A lazy, finite stream of synthesized PCM16 audio frames.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Static configuration for a speech pipeline.
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub stt_model: String,
    /// Forces a specific TTS model regardless of provider defaults.
    pub tts_model: String,
    pub voice: String,
    /// Locale and tone instructions passed to every synthesis call.
    pub instructions: String,
    /// Size in bytes of each emitted audio frame. Must be non-zero.
    pub chunk_size: usize,
    pub sample_rate: u32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            stt_model: "gpt-4o-transcribe".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            voice: "ash".to_string(),
            instructions: "Speak clearly in a friendly, professional tone.".to_string(),
            chunk_size: 512,
            sample_rate: PCM16_SAMPLE_RATE,
        }
    }
}

/// Speech recognition and synthesis.
#[async_trait]
pub trait SpeechPipeline: Send + Sync {
    /// Transcribes a raw PCM16 mono utterance.
    async fn transcribe(&self, pcm16: Bytes) -> Result<String>;

    /// Synthesizes `text` into frames of the configured chunk size.
    async fn synthesize(&self, text: String) -> Result<AudioStream>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// A `SpeechPipeline` backed by the OpenAI audio endpoints.
pub struct OpenAISpeechPipeline {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    settings: SpeechSettings,
}

impl OpenAISpeechPipeline {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        settings: SpeechSettings,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            settings,
        }
    }
}

#[async_trait]
impl SpeechPipeline for OpenAISpeechPipeline {
    async fn transcribe(&self, pcm16: Bytes) -> Result<String> {
        let wav = pcm16_to_wav(&pcm16, self.settings.sample_rate);
        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.settings.stt_model.clone())
            .part("file", file);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach transcription endpoint")?
            .error_for_status()?;
        let body: TranscriptionResponse = response.json().await?;
        debug!(chars = body.text.len(), "Utterance transcribed");
        Ok(body.text)
    }

    async fn synthesize(&self, text: String) -> Result<AudioStream> {
        let body = serde_json::json!({
            "model": self.settings.tts_model,
            "voice": self.settings.voice,
            "input": text,
            "instructions": self.settings.instructions,
            "response_format": "pcm",
        });
        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach speech endpoint")?
            .error_for_status()?;

        let frames = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from));
        Ok(rechunk(frames, self.settings.chunk_size))
    }
}

/// Re-slices a byte stream into frames of exactly `chunk_size` bytes; only
/// the final frame may be shorter. An error ends the stream after it is
/// yielded and discards any partial frame.
pub fn rechunk<S>(inner: S, chunk_size: usize) -> AudioStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    Box::pin(futures::stream::unfold(
        (Box::pin(inner), BytesMut::new(), false),
        move |(mut inner, mut buf, mut done)| async move {
            loop {
                if buf.len() >= chunk_size {
                    let frame = buf.split_to(chunk_size).freeze();
                    return Some((Ok(frame), (inner, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let frame = buf.split().freeze();
                    return Some((Ok(frame), (inner, buf, done)));
                }
                match inner.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(e), (inner, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    ))
}

/// Wraps little-endian PCM16 mono samples in a minimal WAV container.
pub fn pcm16_to_wav(pcm16: &[u8], sample_rate: u32) -> Vec<u8> {
    let data_len = pcm16.len() as u32;
    let byte_rate = sample_rate * 2;
    let mut wav = Vec::with_capacity(44 + pcm16.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm16);
    wav
}
