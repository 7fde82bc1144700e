//! Drives a finished utterance through the speech pipeline and the workflow.
//!
//! The utterance is transcribed, the transcript runs through the same
//! workflow path as a typed message (one shared history), and the reply is
//! synthesized sentence by sentence as its text streams in. Only audio
//! frames reach the client.

use super::{
    conversation::Conversation,
    cycle::{DeltaSink, TurnError, TurnOutcome, finish_turn, stream_workflow},
    protocol::ServerMessage,
    session::FrameSink,
};
use crate::audio_utils;
use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::{speech::SpeechPipeline, workflow::WorkflowEngine};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Side channel for latency diagnostics.
pub trait LatencyObserver: Send {
    /// Called at most once per audio turn, when its first frame is sent.
    fn first_audio(&mut self, elapsed: Duration);
}

/// Logs time-to-first-audio through `tracing`.
#[derive(Debug, Default)]
pub struct TracingLatencyObserver;

impl LatencyObserver for TracingLatencyObserver {
    fn first_audio(&mut self, elapsed: Duration) {
        info!(elapsed_ms = elapsed.as_millis() as u64, "Time to first audio frame");
    }
}

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &["mr", "mrs", "ms", "dr", "st", "vs", "etc", "e.g", "i.e"];

/// Byte offset just past the first sentence terminator in `text`.
///
/// `.`, `!` and `?` only end a sentence once whitespace follows, so a
/// terminator at the end of a partial buffer waits for more text. This keeps
/// decimals like `3.50` in one piece.
fn sentence_end(text: &str) -> Option<usize> {
    text.char_indices().find_map(|(i, c)| {
        let end = i + c.len_utf8();
        let boundary = match c {
            '\n' | '。' => true,
            '.' => followed_by_space(text, end) && !ends_with_abbreviation(&text[..i]),
            '!' | '?' | '؟' => followed_by_space(text, end),
            _ => false,
        };
        boundary.then_some(end)
    })
}

fn followed_by_space(text: &str, at: usize) -> bool {
    text[at..].chars().next().is_some_and(char::is_whitespace)
}

/// True if the word before a period is an abbreviation or a single initial.
fn ends_with_abbreviation(before: &str) -> bool {
    let word = before
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    let mut chars = word.chars();
    let single_letter = chars.next().is_some_and(char::is_alphabetic) && chars.next().is_none();
    single_letter || ABBREVIATIONS.iter().any(|a| word.eq_ignore_ascii_case(a))
}

/// Buffers text deltas into sentences and speaks each one as it completes.
struct SpokenDeltas<'a, W: FrameSink> {
    speech: &'a dyn SpeechPipeline,
    sink: &'a mut W,
    observer: &'a mut dyn LatencyObserver,
    started: Instant,
    first_sent: bool,
    pending: String,
}

impl<W: FrameSink> SpokenDeltas<'_, W> {
    async fn speak(&mut self, sentence: String) -> Result<(), TurnError> {
        if sentence.trim().is_empty() {
            return Ok(());
        }
        let mut frames = self.speech.synthesize(sentence).await?;
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            if !self.first_sent {
                self.first_sent = true;
                self.observer.first_audio(self.started.elapsed());
            }
            self.sink
                .send_frame(ServerMessage::audio(&frame))
                .await
                .map_err(|_| TurnError::Disconnected)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<W: FrameSink> DeltaSink for SpokenDeltas<'_, W> {
    async fn delta(&mut self, delta: String) -> Result<(), TurnError> {
        self.pending.push_str(&delta);
        while let Some(end) = sentence_end(&self.pending) {
            let sentence: String = self.pending.drain(..end).collect();
            self.speak(sentence).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TurnError> {
        let rest = std::mem::take(&mut self.pending);
        self.speak(rest).await
    }
}

/// Handles an `audio_complete` frame end to end, including the terminal
/// marker. An empty utterance or transcript completes without running the
/// workflow.
pub async fn run_audio_turn<W: FrameSink>(
    engine: &dyn WorkflowEngine,
    speech: &dyn SpeechPipeline,
    conversation: &mut Conversation,
    utterance: Bytes,
    sink: &mut W,
    observer: &mut dyn LatencyObserver,
) -> TurnOutcome {
    let started = Instant::now();
    if utterance.is_empty() {
        debug!("Empty utterance; nothing to transcribe");
        return finish_turn(conversation, sink, Ok(())).await;
    }
    debug!(
        bytes = utterance.len(),
        duration_ms = audio_utils::pcm16_duration_ms(utterance.len()),
        "Transcribing utterance"
    );

    let transcript = match speech.transcribe(utterance).await {
        Ok(text) => text,
        Err(e) => return finish_turn(conversation, sink, Err(e.into())).await,
    };
    if transcript.trim().is_empty() {
        debug!("Transcript was empty; skipping workflow");
        return finish_turn(conversation, sink, Ok(())).await;
    }

    let result = {
        let mut spoken = SpokenDeltas {
            speech,
            sink: &mut *sink,
            observer,
            started,
            first_sent: false,
            pending: String::new(),
        };
        stream_workflow(engine, conversation, transcript, &mut spoken).await
    };
    finish_turn(conversation, sink, result).await
}
