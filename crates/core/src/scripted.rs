//! Deterministic stand-ins for the workflow engine and the speech pipeline.
//!
//! Compiled for tests and behind the `test-util` feature, so downstream
//! crates can drive sessions without network access.

use crate::{
    agent::AgentRef,
    history::TurnItem,
    speech::{AudioStream, SpeechPipeline, rechunk},
    workflow::{WorkflowEngine, WorkflowEvent, WorkflowStream},
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::VecDeque, sync::Mutex};

/// A scripted `WorkflowEngine`.
///
/// Each call to `run` pops the next scripted turn. When the script is
/// exhausted the engine echoes the last user message back, word by word.
/// Every call is recorded so tests can inspect what the engine was given.
#[derive(Default)]
pub struct ScriptedWorkflow {
    turns: Mutex<VecDeque<Vec<Result<WorkflowEvent, String>>>>,
    calls: Mutex<Vec<(Vec<TurnItem>, AgentRef)>>,
}

impl ScriptedWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a turn that streams `reply` as word deltas, then commits it.
    pub fn with_reply(self, agent: &AgentRef, reply: &str) -> Self {
        let mut events: Vec<Result<WorkflowEvent, String>> = split_deltas(reply)
            .into_iter()
            .map(|d| Ok(WorkflowEvent::TextDelta(d)))
            .collect();
        events.push(Ok(WorkflowEvent::Item(TurnItem::agent(reply, agent.clone()))));
        self.with_turn(events)
    }

    /// Queues an arbitrary turn. `Err` entries surface as stream failures.
    pub fn with_turn(self, events: Vec<Result<WorkflowEvent, String>>) -> Self {
        if let Ok(mut turns) = self.turns.lock() {
            turns.push_back(events);
        }
        self
    }

    /// The `(history, agent)` arguments of every `run` call so far.
    pub fn calls(&self) -> Vec<(Vec<TurnItem>, AgentRef)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

fn split_deltas(reply: &str) -> Vec<String> {
    reply.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl WorkflowEngine for ScriptedWorkflow {
    async fn run(&self, history: Vec<TurnItem>, agent: AgentRef) -> Result<WorkflowStream> {
        let scripted = self
            .turns
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .pop_front();
        let events = match scripted {
            Some(events) => events,
            None => {
                let echo = history
                    .iter()
                    .rev()
                    .find_map(|item| match item {
                        TurnItem::User { content } => content.as_text().map(str::to_string),
                        _ => None,
                    })
                    .unwrap_or_default();
                let mut events: Vec<Result<WorkflowEvent, String>> = split_deltas(&echo)
                    .into_iter()
                    .map(|d| Ok(WorkflowEvent::TextDelta(d)))
                    .collect();
                events.push(Ok(WorkflowEvent::Item(TurnItem::agent(echo, agent.clone()))));
                events
            }
        };
        self.calls
            .lock()
            .map_err(|_| anyhow!("call log lock poisoned"))?
            .push((history, agent));

        Ok(Box::pin(futures::stream::iter(
            events.into_iter().map(|e| e.map_err(|message| anyhow!(message))),
        )))
    }
}

/// A scripted `SpeechPipeline`.
///
/// Transcription returns a fixed transcript; synthesis "speaks" the UTF-8
/// bytes of the text, split into frames of the configured chunk size.
pub struct ScriptedSpeech {
    transcript: String,
    chunk_size: usize,
    fail_synthesis: bool,
    heard: Mutex<Vec<Bytes>>,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedSpeech {
    pub fn new(transcript: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            transcript: transcript.into(),
            chunk_size,
            fail_synthesis: false,
            heard: Mutex::new(Vec::new()),
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Makes every synthesized stream end in an error, dropping any partial frame.
    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    /// Every utterance passed to `transcribe`, in call order.
    pub fn heard(&self) -> Vec<Bytes> {
        self.heard.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Every text passed to `synthesize`, in call order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechPipeline for ScriptedSpeech {
    async fn transcribe(&self, pcm16: Bytes) -> Result<String> {
        self.heard
            .lock()
            .map_err(|_| anyhow!("lock poisoned"))?
            .push(pcm16);
        Ok(self.transcript.clone())
    }

    async fn synthesize(&self, text: String) -> Result<AudioStream> {
        self.spoken
            .lock()
            .map_err(|_| anyhow!("lock poisoned"))?
            .push(text.clone());
        let mut items: Vec<Result<Bytes>> = vec![Ok(Bytes::from(text.into_bytes()))];
        if self.fail_synthesis {
            items.push(Err(anyhow!("synthesis failed")));
        }
        Ok(rechunk(futures::stream::iter(items), self.chunk_size))
    }
}
