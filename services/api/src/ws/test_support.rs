//! Test doubles shared by the WebSocket session tests.

use super::{protocol::ServerMessage, session::FrameSink};
use anyhow::{Result, anyhow};
use async_trait::async_trait;

/// Records outbound frames; optionally starts failing after `limit` sends to
/// simulate a client that disconnects mid-turn.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Vec<ServerMessage>,
    limit: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn frames(&self) -> Vec<ServerMessage> {
        self.frames.clone()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&mut self, frame: ServerMessage) -> Result<()> {
        if self.limit.is_some_and(|limit| self.frames.len() >= limit) {
            return Err(anyhow!("connection closed"));
        }
        self.frames.push(frame);
        Ok(())
    }
}
