//! Manages the primary WebSocket connection lifecycle for an agent session.

use super::{
    accumulator::AudioAccumulator,
    conversation::Conversation,
    cycle::{TurnOutcome, run_text_turn},
    protocol::{InboundKind, ServerMessage, classify_text},
    voice::{LatencyObserver, TracingLatencyObserver, run_audio_turn},
};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use cadence_core::{agent::AgentRef, speech::SpeechPipeline, workflow::WorkflowEngine};
use chrono::{DateTime, Utc};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, Stream},
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Destination for outbound frames. An error means the client is gone.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: ServerMessage) -> Result<()>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_frame(&mut self, frame: ServerMessage) -> Result<()> {
        send_msg(self, frame).await
    }
}

/// The collaborators and limits every session on this server shares.
#[derive(Clone)]
pub struct SessionContext {
    pub workflow: Arc<dyn WorkflowEngine>,
    pub speech: Arc<dyn SpeechPipeline>,
    pub default_agent: AgentRef,
    pub max_utterance_bytes: usize,
}

impl SessionContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            workflow: state.workflow.clone(),
            speech: state.speech.clone(),
            default_agent: state.agents.default_agent().clone(),
            max_utterance_bytes: state.config.max_utterance_bytes,
        }
    }
}

/// Lifecycle phases of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    AwaitingFrame,
    Processing,
    Closed,
}

/// Everything one connection owns. Never shared across connections.
pub struct Session {
    phase: Phase,
    conversation: Conversation,
    audio: AudioAccumulator,
    utterance_overflowed: bool,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(default_agent: AgentRef) -> Self {
        Self {
            phase: Phase::Open,
            conversation: Conversation::new(default_agent),
            audio: AudioAccumulator::new(),
            utterance_overflowed: false,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn buffered_audio(&self) -> usize {
        self.audio.len()
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "Session phase change");
            self.phase = next;
        }
    }

    /// Applies one classified frame. Returns the phase to continue in.
    async fn process<W: FrameSink>(
        &mut self,
        ctx: &SessionContext,
        kind: InboundKind,
        sink: &mut W,
        observer: &mut dyn LatencyObserver,
    ) -> Phase {
        self.transition(Phase::Processing);
        let outcome = match kind {
            InboundKind::Sync {
                inputs,
                reset_agent,
            } => {
                self.conversation.replace_history(inputs);
                if reset_agent {
                    self.conversation.reset_agent();
                    self.discard_utterance();
                    self.utterance_overflowed = false;
                }
                None
            }
            InboundKind::NewText(text) => Some(
                run_text_turn(ctx.workflow.as_ref(), &mut self.conversation, text, sink).await,
            ),
            InboundKind::AudioChunk(chunk) => {
                if !self.buffer_chunk(ctx, chunk, sink).await {
                    return Phase::Closed;
                }
                None
            }
            InboundKind::AudioComplete => {
                if self.utterance_overflowed {
                    self.utterance_overflowed = false;
                    let frame = ServerMessage::TurnError {
                        message: format!(
                            "Utterance exceeded the {} byte limit and was discarded",
                            ctx.max_utterance_bytes
                        ),
                    };
                    if sink.send_frame(frame).await.is_err() {
                        return Phase::Closed;
                    }
                    None
                } else {
                    let utterance = self.audio.drain_and_reset();
                    Some(
                        run_audio_turn(
                            ctx.workflow.as_ref(),
                            ctx.speech.as_ref(),
                            &mut self.conversation,
                            utterance,
                            sink,
                            observer,
                        )
                        .await,
                    )
                }
            }
            InboundKind::Invalid(reason) => {
                warn!(%reason, "Dropping malformed frame");
                None
            }
        };

        match outcome {
            Some(TurnOutcome::Disconnected) => Phase::Closed,
            _ => Phase::AwaitingFrame,
        }
    }

    /// Appends a chunk unless it would exceed the utterance bound. Returns
    /// false if the client could not be told about an overflow.
    async fn buffer_chunk<W: FrameSink>(
        &mut self,
        ctx: &SessionContext,
        chunk: bytes::Bytes,
        sink: &mut W,
    ) -> bool {
        if self.utterance_overflowed {
            debug!(bytes = chunk.len(), "Dropping chunk of an overflowed utterance");
            return true;
        }
        if self.audio.len() + chunk.len() > ctx.max_utterance_bytes {
            warn!(
                buffered = self.audio.len(),
                limit = ctx.max_utterance_bytes,
                "Utterance too long; discarding it"
            );
            self.discard_utterance();
            self.utterance_overflowed = true;
            let frame = ServerMessage::Error {
                message: format!(
                    "Utterance exceeds the {} byte limit",
                    ctx.max_utterance_bytes
                ),
            };
            return sink.send_frame(frame).await.is_ok();
        }
        self.audio.append(chunk);
        true
    }

    fn discard_utterance(&mut self) {
        let dropped = self.audio.drain_and_reset();
        if !dropped.is_empty() {
            debug!(bytes = dropped.len(), "Discarded buffered audio");
        }
    }
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", &session_id.to_string());
    info!("New WebSocket connection.");

    let (mut socket_tx, socket_rx) = socket.split();
    let ctx = SessionContext::from_state(&state);

    match run_session(&ctx, socket_rx, &mut socket_tx).await {
        Ok(session) => {
            let elapsed = Utc::now() - session.created_at;
            info!(
                history = session.conversation().history().len(),
                duration_s = elapsed.num_seconds(),
                "Session closed."
            );
        }
        Err(e) => error!(error = ?e, "Session terminated with error."),
    }
    let _ = socket_tx.close().await;
}

/// The per-connection dispatch loop.
///
/// Frames are processed strictly in arrival order, and the next frame is
/// not read until the current turn's output has been fully sent or has
/// failed. Returns the finished session once the client disconnects.
pub async fn run_session<R, W>(
    ctx: &SessionContext,
    mut inbound: R,
    outbound: &mut W,
) -> Result<Session>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    W: FrameSink,
{
    let mut session = Session::new(ctx.default_agent.clone());
    let mut observer = TracingLatencyObserver;
    session.transition(Phase::AwaitingFrame);

    while session.phase != Phase::Closed {
        let kind = match inbound.next().await {
            None => {
                info!("Client disconnected.");
                break;
            }
            Some(Err(e)) => {
                warn!(error = ?e, "Error receiving from client WebSocket.");
                break;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close frame.");
                break;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Text(text))) => classify_text(text.as_str()),
            Some(Ok(Message::Binary(data))) => InboundKind::AudioChunk(data),
        };
        let next = session.process(ctx, kind, outbound, &mut observer).await;
        session.transition(next);
    }

    session.transition(Phase::Closed);
    Ok(session)
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
