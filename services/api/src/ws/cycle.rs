//! Contains the logic for a single text turn: run the workflow, keep the
//! history in step with it, and stream the reply back to the client.

use super::{conversation::Conversation, protocol::ServerMessage, session::FrameSink};
use async_trait::async_trait;
use cadence_core::workflow::{WorkflowEngine, WorkflowEvent};
use futures_util::StreamExt;
use tracing::{debug, warn};

/// Why a turn stopped before completing.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The client went away; nothing more can be delivered.
    #[error("client disconnected")]
    Disconnected,
    /// The workflow engine or speech pipeline failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// How a triggered turn ended, from the session loop's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    Disconnected,
}

/// Receives the text deltas of a running workflow.
#[async_trait]
pub trait DeltaSink: Send {
    async fn delta(&mut self, delta: String) -> Result<(), TurnError>;

    /// Called once after the workflow stream is exhausted.
    async fn finish(&mut self) -> Result<(), TurnError> {
        Ok(())
    }
}

/// Forwards deltas to the client as `text_delta` frames, unbuffered.
struct TextDeltas<'a, W: FrameSink> {
    sink: &'a mut W,
}

#[async_trait]
impl<W: FrameSink> DeltaSink for TextDeltas<'_, W> {
    async fn delta(&mut self, delta: String) -> Result<(), TurnError> {
        self.sink
            .send_frame(ServerMessage::TextDelta { delta })
            .await
            .map_err(|_| TurnError::Disconnected)
    }
}

/// Runs the workflow for one user input.
///
/// Every event is applied to the conversation as soon as it is observed, so
/// items that completed before a failure or a disconnect stay in history.
/// Text deltas are partial and only reach `deltas`; the engine commits the
/// finished reply as an item.
pub async fn stream_workflow<D: DeltaSink>(
    engine: &dyn WorkflowEngine,
    conversation: &mut Conversation,
    input: String,
    deltas: &mut D,
) -> Result<(), TurnError> {
    let (history, agent) = conversation.record_user_turn(input);
    debug!(history = history.len(), agent = %agent, "Starting workflow run");
    let mut stream = engine.run(history, agent).await?;

    while let Some(event) = stream.next().await {
        match event? {
            WorkflowEvent::TextDelta(delta) => deltas.delta(delta).await?,
            WorkflowEvent::Item(item) => conversation.record_agent_output(vec![item], None),
            WorkflowEvent::Handoff(agent) => conversation.record_agent_output(vec![], Some(agent)),
        }
    }
    deltas.finish().await
}

/// Handles a `text` frame end to end, including the terminal marker.
pub async fn run_text_turn<W: FrameSink>(
    engine: &dyn WorkflowEngine,
    conversation: &mut Conversation,
    text: String,
    sink: &mut W,
) -> TurnOutcome {
    let result = {
        let mut deltas = TextDeltas { sink: &mut *sink };
        stream_workflow(engine, conversation, text, &mut deltas).await
    };
    finish_turn(conversation, sink, result).await
}

/// Sends the committed history followed by the turn's terminal marker.
pub async fn finish_turn<W: FrameSink>(
    conversation: &Conversation,
    sink: &mut W,
    result: Result<(), TurnError>,
) -> TurnOutcome {
    let (terminal, outcome) = match result {
        Ok(()) => (ServerMessage::TurnComplete, TurnOutcome::Completed),
        Err(TurnError::Disconnected) => return TurnOutcome::Disconnected,
        Err(TurnError::Collaborator(e)) => {
            warn!(error = ?e, "Turn failed");
            (
                ServerMessage::TurnError {
                    message: e.to_string(),
                },
                TurnOutcome::Failed,
            )
        }
    };

    let history = ServerMessage::HistoryUpdated {
        inputs: conversation.history().to_vec(),
    };
    if sink.send_frame(history).await.is_err() || sink.send_frame(terminal).await.is_err() {
        return TurnOutcome::Disconnected;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_support::RecordingSink;
    use cadence_core::{agent::AgentRef, history::TurnItem, scripted::ScriptedWorkflow};

    fn assistant() -> AgentRef {
        AgentRef::new("assistant")
    }

    #[tokio::test]
    async fn test_text_turn_streams_deltas_then_completes() {
        let engine = ScriptedWorkflow::new().with_reply(&assistant(), "Hello to you");
        let mut conversation = Conversation::new(assistant());
        let mut sink = RecordingSink::new();

        let outcome = run_text_turn(&engine, &mut conversation, "hello".into(), &mut sink).await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let frames = sink.frames();
        assert!(matches!(frames[0], ServerMessage::TextDelta { .. }));
        assert_eq!(frames.last(), Some(&ServerMessage::TurnComplete));
        assert_eq!(
            frames.iter().filter(|f| f.is_terminal()).count(),
            1,
            "exactly one terminal marker"
        );

        // Concatenated deltas equal the single committed agent item.
        let streamed: String = frames
            .iter()
            .filter_map(|f| match f {
                ServerMessage::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            conversation.history(),
            &[
                TurnItem::user("hello"),
                TurnItem::agent(streamed, assistant())
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_partial_history() {
        let engine = ScriptedWorkflow::new().with_turn(vec![
            Ok(WorkflowEvent::Item(TurnItem::agent("first part", assistant()))),
            Ok(WorkflowEvent::TextDelta("sec".to_string())),
            Err("upstream timeout".to_string()),
        ]);
        let mut conversation = Conversation::new(assistant());
        let mut sink = RecordingSink::new();

        let outcome = run_text_turn(&engine, &mut conversation, "go".into(), &mut sink).await;
        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(
            sink.frames().last(),
            Some(&ServerMessage::TurnError {
                message: "upstream timeout".to_string()
            })
        );
        assert_eq!(
            conversation.history(),
            &[TurnItem::user("go"), TurnItem::agent("first part", assistant())]
        );
    }

    #[tokio::test]
    async fn test_handoff_updates_active_agent() {
        let billing = AgentRef::new("billing");
        let engine = ScriptedWorkflow::new().with_turn(vec![
            Ok(WorkflowEvent::Item(TurnItem::handoff(&assistant(), &billing))),
            Ok(WorkflowEvent::Handoff(billing.clone())),
            Ok(WorkflowEvent::TextDelta("Billing here.".to_string())),
            Ok(WorkflowEvent::Item(TurnItem::agent("Billing here.", billing.clone()))),
        ]);
        let mut conversation = Conversation::new(assistant());
        let mut sink = RecordingSink::new();

        run_text_turn(&engine, &mut conversation, "invoice?".into(), &mut sink).await;
        assert_eq!(conversation.active_agent(), &billing);
        assert_eq!(conversation.history().len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_mid_turn_stops_delivery() {
        let engine = ScriptedWorkflow::new().with_turn(vec![
            Ok(WorkflowEvent::TextDelta("one ".to_string())),
            Ok(WorkflowEvent::TextDelta("two ".to_string())),
            Ok(WorkflowEvent::TextDelta("three".to_string())),
            Ok(WorkflowEvent::Item(TurnItem::agent("one two three", assistant()))),
        ]);
        let mut conversation = Conversation::new(assistant());
        let mut sink = RecordingSink::failing_after(1);

        let outcome = run_text_turn(&engine, &mut conversation, "count".into(), &mut sink).await;
        assert_eq!(outcome, TurnOutcome::Disconnected);
        assert_eq!(sink.frames().len(), 1);
        // The reply never completed, so no truncated agent item was committed.
        assert_eq!(conversation.history(), &[TurnItem::user("count")]);
    }
}
