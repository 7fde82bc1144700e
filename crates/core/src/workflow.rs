use crate::{
    agent::{AgentCatalog, AgentProfile, AgentRef},
    history::{TurnContent, TurnItem},
};
use anyhow::{Context, Result, anyhow, bail};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, CreateChatCompletionRequestArgs,
        FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::{pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Represents the events yielded by a running workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// A partial fragment of the agent's reply.
    TextDelta(String),
    /// A complete item to append to the history.
    Item(TurnItem),
    /// The engine switched the active agent.
    Handoff(AgentRef),
}

/// A lazy, single-pass stream of workflow events.
pub type WorkflowStream = Pin<Box<dyn Stream<Item = Result<WorkflowEvent>> + Send>>;

/// The conversational workflow engine.
///
/// Engines are stateless per call: everything they need travels in the
/// arguments. The history snapshot already ends with the new user input.
/// A failing run yields an `Err` item rather than ending early.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn run(&self, history: Vec<TurnItem>, agent: AgentRef) -> Result<WorkflowStream>;
}

/// A `WorkflowEngine` backed by streamed chat completions on any
/// OpenAI-compatible API. Handoffs are offered to the model as
/// `transfer_to_<agent>` tools.
#[derive(Clone)]
pub struct OpenAIWorkflowEngine {
    client: Client<OpenAIConfig>,
    model: String,
    catalog: Arc<AgentCatalog>,
    max_handoffs: usize,
}

impl OpenAIWorkflowEngine {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    /// * `catalog` - The agents the engine may run and hand off between.
    /// * `max_handoffs` - How many handoffs a single turn may perform.
    pub fn new(
        config: OpenAIConfig,
        model: String,
        catalog: Arc<AgentCatalog>,
        max_handoffs: usize,
    ) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            catalog,
            max_handoffs,
        }
    }

    async fn drive(
        &self,
        mut history: Vec<TurnItem>,
        mut agent: AgentRef,
        tx: &mpsc::Sender<Result<WorkflowEvent>>,
    ) -> Result<()> {
        let mut handoffs = 0;
        loop {
            let profile = self
                .catalog
                .get(&agent)
                .with_context(|| format!("Unknown agent '{}'", agent))?;

            let mut args = CreateChatCompletionRequestArgs::default();
            args.model(&self.model)
                .messages(request_messages(profile, &history)?)
                .stream(true);
            let tools = handoff_tools(&self.catalog, &agent)?;
            if !tools.is_empty() {
                args.tools(tools);
            }
            let request = args.build()?;

            let mut stream = self.client.chat().create_stream(request).await?;
            let mut reply = String::new();
            let mut tool_names: Vec<String> = Vec::new();

            while let Some(result) = stream.next().await {
                let response = result?;
                for choice in response.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            reply.push_str(&content);
                            if tx.send(Ok(WorkflowEvent::TextDelta(content))).await.is_err() {
                                debug!("Workflow consumer went away mid-stream.");
                                return Ok(());
                            }
                        }
                    }
                    for call in choice.delta.tool_calls.unwrap_or_default() {
                        if let Some(name) = call.function.and_then(|f| f.name) {
                            tool_names.push(name);
                        }
                    }
                }
            }

            if !reply.is_empty() {
                let item = TurnItem::agent(reply, agent.clone());
                history.push(item.clone());
                if tx.send(Ok(WorkflowEvent::Item(item))).await.is_err() {
                    return Ok(());
                }
            }

            let Some(next) = tool_names
                .iter()
                .find_map(|name| self.catalog.resolve_handoff(name))
                .cloned()
            else {
                return Ok(());
            };
            if handoffs == self.max_handoffs {
                bail!(
                    "Turn exceeded the maximum of {} agent handoffs",
                    self.max_handoffs
                );
            }
            handoffs += 1;

            info!(from = %agent, to = %next, handoffs, "Agent handoff");
            let item = TurnItem::handoff(&agent, &next);
            history.push(item.clone());
            if tx.send(Ok(WorkflowEvent::Item(item))).await.is_err()
                || tx.send(Ok(WorkflowEvent::Handoff(next.clone()))).await.is_err()
            {
                return Ok(());
            }
            agent = next;
        }
    }
}

#[async_trait]
impl WorkflowEngine for OpenAIWorkflowEngine {
    async fn run(&self, history: Vec<TurnItem>, agent: AgentRef) -> Result<WorkflowStream> {
        if self.catalog.get(&agent).is_none() {
            return Err(anyhow!("Unknown agent '{}'", agent));
        }
        let (tx, rx) = mpsc::channel(64);
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drive(history, agent, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Builds the chat request for `profile`: its instructions, then the history.
pub fn request_messages(
    profile: &AgentProfile,
    history: &[TurnItem],
) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(profile.instructions.clone())
            .build()?
            .into(),
    ];
    for item in history {
        let text = match item.content() {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Event(event) => format!("Event: {}", event),
        };
        let message: ChatCompletionRequestMessage = match item {
            TurnItem::User { .. } => ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()?
                .into(),
            TurnItem::Agent { .. } => ChatCompletionRequestAssistantMessageArgs::default()
                .content(text)
                .build()?
                .into(),
            TurnItem::System { .. } => ChatCompletionRequestSystemMessageArgs::default()
                .content(text)
                .build()?
                .into(),
        };
        messages.push(message);
    }
    Ok(messages)
}

/// One parameterless tool per agent that `from` may hand off to.
pub fn handoff_tools(catalog: &AgentCatalog, from: &AgentRef) -> Result<Vec<ChatCompletionTool>> {
    catalog
        .handoff_targets(from)
        .map(|profile| {
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(profile.handoff_tool_name())
                        .description(profile.description.clone())
                        .parameters(serde_json::json!({
                            "type": "object",
                            "properties": {},
                            "additionalProperties": false,
                        }))
                        .build()?,
                )
                .build()?)
        })
        .collect()
}
