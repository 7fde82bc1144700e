//! Conversation history items.
//!
//! History is an append-only list of `TurnItem`s replayed into the workflow
//! engine on every turn. The same representation travels over the wire in
//! `sync` and `history_updated` frames.

use crate::agent::AgentRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The body of a history item: plain text or a structured event
/// (tool call, handoff, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Event(Value),
}

impl TurnContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TurnContent::Text(text) => Some(text),
            TurnContent::Event(_) => None,
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnItem {
    User {
        content: TurnContent,
    },
    #[serde(alias = "assistant")]
    Agent {
        content: TurnContent,
        /// The agent that produced this item. Items synced from a client
        /// may omit it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<AgentRef>,
    },
    System {
        content: TurnContent,
    },
}

impl TurnItem {
    pub fn user(text: impl Into<String>) -> Self {
        TurnItem::User {
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn agent(text: impl Into<String>, agent: AgentRef) -> Self {
        TurnItem::Agent {
            content: TurnContent::Text(text.into()),
            agent: Some(agent),
        }
    }

    /// The event recorded when the active agent changes mid-turn.
    pub fn handoff(from: &AgentRef, to: &AgentRef) -> Self {
        TurnItem::System {
            content: TurnContent::Event(serde_json::json!({
                "type": "handoff",
                "from": from,
                "to": to,
            })),
        }
    }

    pub fn content(&self) -> &TurnContent {
        match self {
            TurnItem::User { content }
            | TurnItem::Agent { content, .. }
            | TurnItem::System { content } => content,
        }
    }
}
