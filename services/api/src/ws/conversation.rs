//! Per-connection conversation state: history and the active agent.

use cadence_core::{agent::AgentRef, history::TurnItem};
use tracing::{debug, info};

/// History and active agent of one connection.
///
/// Only the owning session loop mutates it. Items are appended in arrival
/// order and never rewritten, except by a client `sync`.
#[derive(Debug, Clone)]
pub struct Conversation {
    history: Vec<TurnItem>,
    active_agent: AgentRef,
    default_agent: AgentRef,
}

impl Conversation {
    pub fn new(default_agent: AgentRef) -> Self {
        Self {
            history: Vec::new(),
            active_agent: default_agent.clone(),
            default_agent,
        }
    }

    pub fn history(&self) -> &[TurnItem] {
        &self.history
    }

    pub fn active_agent(&self) -> &AgentRef {
        &self.active_agent
    }

    /// Overwrites the history with the client's copy.
    pub fn replace_history(&mut self, items: Vec<TurnItem>) {
        debug!(items = items.len(), "History replaced by client sync");
        self.history = items;
    }

    pub fn reset_agent(&mut self) {
        self.active_agent = self.default_agent.clone();
    }

    /// Records the user's input and returns the snapshot the workflow
    /// engine runs against.
    pub fn record_user_turn(&mut self, text: impl Into<String>) -> (Vec<TurnItem>, AgentRef) {
        self.history.push(TurnItem::user(text));
        (self.history.clone(), self.active_agent.clone())
    }

    /// Appends agent-produced items in the order received and applies a
    /// handoff if the workflow signalled one.
    pub fn record_agent_output(&mut self, items: Vec<TurnItem>, new_agent: Option<AgentRef>) {
        self.history.extend(items);
        if let Some(agent) = new_agent {
            if agent != self.active_agent {
                info!(from = %self.active_agent, to = %agent, "Active agent changed");
            }
            self.active_agent = agent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new(AgentRef::new("assistant"))
    }

    #[test]
    fn test_record_user_turn_returns_snapshot() {
        let mut conversation = conversation();
        let (history, agent) = conversation.record_user_turn("hello");
        assert_eq!(history, vec![TurnItem::user("hello")]);
        assert_eq!(agent, AgentRef::new("assistant"));
        assert_eq!(conversation.history().len(), 1);
    }

    #[test]
    fn test_agent_output_appends_in_order_and_hands_off() {
        let mut conversation = conversation();
        conversation.record_user_turn("I have a billing question");
        let billing = AgentRef::new("billing");
        conversation.record_agent_output(
            vec![
                TurnItem::agent("Let me transfer you.", AgentRef::new("assistant")),
                TurnItem::handoff(&AgentRef::new("assistant"), &billing),
            ],
            Some(billing.clone()),
        );
        assert_eq!(conversation.history().len(), 3);
        assert_eq!(conversation.active_agent(), &billing);

        conversation.record_agent_output(vec![], None);
        assert_eq!(conversation.active_agent(), &billing);
    }

    #[test]
    fn test_replace_history_and_reset_agent() {
        let mut conversation = conversation();
        conversation.record_user_turn("one");
        conversation.record_agent_output(vec![], Some(AgentRef::new("billing")));

        conversation.replace_history(vec![]);
        assert!(conversation.history().is_empty());
        assert_eq!(conversation.active_agent(), &AgentRef::new("billing"));

        conversation.reset_agent();
        assert_eq!(conversation.active_agent(), &AgentRef::new("assistant"));
    }
}
