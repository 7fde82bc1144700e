//! Shared Application State
//!
//! Holds the collaborators every connection and handler needs. Each session
//! owns its own history; nothing here is per-connection.

use crate::{avatar::AvatarRelay, config::Config};
use cadence_core::{agent::AgentCatalog, speech::SpeechPipeline, workflow::WorkflowEngine};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<dyn WorkflowEngine>,
    pub speech: Arc<dyn SpeechPipeline>,
    pub agents: Arc<AgentCatalog>,
    pub avatar: Arc<AvatarRelay>,
    pub config: Arc<Config>,
}
