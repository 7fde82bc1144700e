//! Agent Catalog
//!
//! Agents (personas) are described by markdown instruction files loaded at
//! startup. The catalog resolves which agent services a turn and which
//! agents a running agent may hand the conversation off to.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of the tool names the workflow engine exposes for handoffs.
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// Opaque reference to an agent in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRef(String);

impl AgentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The static description of a single agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub agent: AgentRef,
    /// System instructions sent ahead of the history on every turn.
    pub instructions: String,
    /// One-line summary, used as the handoff tool description.
    pub description: String,
}

impl AgentProfile {
    pub fn new(agent: AgentRef, instructions: String) -> Self {
        let description = instructions
            .lines()
            .map(|line| line.trim().trim_start_matches('#').trim())
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Hand the conversation to {}", agent));
        Self {
            agent,
            instructions,
            description,
        }
    }

    /// The name of the tool other agents call to hand off to this one.
    pub fn handoff_tool_name(&self) -> String {
        let sanitized: String = self
            .agent
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}{}", HANDOFF_TOOL_PREFIX, sanitized)
    }
}

/// All agents known to the process, plus the one every session starts with.
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    profiles: BTreeMap<AgentRef, AgentProfile>,
    default_agent: AgentRef,
}

impl AgentCatalog {
    /// Builds a catalog from `name -> instructions` pairs.
    ///
    /// Fails if the catalog is empty or `default_agent` is not among the
    /// loaded agents; both are start-up misconfigurations.
    pub fn from_prompts<I>(prompts: I, default_agent: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let profiles: BTreeMap<AgentRef, AgentProfile> = prompts
            .into_iter()
            .map(|(name, instructions)| {
                let agent = AgentRef::new(name);
                (agent.clone(), AgentProfile::new(agent, instructions))
            })
            .collect();

        if profiles.is_empty() {
            bail!("No agent instructions were loaded");
        }
        let default_agent = AgentRef::new(default_agent);
        if !profiles.contains_key(&default_agent) {
            bail!(
                "Default agent '{}' not found; known agents: {}",
                default_agent,
                profiles
                    .keys()
                    .map(AgentRef::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(Self {
            profiles,
            default_agent,
        })
    }

    pub fn default_agent(&self) -> &AgentRef {
        &self.default_agent
    }

    pub fn get(&self, agent: &AgentRef) -> Option<&AgentProfile> {
        self.profiles.get(agent)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Agents that `from` may hand the conversation off to.
    pub fn handoff_targets<'a>(
        &'a self,
        from: &'a AgentRef,
    ) -> impl Iterator<Item = &'a AgentProfile> + 'a {
        self.profiles
            .values()
            .filter(move |profile| &profile.agent != from)
    }

    /// Maps a handoff tool name back to its target agent.
    pub fn resolve_handoff(&self, tool_name: &str) -> Option<&AgentRef> {
        self.profiles
            .values()
            .find(|profile| profile.handoff_tool_name() == tool_name)
            .map(|profile| &profile.agent)
    }
}
