//! Cadence Core
//!
//! Domain types shared by the session server and the seams to the external
//! collaborators it drives: the conversational workflow engine and the
//! speech pipeline. Concrete OpenAI-backed implementations live next to the
//! traits. Scripted stand-ins live in `scripted`, behind the `test-util`
//! feature.

pub mod agent;
pub mod history;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod speech;
pub mod workflow;
