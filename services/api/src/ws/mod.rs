//! WebSocket Session Management
//!
//! This module contains the real-time session layer. It is structured into
//! submodules for clarity:
//!
//! - `protocol`: The JSON frame format and the inbound frame classifier.
//! - `accumulator`: Buffers audio chunks until an utterance is complete.
//! - `conversation`: Per-connection history and active agent.
//! - `cycle`: Runs a text turn through the workflow engine.
//! - `voice`: Runs a finished utterance through the speech pipeline.
//! - `session`: The connection lifecycle and dispatch loop.

pub mod accumulator;
pub mod conversation;
pub mod cycle;
pub mod protocol;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

pub use session::ws_handler;
