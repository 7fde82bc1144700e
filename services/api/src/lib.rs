//! Cadence API Library Crate
//!
//! The real-time session layer of the voice and text agent: the WebSocket
//! dispatch loop, its configuration and shared state, and the small HTTP
//! surface around it. The binaries are thin wrappers around this library.

pub mod audio_utils;
pub mod avatar;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
