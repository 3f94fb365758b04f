//! # Chat Session API
//!
//! Stateful multi-turn chat sessions: an OpenAI-compatible completion client,
//! a per-turn conversation buffer, expiring Redis-backed history keyed by an
//! opaque state token, and an orchestrator composing them per request.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use error::{SessionError, SessionResult};
