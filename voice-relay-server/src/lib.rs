//! HTTP relay between a voice-assistant platform and a language model
//!
//! [`Dispatcher`] turns a platform request into a spoken reply, keeping a
//! per-user transcript in the session store between turns. The axum router in
//! [`server`] is a thin shell around it.

pub mod alexa;
pub mod dispatcher;
pub mod handlers;
mod locks;
pub mod server;
pub mod state;

pub use alexa::{Inbound, SkillRequest, SkillResponse};
pub use dispatcher::Dispatcher;
pub use server::{build_router, run_server, spawn_session_sweeper};
pub use state::AppState;
