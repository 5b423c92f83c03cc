//! Outreach ops: approval-gated outreach sequences driven from a roster,
//! operated through chat commands.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod guardrail;
pub mod notifier;
pub mod roster;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod util;
