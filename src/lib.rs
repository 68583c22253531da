//! Hatewatch: a Discord bot that answers, counts and removes hate speech.
//!
//! Every message is scored by a hosted text classifier. Hate messages get
//! a generated admonishment, an offense count, escalating warnings and
//! finally a kick; messages addressed to the bot get a conversational reply.

pub mod classifier;
pub mod commands;
pub mod config;
pub mod discord;
pub mod error;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod responder;
pub mod router;
pub mod tracker;

#[cfg(test)]
mod test_support;
