//! Leave bot — Slack channel subscriptions and leave notices.

pub mod commands;
pub mod config;
pub mod directory;
pub mod error;
pub mod members;
pub mod routes;
pub mod slack;
pub mod store;
pub mod subscriptions;
