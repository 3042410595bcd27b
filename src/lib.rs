//! Chat Modules — third-party integration workflow for an AI chat assistant.

pub mod config;
pub mod error;
pub mod modules;
pub mod registry;
pub mod store;
