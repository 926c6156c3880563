//! Core data model: agents, configuration, scenarios and errors.

pub mod agent;
pub mod config;
pub mod error;
pub mod scenario;
