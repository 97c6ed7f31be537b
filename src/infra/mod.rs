//! Usage: Infrastructure (environment config, persisted credential store).

pub mod auth_store;
pub mod config;
