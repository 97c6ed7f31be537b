//! TickTick MCP auth core: OAuth2 authorization-code flow, token persistence,
//! and an authenticated Open API client.

pub mod app;
pub mod auth;
pub mod client;
pub mod infra;
pub mod shared;

pub use auth::flow::{Authenticator, TokenPair};
pub use client::ApiClient;
pub use infra::auth_store::{AuthStore, PersistedAuthRecord};
pub use infra::config::Config;
pub use shared::error::{codes, AppError, AppResult};
