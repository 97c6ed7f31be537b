//! Usage: OAuth authorization code flow (listener, token grants, controller).

pub mod callback_server;
pub mod flow;
pub mod token_exchange;
