//! Usage: Cross-cutting helpers (error model, secrets masking, clock, blocking offload).

pub mod blocking;
pub mod error;
pub mod security;
pub mod time;
