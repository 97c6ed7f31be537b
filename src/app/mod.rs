//! Usage: Process-level wiring (logging).

pub mod logging;
