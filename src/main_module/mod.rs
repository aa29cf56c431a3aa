//! Router assembly, health endpoint and server lifecycle.

mod health;
mod server;

pub use health::*;
pub use server::*;
