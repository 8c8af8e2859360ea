//! HTTP API consumed by the platform's service catalog

mod server;
mod handlers;
mod types;

pub use server::{router, Server};
pub use types::*;
