// src/map/mod.rs v2
//! Live map feed and the HTTP server that exposes it

pub mod feed;
pub mod server;

pub use feed::{MapFeed, MapPayload};
pub use server::{bind, create_router, run_server, AppState};
