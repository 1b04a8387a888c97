//! HTTP surface: REST control endpoints, the WebSocket command channel and
//! per-team SSE streams.

pub mod handlers;
pub mod server;
pub mod sse;
pub mod ws;

pub use server::{create_router, run, AppContext};
