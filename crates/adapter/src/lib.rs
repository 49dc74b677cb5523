//! A debug adapter that sits between an IDE and a debug server whose
//! debuggee sees a different filesystem.
//!
//! The IDE ("frontend") speaks DAP to this adapter, which relays every message
//! to the debug server ("backend") and back. Paths are translated on the way:
//! breakpoints are installed on the debuggee's paths, stack frames point at the
//! IDE's files when they exist, and everything else is served by source
//! reference through the backend.

mod backend;
mod bridge;
mod outbox;
mod server;
mod sources;

pub mod args;
pub mod testing;

pub use backend::DEFAULT_REQUEST_TIMEOUT;
pub use bridge::{SessionOptions, run_session};
pub use server::Server;
