//! Daemon side: frame pipeline, event dispatch and the local control socket.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use pipeline::{FrameSource, replay};
pub use server::{client_request, run_daemon};
