//! # kview-server
//!
//! Axum HTTP + `WebSocket` host and the per-connection relay session.
//!
//! - [`session`]: one client session; spawns and joins the three loops
//! - [`outbound`] / [`inbound`]: the single writer and single reader on the transport
//! - [`watch`]: upstream pod watch with restart and a re-open circuit breaker
//! - [`dispatcher`]: client command handling
//! - [`publisher`] / [`teardown`]: the bounded outbound channel and the shared end signal
//! - [`transport`]: frame sink/source traits and the axum `WebSocket` adapter
//! - [`server`]: routes (`/ws`, `/health`, `/metrics`) and listener
//! - Graceful shutdown via a root `CancellationToken` and a session `TaskTracker`

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod health;
pub mod inbound;
pub mod metrics;
pub mod outbound;
pub mod publisher;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod teardown;
pub mod transport;
pub mod watch;

#[cfg(test)]
mod test_support;

pub use server::KviewServer;
pub use session::{Session, SessionState};
pub use shutdown::ShutdownCoordinator;
pub use teardown::SessionEnd;
pub use transport::{Frame, FrameSink, FrameSource, TransportError};
