//! Runwire: client-side protocol engine for streaming workflow runners.
//!
//! A runner pushes JSON frames over a WebSocket: conversation messages
//! (agent text, tool calls, input requests) and, in step mode, debugger
//! messages (`debug_*`). This crate decodes those frames into typed messages,
//! folds them into per-channel state, and correlates the client's answers with
//! the runner's acknowledgements.
//!
//! # Quick start
//!
//! ```no_run
//! use runwire::config::load_config;
//! use runwire::session::RunSession;
//! use runwire::transport::WsTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?;
//! let (transport, mut events) = WsTransport::spawn(config.transport_options());
//! let mut session = RunSession::new(transport, config.session_options())?;
//! while let Some(event) = events.recv().await {
//!     let outcome = session.handle_event(event)?;
//!     if outcome.is_workflow_end {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod breakpoint;
pub mod config;
pub mod dedup;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod transport;
