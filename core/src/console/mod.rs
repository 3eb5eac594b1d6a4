//! Console barrier authority
//!
//! The console owns the only barrier groups whose release decisions count. Worker
//! processes send their mutations here; the console applies them to its groups
//! through a per-worker record of what each worker contributed, and broadcasts
//! `OpenBarrier` to every agent when a group is released.
//!
//! When a worker disappears from the liveness feed, its record is cancelled:
//! its pending waiters are cancelled and its barriers removed, as if the worker
//! had cancelled them itself.
//!
//! # Example
//!
//! ```ignore
//! use loadsync_core::console::ConsoleAuthority;
//! use loadsync_core::transport::{console_link, AgentBroadcaster};
//!
//! let broadcaster = AgentBroadcaster::new();
//! let authority = Arc::new(ConsoleAuthority::new(broadcaster.clone()));
//! let (link, inbound) = console_link();
//!
//! tokio::spawn(async move { authority.run(inbound, status_rx, shutdown_rx).await });
//! ```

mod authority;
mod process;

pub use authority::ConsoleAuthority;

#[cfg(test)]
mod tests;
