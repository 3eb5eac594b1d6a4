//! Barriers for test scripts
//!
//! A [`Barrier`] is a task's handle on a named barrier group. Every live handle
//! counts as one barrier; waiting on a handle registers a waiter, and once the
//! group has a waiter for every barrier all of them are released together. The
//! handle is reusable: after a release it returns to idle and may wait again
//! with a fresh identity.
//!
//! # Example
//!
//! ```ignore
//! let barriers = ScriptBarriers::new(groups, worker_identity);
//! let barrier = barriers.barrier("after-login")?;
//!
//! barrier.wait().await?;
//!
//! if !barrier.wait_timeout(Duration::from_secs(5)).await? {
//!     // Timed out, the barrier is now cancelled.
//! }
//! ```

mod handle;
mod script;

pub use handle::{Barrier, BarrierState};
pub use script::ScriptBarriers;
