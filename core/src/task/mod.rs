//! Script tasks that exercise barriers
//!
//! A script task stands in for one worker thread running a test script. Each
//! round it increments a counter shared by every task in the cluster, waits on
//! a barrier, checks that every task has incremented, waits again, resets the
//! counter and waits a third time. A barrier that releases early shows up as a
//! task seeing the wrong count; one that never releases shows up as a timeout.
//!
//! # Example
//!
//! ```ignore
//! use loadsync_core::task::{ScriptTaskBuilder, TaskStats};
//!
//! let task = ScriptTaskBuilder::new(0)
//!     .barriers(barriers)
//!     .counter(counter, 15)
//!     .rounds(3)
//!     .build()?;
//!
//! let stats = task.run(shutdown_rx).await?;
//! println!("Rounds: {}", stats.rounds);
//! ```

mod builder;
mod executor;
mod stats;

pub use builder::ScriptTaskBuilder;
pub use executor::{ScriptTask, ASSERT_BARRIER, INCREMENT_BARRIER, RESET_BARRIER};
pub use stats::TaskStats;
