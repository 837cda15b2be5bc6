//! Fork-and-run worker library
//!
//! Runs a small computation in a child created with `fork`, returns its
//! output over a pipe and interprets its exit status. The blocking read and
//! `waitpid` run on a background worker so async callers are never blocked.

pub mod child;
pub mod errors;
pub mod job;
pub mod parent;
pub mod pipe;
pub mod runner;

// Re-export commonly used types
pub use errors::{ForkRunError, ForkRunResult};
pub use job::{ChildOutput, JobOutcome};
pub use runner::{fork_and_run, fork_and_run_value, ForkRunner, PendingJob};
