//! Child process management.
//!
//! Used by the sync orchestrator to run a unit of work in a separate OS
//! process. `Command::kill_on_drop(true)` should be set so a timed-out unit
//! never leaves a stray child behind.

pub use std::process::{ExitStatus, Output, Stdio};
pub use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
