// src/exec/mod.rs

//! External process layer.
//!
//! - [`process`] runs short-lived commands (pre-build steps, the compiler)
//!   with merged output capture and cancellation.
//! - [`daemon`] launches the long-running daemon detached, waits for its
//!   log-based completion signal and terminates it by token lookup.
//! - [`proc_table`] abstracts the OS process list used for that lookup, so
//!   tests can substitute a fake.

pub mod daemon;
pub mod proc_table;
pub mod process;

pub use daemon::{
    CorrelationToken, DaemonInvocation, DaemonManager, DaemonSession, TeardownOutcome,
    TeardownReason,
};
pub use proc_table::{find_tagged, ProcessEntry, ProcessTable, SystemProcessTable};
pub use process::{run_process, CapturedOutput, ProcessSpec};
