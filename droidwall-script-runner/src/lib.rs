//! Script execution harness used to drive the external filter tool.
//!
//! A script body is materialized into a unique temporary file, run through
//! either the elevation program (`su -c <file>`) or a plain shell
//! (`sh <file>`), and both output streams are captured. Execution is bounded
//! by a timeout; on expiry the child's process group is interrupted, given a
//! grace period, then killed (see [`teardown`]).
//!
//! No failure crosses the [`ScriptRunner`] boundary as an error: spawn, I/O
//! and timeout failures all come back as an [`ExecutionResult`] carrying the
//! `-1` sentinel exit code and diagnostic text.

pub mod executor;
pub mod process_group;
pub mod script_file;
pub mod stream;
pub mod teardown;

pub use executor::{
    DID_NOT_COMPLETE, Elevation, ExecutionResult, ScriptExecutor, ScriptInvocation, ScriptRunner,
    ScriptTimeout,
};
pub use teardown::{Teardown, TeardownOutcome, TeardownState};
