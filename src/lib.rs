//! Execution of and interaction with external processes and pipelines.
//!
//! `taskpipe` spawns external commands, wires their standard streams to
//! the host or to each other, and controls them while they run.  The
//! central type is [`Task`], a handle to one process: configure it with
//! builder methods, spawn it with [`Task::run_async`] or
//! [`Task::run_sync`], then wait, poll, or signal it.
//!
//! Stream plumbing is expressed with [`StreamEndpoint`]: inherit the
//! host's stream, discard via the null device, connect a [`PipeChannel`]
//! shared with the host or another task, or feed a [`LineConsumer`] that
//! invokes a callback per line in the background.
//!
//! The crate is Unix-only.  A process that dies from a signal reports the
//! signal number as its exit code, so an interrupted child finishes with
//! code 2 and a terminated one with 15.
//!
//! # Examples
//!
//! Run a command and fail on non-zero exit:
//!
//! ```no_run
//! # fn dummy() -> taskpipe::Result<()> {
//! taskpipe::run("cp", ["file.txt", "backup.txt"])?;
//! # Ok(())
//! # }
//! ```
//!
//! Capture output, tolerating failure:
//!
//! ```no_run
//! # fn dummy() -> taskpipe::Result<()> {
//! let captured = taskpipe::capture_bash("ls -l | wc -l")?;
//! println!("{} ({})", captured.stdout, captured.exit_code);
//! # Ok(())
//! # }
//! ```
//!
//! Connect two processes and read the downstream's output:
//!
//! ```no_run
//! # use taskpipe::*;
//! # fn dummy() -> taskpipe::Result<()> {
//! let out = PipeChannel::new()?;
//! let (find, grep) = pipe(
//!     Task::new("find").args([".", "-name", "*.rs"]),
//!     Task::new("grep").arg("main").stdout(StreamEndpoint::Pipe(out.clone())),
//! )?;
//! find.run_async()?;
//! grep.run_async()?;
//! let hits = out.read_all()?;
//! find.finish()?;
//! grep.finish()?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

mod channel;
mod error;
mod lines;
mod posix;
pub mod resolver;
mod run;
mod spawn;
mod stream;
mod task;

pub use crate::channel::PipeChannel;
pub use crate::error::{Error, Result};
pub use crate::lines::LineConsumer;
pub use crate::run::{capture, capture_bash, run, run_bash, Capture};
pub use crate::stream::{StreamEndpoint, NULL_DEVICE};
pub use crate::task::{pipe, Task};

#[cfg(test)]
mod tests;
