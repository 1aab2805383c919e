//! One-call conveniences over [`Task`].

use std::ffi::OsStr;
use std::thread;

use crate::channel::PipeChannel;
use crate::error::{Error, Result};
use crate::stream::StreamEndpoint;
use crate::task::Task;

const BASH: &str = "/bin/bash";

/// Runs `command` with `args`, all three streams inherited, and blocks
/// until it exits.
///
/// Returns `Err(`[`Error::NonZeroExit`]`)` for any exit code other than
/// zero, which includes deaths by signal (the signal number is the code).
pub fn run(
    command: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let code = Task::new(command).args(args).run_sync()?;
    if code != 0 {
        return Err(Error::NonZeroExit(code));
    }
    Ok(())
}

/// Runs `command` through `bash -c`, streams inherited, and blocks until
/// it exits.  Non-zero exit is an error, as with [`run`].
pub fn run_bash(command: impl AsRef<OsStr>) -> Result<()> {
    run(BASH, [OsStr::new("-c"), command.as_ref()])
}

/// Runs `command` with `args` and captures both of its output streams.
///
/// Unlike [`run`], a non-zero exit code is not an error here; it is
/// reported in the returned [`Capture`], so callers can inspect stderr of
/// a failed command.  Use [`Capture::check`] to get [`run`]-style
/// failure behavior.
///
/// Both streams are drained concurrently while the process runs, so a
/// command producing unbounded output on either stream cannot deadlock
/// the capture.
pub fn capture(
    command: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<Capture> {
    let out = PipeChannel::new().map_err(Error::Io)?;
    let err = PipeChannel::new().map_err(Error::Io)?;
    let task = Task::new(command)
        .args(args)
        .stdout(StreamEndpoint::Pipe(out.clone()))
        .stderr(StreamEndpoint::Pipe(err.clone()));
    task.run_async()?;

    // Drain stderr on a side thread while this one drains stdout, so the
    // child can't block on a full pipe buffer of either stream.
    let err_reader = thread::spawn(move || err.read_all());
    let stdout = out.read_all()?;
    let stderr = err_reader.join().expect("stderr reader panicked")?;
    let exit_code = task.finish()?;

    Ok(Capture {
        stdout: decode_trimmed(stdout),
        stderr: decode_trimmed(stderr),
        exit_code,
    })
}

/// Runs `command` through `bash -c` and captures its output, as with
/// [`capture`].
pub fn capture_bash(command: impl AsRef<OsStr>) -> Result<Capture> {
    capture(BASH, [OsStr::new("-c"), command.as_ref()])
}

// One trailing newline is an artifact of line-oriented tools, not
// payload.
fn decode_trimmed(bytes: Vec<u8>) -> String {
    let mut s = String::from_utf8_lossy(&bytes).into_owned();
    if s.ends_with('\n') {
        s.pop();
    }
    s
}

/// Output of a [`capture`]d command.
///
/// `stdout` and `stderr` hold the complete stream contents, decoded as
/// UTF-8 with invalid sequences replaced, with at most one trailing
/// newline stripped.
#[derive(Debug, Clone)]
pub struct Capture {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Capture {
    /// True if the command exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a non-zero exit into [`Error::NonZeroExit`], passing a
    /// successful capture through.
    pub fn check(self) -> Result<Capture> {
        if !self.success() {
            return Err(Error::NonZeroExit(self.exit_code));
        }
        Ok(self)
    }
}
