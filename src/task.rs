//! The process handle and its lifecycle/signal state machine.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::channel::PipeChannel;
use crate::error::{Error, Result};
use crate::posix;
use crate::resolver;
use crate::spawn::{self, ChildEnds};
use crate::stream::StreamEndpoint;

/// A handle to one external process.
///
/// A `Task` is configured with builder methods, spawned with
/// [`run_async`] or [`run_sync`], and then queried and controlled through
/// the lifecycle operations.  Its lifecycle only moves forward:
///
/// ```text
/// NotStarted -> Running <-> Suspended
///                  \___________/
///                        |
///                     Exited(code)
/// ```
///
/// Arguments are passed to the child verbatim, with no shell expansion.
/// The environment entries set with [`env`](Self::env) overlay the
/// inherited environment unless [`env_clear`](Self::env_clear) switches to
/// replacement.  Configuration is snapshotted at spawn; it cannot affect
/// an already-running process.
///
/// Dropping a `Task` neither kills nor waits for a still-running child; it
/// only reaps one that has already exited.  Callers wanting a timeout race
/// [`finish`](Self::finish) against their own timer and call
/// [`terminate`](Self::terminate) themselves.
///
/// # Examples
///
/// Capture a command's output through a channel:
///
/// ```no_run
/// # use taskpipe::*;
/// # fn dummy() -> taskpipe::Result<()> {
/// let out = PipeChannel::new()?;
/// let task = Task::new("ls").arg("-l").stdout(StreamEndpoint::Pipe(out.clone()));
/// task.run_async()?;
/// let listing = out.read_all()?;
/// let code = task.finish()?;
/// # Ok(())
/// # }
/// ```
///
/// [`run_async`]: Self::run_async
/// [`run_sync`]: Self::run_sync
pub struct Task {
    command: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    env_clear: bool,
    cwd: Option<PathBuf>,
    stdin: StreamEndpoint,
    stdout: StreamEndpoint,
    stderr: StreamEndpoint,
    state: Mutex<TaskState>,
}

#[derive(Debug, Copy, Clone)]
enum TaskState {
    NotStarted,
    Running(u32),
    Suspended(u32),
    Exited { pid: u32, code: i32 },
}

impl Task {
    /// Constructs a task that will run `command`, with all streams
    /// inherited from the host and no argument, environment, or working
    /// directory overrides.
    pub fn new(command: impl AsRef<OsStr>) -> Task {
        Task {
            command: command.as_ref().to_owned(),
            args: vec![],
            env: vec![],
            env_clear: false,
            cwd: None,
            stdin: StreamEndpoint::Inherit,
            stdout: StreamEndpoint::Inherit,
            stderr: StreamEndpoint::Inherit,
            state: Mutex::new(TaskState::NotStarted),
        }
    }

    /// Appends `arg` to the argument list.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Task {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Extends the argument list with `args`.
    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Task {
        self.args
            .extend(args.into_iter().map(|x| x.as_ref().to_owned()));
        self
    }

    /// Sets an environment variable in the child process.
    ///
    /// If the same variable is set more than once, the last value is used.
    /// Other variables are inherited from the current process unless
    /// [`env_clear`](Self::env_clear) was called.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Task {
        self.env
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Makes the overlay set with [`env`](Self::env) *replace* the
    /// inherited environment instead of extending it.
    pub fn env_clear(mut self) -> Task {
        self.env_clear = true;
        self
    }

    /// Specifies the working directory of the child process.
    ///
    /// If unspecified, the current working directory is inherited.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Task {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Connects the child's standard input to `endpoint`.
    pub fn stdin(mut self, endpoint: StreamEndpoint) -> Task {
        self.stdin = endpoint;
        self
    }

    /// Connects the child's standard output to `endpoint`.
    pub fn stdout(mut self, endpoint: StreamEndpoint) -> Task {
        self.stdout = endpoint;
        self
    }

    /// Connects the child's standard error to `endpoint`.
    pub fn stderr(mut self, endpoint: StreamEndpoint) -> Task {
        self.stderr = endpoint;
        self
    }

    // Lifecycle

    /// Spawns the process and returns immediately; the child runs
    /// concurrently with the host.
    ///
    /// The executable is resolved first: a bare name through the search
    /// path, an explicit path by checking it names an executable file.
    /// Each stream endpoint is then bound to the corresponding child
    /// stream; channel and line-sink endpoints keep draining or filling in
    /// the background independent of the caller.
    ///
    /// Fails with [`Error::ExecutableNotFound`] or
    /// [`Error::SpawnFailure`]; neither is retried.
    pub fn run_async(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, TaskState::NotStarted) {
            return Err(Error::Io(io::Error::new(
                ErrorKind::InvalidInput,
                "task already started",
            )));
        }

        let executable = resolver::resolve(&self.command)?;

        let mut argv = self.args.clone();
        argv.insert(0, self.command.clone());

        let mut table: Vec<(OsString, OsString)> = if self.env_clear {
            vec![]
        } else {
            env::vars_os().collect()
        };
        table.extend(self.env.iter().cloned());
        let env = spawn::format_env(&table);

        let ends = ChildEnds {
            stdin: self.stdin.child_end(true).map_err(|e| self.spawn_failure(e))?,
            stdout: self.stdout.child_end(false).map_err(|e| self.spawn_failure(e))?,
            stderr: self.stderr.child_end(false).map_err(|e| self.spawn_failure(e))?,
        };

        let pid = spawn::spawn(&executable, &argv, &env, self.cwd.as_deref(), ends)
            .map_err(|e| self.spawn_failure(e))?;
        debug!(pid, command = %executable.display(), "spawned process");
        *state = TaskState::Running(pid);
        Ok(())
    }

    /// Spawns the process and blocks until it exits, returning the exit
    /// code with the same encoding as [`finish`](Self::finish).
    pub fn run_sync(&self) -> Result<i32> {
        self.run_async()?;
        self.finish()
    }

    /// Blocks until the process exits and returns its exit code.
    ///
    /// The process is reaped exactly once; the code is cached, so
    /// repeated and concurrent calls converge on the same result without
    /// waiting again.  The wait is a poll with increasing backoff rather
    /// than a kernel-blocking `waitpid`, so signal operations and
    /// [`is_running`](Self::is_running) from other threads stay
    /// responsive while one thread waits; a caller needing a timeout
    /// races `finish` against its own timer and calls
    /// [`terminate`](Self::terminate) itself.
    ///
    /// If the process was terminated by a signal, the returned code is
    /// the raw signal number: interrupting yields 2, terminating yields
    /// 15.  The caller cannot distinguish `exit(15)` from death by
    /// SIGTERM through this value alone; the conflation is inherited
    /// behavior that callers rely on.
    pub fn finish(&self) -> Result<i32> {
        let mut delay = Duration::from_millis(1);
        loop {
            {
                // The lock may not be held across a blocking wait, or
                // signal delivery from other threads would stall behind
                // it; poll non-blocking and sleep unlocked.
                let mut state = self.state.lock().unwrap();
                match *state {
                    TaskState::Exited { code, .. } => return Ok(code),
                    TaskState::NotStarted => {
                        return Err(Error::Io(io::Error::new(
                            ErrorKind::InvalidInput,
                            "task not started",
                        )));
                    }
                    TaskState::Running(pid) | TaskState::Suspended(pid) => {
                        match posix::waitpid(pid, posix::WNOHANG) {
                            Ok((waited, raw)) if waited == pid => {
                                let code = posix::decode_wait_status(raw);
                                debug!(pid, code, "reaped process");
                                *state = TaskState::Exited { pid, code };
                                return Ok(code);
                            }
                            Ok(_) => {}
                            Err(e) if e.raw_os_error() == Some(posix::EINTR) => {}
                            Err(e) if e.raw_os_error() == Some(posix::ECHILD) => {
                                // Someone else waited for the child.  The
                                // exit status is unrecoverable.
                                *state = TaskState::Exited { pid, code: -1 };
                                return Ok(-1);
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
            thread::sleep(delay);
            if delay < Duration::from_millis(100) {
                delay *= 2;
            }
        }
    }

    /// True while the process is running or suspended.
    ///
    /// Performs a non-blocking poll, so a child that exited on its own is
    /// observed without a [`finish`](Self::finish) call.
    pub fn is_running(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if let TaskState::Running(pid) | TaskState::Suspended(pid) = *state
            && let Ok((waited, raw)) = posix::waitpid(pid, posix::WNOHANG)
            && waited == pid
        {
            *state = TaskState::Exited {
                pid,
                code: posix::decode_wait_status(raw),
            };
        }
        matches!(*state, TaskState::Running(_) | TaskState::Suspended(_))
    }

    /// The OS process id, assigned at spawn.
    pub fn pid(&self) -> Option<u32> {
        match *self.state.lock().unwrap() {
            TaskState::NotStarted => None,
            TaskState::Running(pid) | TaskState::Suspended(pid) => Some(pid),
            TaskState::Exited { pid, .. } => Some(pid),
        }
    }

    /// The exit code, if the process is known to have exited.
    ///
    /// Does not block and does not perform any system call; use
    /// [`is_running`](Self::is_running) or [`finish`](Self::finish) to
    /// observe an exit.
    pub fn exit_code(&self) -> Option<i32> {
        match *self.state.lock().unwrap() {
            TaskState::Exited { code, .. } => Some(code),
            _ => None,
        }
    }

    // Signals.  Each returns whether the signal was delivered; none of
    // them waits for its effect.

    /// Sends a stop signal.  Valid only while `Running`; on delivery the
    /// task transitions to `Suspended`.
    pub fn suspend(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if let TaskState::Running(pid) = *state
            && posix::kill(pid, posix::SIGSTOP).is_ok()
        {
            debug!(pid, "suspended process");
            *state = TaskState::Suspended(pid);
            return true;
        }
        false
    }

    /// Sends a continue signal.  Valid only while `Suspended`; on
    /// delivery the task transitions back to `Running`.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if let TaskState::Suspended(pid) = *state
            && posix::kill(pid, posix::SIGCONT).is_ok()
        {
            debug!(pid, "resumed process");
            *state = TaskState::Running(pid);
            return true;
        }
        false
    }

    /// Sends the interrupt signal (SIGINT).
    ///
    /// No state change by itself; the eventual exit is observed through
    /// [`finish`](Self::finish), which then reports code 2.
    pub fn interrupt(&self) -> bool {
        self.signal(posix::SIGINT)
    }

    /// Sends the terminate signal (SIGTERM).
    ///
    /// No state change by itself; the eventual exit is observed through
    /// [`finish`](Self::finish), which then reports code 15.
    pub fn terminate(&self) -> bool {
        self.signal(posix::SIGTERM)
    }

    /// Sends SIGKILL.
    pub fn kill(&self) -> bool {
        self.signal(posix::SIGKILL)
    }

    /// Sends an arbitrary signal to a running or suspended process.
    ///
    /// Returns false when the process is not currently running or the OS
    /// rejected the delivery; callers that need to tell those apart check
    /// [`is_running`](Self::is_running) first.
    pub fn signal(&self, signal: i32) -> bool {
        let state = self.state.lock().unwrap();
        match *state {
            TaskState::Running(pid) | TaskState::Suspended(pid) => {
                let delivered = posix::kill(pid, signal).is_ok();
                debug!(pid, signal, delivered, "sent signal");
                delivered
            }
            _ => false,
        }
    }

    fn spawn_failure(&self, source: io::Error) -> Error {
        Error::SpawnFailure {
            command: self.command.to_string_lossy().into_owned(),
            source,
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // Reap an already-exited child so it doesn't linger as a zombie;
        // never blocks and never kills a still-running one.
        let state = self.state.get_mut().unwrap();
        if let TaskState::Running(pid) | TaskState::Suspended(pid) = *state
            && let Ok((waited, raw)) = posix::waitpid(pid, posix::WNOHANG)
            && waited == pid
        {
            *state = TaskState::Exited {
                pid,
                code: posix::decode_wait_status(raw),
            };
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Task")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("state", &*state)
            .finish_non_exhaustive()
    }
}

/// Connects `upstream`'s standard output to `downstream`'s standard input
/// through one freshly created shared [`PipeChannel`], returning the
/// reconfigured pair.
///
/// Start both with [`Task::run_async`].  Never `run_sync` the upstream
/// alone: it may block writing into a full pipe buffer before the
/// downstream has started reading.
///
/// # Example
///
/// ```no_run
/// # use taskpipe::*;
/// # fn dummy() -> taskpipe::Result<()> {
/// let out = PipeChannel::new()?;
/// let (ls, grep) = pipe(
///     Task::new("ls").arg("-l"),
///     Task::new("grep").arg("total").stdout(StreamEndpoint::Pipe(out.clone())),
/// )?;
/// ls.run_async()?;
/// grep.run_async()?;
/// let matching = out.read_all()?;
/// ls.finish()?;
/// grep.finish()?;
/// # Ok(())
/// # }
/// ```
pub fn pipe(upstream: Task, downstream: Task) -> io::Result<(Task, Task)> {
    let channel = PipeChannel::new()?;
    Ok((
        upstream.stdout(StreamEndpoint::Pipe(channel.clone())),
        downstream.stdin(StreamEndpoint::Pipe(channel)),
    ))
}
