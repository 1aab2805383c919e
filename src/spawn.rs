//! Fork/exec machinery shared by all spawn paths.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::posix;

/// Child-side files for the three standard streams; `None` inherits the
/// host's descriptor.
pub(crate) struct ChildEnds {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

/// Read exactly N bytes, or return None on immediate EOF.  Similar to
/// read_exact(), but distinguishes between no read and partial read
/// (which is treated as error).
fn read_exact_or_eof<const N: usize>(source: &mut File) -> io::Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut total_read = 0;
    while total_read < N {
        let n = source.read(&mut buf[total_read..])?;
        if n == 0 {
            break;
        }
        total_read += n;
    }
    match total_read {
        0 => Ok(None),
        n if n == N => Ok(Some(buf)),
        _ => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}

/// Forks and execs `executable` with the given argv and environment.
///
/// Exec failure in the child is reported back over a close-on-exec pipe,
/// so by the time this returns `Ok(pid)` the child has successfully
/// exec'd.  The parent's copies of the child-end files are closed before
/// returning, which is what lets pipe readers observe EOF on child exit.
pub(crate) fn spawn(
    executable: &Path,
    argv: &[OsString],
    env: &[OsString],
    cwd: Option<&Path>,
    ends: ChildEnds,
) -> io::Result<u32> {
    let mut exec_fail_pipe = posix::pipe()?;
    posix::set_cloexec(&exec_fail_pipe.0)?;
    posix::set_cloexec(&exec_fail_pipe.1)?;

    let just_exec = posix::prep_exec(executable.as_os_str(), argv, env)?;

    let pid;
    unsafe {
        match posix::fork()? {
            Some(child_pid) => pid = child_pid,
            None => {
                drop(exec_fail_pipe.0);
                let result = do_exec(just_exec, ends, cwd);
                let error_code = match result {
                    Ok(()) => unreachable!(),
                    Err(e) => e.raw_os_error().unwrap_or(-1),
                } as u32;
                exec_fail_pipe.1.write_all(&error_code.to_le_bytes()).ok();
                posix::_exit(127);
            }
        }
    }

    // Close the parent's copies of child-end fds promptly after fork,
    // before blocking on exec_fail_pipe.
    drop(ends);

    drop(exec_fail_pipe.1);
    match read_exact_or_eof::<4>(&mut exec_fail_pipe.0)? {
        None => Ok(pid),
        Some(error_buf) => {
            let error_code = u32::from_le_bytes(error_buf);
            Err(io::Error::from_raw_os_error(error_code as i32))
        }
    }
}

fn dup2_if_needed(end: &Option<File>, target_fd: i32) -> io::Result<()> {
    if let Some(f) = end
        && f.as_raw_fd() != target_fd
    {
        posix::dup2(f.as_raw_fd(), target_fd)?;
    }
    Ok(())
}

fn do_exec(
    just_exec: impl FnOnce() -> io::Result<()>,
    ends: ChildEnds,
    cwd: Option<&Path>,
) -> io::Result<()> {
    if let Some(cwd) = cwd {
        std::env::set_current_dir(cwd)?;
    }

    dup2_if_needed(&ends.stdin, 0)?;
    dup2_if_needed(&ends.stdout, 1)?;
    dup2_if_needed(&ends.stderr, 2)?;
    posix::reset_sigpipe()?;

    just_exec()?;
    unreachable!();
}

/// Formats an environment table into `K=V` entries, keeping the last
/// value when a variable repeats.
pub(crate) fn format_env(env: &[(OsString, OsString)]) -> Vec<OsString> {
    let mut seen = HashSet::<&OsStr>::new();
    let mut formatted: Vec<_> = env
        .iter()
        .rev()
        .filter(|&(k, _)| seen.insert(k))
        .map(|(k, v)| {
            let mut fmt = k.clone();
            fmt.push("=");
            fmt.push(v);
            fmt
        })
        .collect();
    formatted.reverse();
    formatted
}
