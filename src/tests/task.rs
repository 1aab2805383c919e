use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use super::common::output_of;
use crate::{pipe, Error, LineConsumer, PipeChannel, StreamEndpoint, Task};

#[test]
fn exit_zero() {
    assert_eq!(Task::new("true").run_sync().unwrap(), 0);
}

#[test]
fn exit_code_propagates() {
    let task = Task::new("sh").args(["-c", "exit 13"]);
    assert_eq!(task.run_sync().unwrap(), 13);
}

#[test]
fn finish_is_idempotent() {
    let task = Task::new("sh").args(["-c", "exit 13"]);
    task.run_async().unwrap();
    assert_eq!(task.finish().unwrap(), 13);
    assert_eq!(task.finish().unwrap(), 13);
    assert_eq!(task.exit_code(), Some(13));
}

#[test]
fn unknown_command() {
    let err = Task::new("name-that-cannot-possibly-exist")
        .run_sync()
        .unwrap_err();
    assert!(matches!(err, Error::ExecutableNotFound(_)));
}

#[test]
fn unexecutable_format() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("bogus");
    fs::write(&bogus, b"\x7f\x00\x01not a real executable").unwrap();
    fs::set_permissions(&bogus, fs::Permissions::from_mode(0o755)).unwrap();
    let err = Task::new(&bogus).run_sync().unwrap_err();
    assert!(matches!(err, Error::SpawnFailure { .. }));
}

#[test]
fn start_twice_fails() {
    let task = Task::new("true");
    task.run_async().unwrap();
    assert!(task.run_async().is_err());
    assert_eq!(task.finish().unwrap(), 0);
}

#[test]
fn finish_before_start_fails() {
    let task = Task::new("true");
    assert!(task.finish().is_err());
    assert_eq!(task.pid(), None);
    assert_eq!(task.exit_code(), None);
}

#[test]
fn signals_before_start_are_rejected() {
    let task = Task::new("true");
    assert!(!task.interrupt());
    assert!(!task.terminate());
    assert!(!task.kill());
    assert!(!task.suspend());
    assert!(!task.resume());
}

#[test]
fn is_running_observes_exit() {
    let task = Task::new("true");
    task.run_async().unwrap();
    while task.is_running() {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(task.exit_code(), Some(0));
    assert_eq!(task.finish().unwrap(), 0);
}

#[test]
fn interrupt_reports_signal_number() {
    let task = Task::new("sleep").arg("60");
    task.run_async().unwrap();
    assert!(task.is_running());
    assert!(task.interrupt());
    assert_eq!(task.finish().unwrap(), 2);
    assert!(!task.is_running());
}

#[test]
fn terminate_reports_signal_number() {
    let task = Task::new("sleep").arg("60");
    task.run_async().unwrap();
    assert!(task.terminate());
    assert_eq!(task.finish().unwrap(), 15);
}

#[test]
fn kill_reports_signal_number() {
    let task = Task::new("sleep").arg("60");
    task.run_async().unwrap();
    assert!(task.kill());
    assert_eq!(task.finish().unwrap(), 9);
    assert_eq!(task.exit_code(), Some(9));
}

#[test]
fn terminate_while_another_thread_finishes() {
    // A thread blocked in finish() must not hold the state lock, or the
    // only sanctioned timeout pattern (race finish() against a timer,
    // then terminate()) would stall until the child exits on its own.
    let task = Arc::new(Task::new("sleep").arg("60"));
    task.run_async().unwrap();
    let waiter = {
        let task = Arc::clone(&task);
        thread::spawn(move || task.finish().unwrap())
    };
    thread::sleep(Duration::from_millis(100));
    assert!(task.terminate());
    assert_eq!(waiter.join().unwrap(), 15);
    assert_eq!(task.exit_code(), Some(15));
}

#[test]
fn resume_while_another_thread_finishes() {
    let task = Arc::new(Task::new("sleep").arg("60"));
    task.run_async().unwrap();
    assert!(task.suspend());
    let waiter = {
        let task = Arc::clone(&task);
        thread::spawn(move || task.finish().unwrap())
    };
    thread::sleep(Duration::from_millis(100));
    assert!(task.resume());
    assert!(task.kill());
    assert_eq!(waiter.join().unwrap(), 9);
}

#[test]
fn concurrent_finish_callers_converge() {
    let task = Arc::new(Task::new("sh").args(["-c", "sleep 0.2; exit 7"]));
    task.run_async().unwrap();
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let task = Arc::clone(&task);
            thread::spawn(move || task.finish().unwrap())
        })
        .collect();
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), 7);
    }
    assert_eq!(task.exit_code(), Some(7));
}

#[test]
fn suspend_and_resume() {
    let task = Task::new("sleep").arg("60");
    task.run_async().unwrap();

    assert!(!task.resume(), "resume is only valid while suspended");
    assert!(task.suspend());
    assert!(!task.suspend(), "suspend is only valid while running");
    assert!(task.is_running(), "a suspended process is still alive");

    assert!(task.resume());
    assert!(!task.resume());
    assert!(task.terminate());
    assert_eq!(task.finish().unwrap(), 15);
    assert!(!task.suspend());
    assert!(!task.resume());
}

#[test]
fn env_overlays_inherited() {
    let task = Task::new("sh")
        .args(["-c", r#"printf '%s' "$TASKPIPE_TEST_VAR""#])
        .env("TASKPIPE_TEST_VAR", "quux");
    assert_eq!(output_of(task), ("quux".to_owned(), 0));
}

#[test]
fn env_last_value_wins() {
    let task = Task::new("sh")
        .args(["-c", r#"printf '%s' "$TASKPIPE_TEST_VAR""#])
        .env("TASKPIPE_TEST_VAR", "first")
        .env("TASKPIPE_TEST_VAR", "second");
    assert_eq!(output_of(task), ("second".to_owned(), 0));
}

#[test]
fn env_clear_drops_inherited() {
    // PATH is set in any reasonable test environment; with env_clear the
    // child must not see it.
    let task = Task::new("sh")
        .args(["-c", r#"printf '%s' "$PATH""#])
        .env_clear();
    assert_eq!(output_of(task), ("".to_owned(), 0));
}

#[test]
fn cwd_changes_working_directory() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().canonicalize().unwrap();
    let task = Task::new("pwd").cwd(&dir);
    assert_eq!(output_of(task), (format!("{}\n", dir.display()), 0));
}

#[test]
fn stdin_channel_feeds_child() {
    let input = PipeChannel::new().unwrap();
    let out = PipeChannel::new().unwrap();
    let task = Task::new("cat")
        .stdin(StreamEndpoint::Pipe(input.clone()))
        .stdout(StreamEndpoint::Pipe(out.clone()));
    task.run_async().unwrap();
    input.write(b"over the wire").unwrap();
    input.close_write();
    assert_eq!(out.read_all().unwrap(), b"over the wire");
    assert_eq!(task.finish().unwrap(), 0);
}

#[test]
fn null_endpoints() {
    let task = Task::new("cat")
        .stdin(StreamEndpoint::Null)
        .stdout(StreamEndpoint::Null);
    assert_eq!(task.run_sync().unwrap(), 0);
}

#[test]
fn line_sink_rejected_for_stdin() {
    let consumer = LineConsumer::new(|_| ()).unwrap();
    let err = Task::new("cat")
        .stdin(StreamEndpoint::LineSink(consumer))
        .run_sync()
        .unwrap_err();
    assert!(matches!(err, Error::SpawnFailure { .. }));
}

#[test]
fn channel_end_cannot_be_bound_twice() {
    let ch = PipeChannel::new().unwrap();
    let err = Task::new("sh")
        .args(["-c", "true"])
        .stdout(StreamEndpoint::Pipe(ch.clone()))
        .stderr(StreamEndpoint::Pipe(ch))
        .run_sync()
        .unwrap_err();
    assert!(matches!(err, Error::SpawnFailure { .. }));
}

#[test]
fn two_stage_pipeline() {
    let out = PipeChannel::new().unwrap();
    let (producer, filter) = pipe(
        Task::new("printf").arg("foo\nbar\nbaz\n"),
        Task::new("grep")
            .arg("ba")
            .stdout(StreamEndpoint::Pipe(out.clone())),
    )
    .unwrap();
    producer.run_async().unwrap();
    filter.run_async().unwrap();
    assert_eq!(out.read_all().unwrap(), b"bar\nbaz\n");
    assert_eq!(producer.finish().unwrap(), 0);
    assert_eq!(filter.finish().unwrap(), 0);
}

#[test]
fn pipeline_streams_without_deadlock() {
    // Far more data than a kernel pipe buffer holds; only concurrent
    // producer/consumer progress lets this finish.
    let out = PipeChannel::new().unwrap();
    let (producer, counter) = pipe(
        Task::new("seq").args(["1", "100000"]),
        Task::new("wc")
            .arg("-l")
            .stdout(StreamEndpoint::Pipe(out.clone())),
    )
    .unwrap();
    producer.run_async().unwrap();
    counter.run_async().unwrap();
    let counted = out.read_all().unwrap();
    assert_eq!(String::from_utf8(counted).unwrap().trim(), "100000");
    assert_eq!(producer.finish().unwrap(), 0);
    assert_eq!(counter.finish().unwrap(), 0);
}
