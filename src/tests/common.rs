use crate::{PipeChannel, StreamEndpoint, Task};

/// Runs the task with its stdout connected to a fresh channel and returns
/// everything it printed along with its exit code.
pub fn output_of(task: Task) -> (String, i32) {
    let out = PipeChannel::new().unwrap();
    let task = task.stdout(StreamEndpoint::Pipe(out.clone()));
    task.run_async().unwrap();
    let bytes = out.read_all().unwrap();
    let code = task.finish().unwrap();
    (String::from_utf8(bytes).unwrap(), code)
}
