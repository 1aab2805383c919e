//! Line-oriented consumption of a byte stream.

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::channel::PipeChannel;

/// Reshapes a byte stream into newline-delimited records.
///
/// A `LineConsumer` owns a private [`PipeChannel`] and a background thread
/// that drains its read end, invoking the callback once per complete line
/// (trailing newline stripped) as soon as it is read.  A non-empty
/// unterminated final line is delivered at end-of-stream.
///
/// The callback runs on the background thread, never on the caller's;
/// shared state it touches must be synchronized.
///
/// Attach a consumer to a process with [`StreamEndpoint::LineSink`], which
/// hands the channel's write end to the child; `Clone` is cheap, so keep a
/// handle around to [`wait`](Self::wait) on after the process exits.
///
/// Dropping the last handle half-closes the internal channel, so the
/// drain thread of a consumer that was never attached to a process shuts
/// down instead of blocking forever on a write end nobody can feed.
///
/// [`StreamEndpoint::LineSink`]: crate::StreamEndpoint::LineSink
#[derive(Clone)]
pub struct LineConsumer(Arc<Handle>);

// Public handles share one Handle; the drain thread holds Inner directly,
// so the Handle dropping does not tear down state the thread still needs.
struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        // No-op when a spawned process took the write end; otherwise this
        // is the EOF that lets the drain thread exit.
        self.inner.channel.close_write();
    }
}

struct Inner {
    channel: PipeChannel,
    lines: AtomicUsize,
    joined: Mutex<bool>,
    done: Condvar,
}

impl LineConsumer {
    /// Creates a consumer and immediately starts its drain thread.
    ///
    /// Lines are decoded as UTF-8, with invalid sequences replaced by
    /// `U+FFFD`.  A read failure on the source is treated as
    /// end-of-stream, so [`wait`](Self::wait) always returns.
    pub fn new<F>(mut callback: F) -> io::Result<LineConsumer>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let channel = PipeChannel::new()?;
        let source = channel
            .take_read_end()
            .expect("fresh channel has a read end");
        let inner = Arc::new(Inner {
            channel,
            lines: AtomicUsize::new(0),
            joined: Mutex::new(false),
            done: Condvar::new(),
        });
        let drain = Arc::clone(&inner);
        thread::spawn(move || {
            let mut reader = BufReader::new(source);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    // A torn-down source counts as end-of-stream.
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                callback(&String::from_utf8_lossy(&buf));
                drain.lines.fetch_add(1, Ordering::SeqCst);
            }
            *drain.joined.lock().unwrap() = true;
            drain.done.notify_all();
        });
        Ok(LineConsumer(Arc::new(Handle { inner })))
    }

    /// Blocks until the drain thread has observed end-of-stream and
    /// dispatched the final line.
    ///
    /// Safe to call before, during, or after the producing process has
    /// exited, repeatedly, and from multiple threads.
    pub fn wait(&self) {
        let inner = &self.0.inner;
        let mut joined = inner.joined.lock().unwrap();
        while !*joined {
            joined = inner.done.wait(joined).unwrap();
        }
    }

    /// Number of callback invocations so far.
    pub fn line_count(&self) -> usize {
        self.0.inner.lines.load(Ordering::SeqCst)
    }

    /// True once the source has reached end-of-stream and all lines have
    /// been dispatched.
    pub fn joined(&self) -> bool {
        *self.0.inner.joined.lock().unwrap()
    }

    /// The channel whose write end feeds this consumer.
    pub(crate) fn channel(&self) -> &PipeChannel {
        &self.0.inner.channel
    }
}

impl fmt::Debug for LineConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConsumer")
            .field("lines", &self.line_count())
            .field("joined", &self.joined())
            .finish_non_exhaustive()
    }
}
