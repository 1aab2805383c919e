//! The OS-backed byte channel connecting one writer to one reader.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::posix;

/// A bounded, unidirectional byte channel backed by an OS pipe.
///
/// A `PipeChannel` is shared by exactly two parties: one writer and one
/// reader.  Either party may be the host program or a spawned process;
/// binding a channel to a child's standard stream (via
/// [`StreamEndpoint::Pipe`]) hands the corresponding end to the child and
/// fixes that party's identity for the life of the channel.
///
/// `Clone` is cheap and produces a handle to the same channel.
///
/// Backpressure comes from the bounded kernel pipe buffer: [`write`]
/// blocks once the buffer is full until the reader drains it, which is
/// what lets two-process pipelines run concurrently without the host
/// buffering unbounded data.
///
/// [`StreamEndpoint::Pipe`]: crate::StreamEndpoint::Pipe
/// [`write`]: Self::write
#[derive(Clone, Debug)]
pub struct PipeChannel(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    read: Mutex<Option<File>>,
    write: Mutex<Option<File>>,
}

impl PipeChannel {
    /// Creates a channel over a fresh OS pipe.
    ///
    /// Both ends are created close-on-exec so that unrelated children
    /// never inherit them; binding to a child stream goes through `dup2`,
    /// which clears the flag on the child's descriptor.
    pub fn new() -> io::Result<PipeChannel> {
        let (read, write) = posix::pipe()?;
        posix::set_cloexec(&read)?;
        posix::set_cloexec(&write)?;
        Ok(PipeChannel(Arc::new(Inner {
            read: Mutex::new(Some(read)),
            write: Mutex::new(Some(write)),
        })))
    }

    /// Writes all of `bytes` into the channel, in call order.
    ///
    /// Partial writes are retried until every byte has been accepted by
    /// the kernel.  Blocks while the pipe buffer is full.  Fails with
    /// [`Error::ChannelClosed`] if the write end was half-closed or has
    /// been handed to a spawned process, or if the reading side is gone.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut end = self.0.write.lock().unwrap();
        let Some(file) = end.as_mut() else {
            return Err(Error::ChannelClosed);
        };
        match file.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                end.take();
                Err(Error::ChannelClosed)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Half-closes the channel: drops the write end so readers observe
    /// end-of-stream once buffered data is consumed.  Idempotent;
    /// subsequent [`write`](Self::write) calls fail.
    pub fn close_write(&self) {
        self.0.write.lock().unwrap().take();
    }

    /// Reads until end-of-stream and returns everything written, in write
    /// order.
    ///
    /// Blocks (without consuming CPU) until every write-end descriptor is
    /// closed - by [`close_write`](Self::close_write), or by the exit of a
    /// process holding one.  Returns empty bytes if the read end has been
    /// handed to a spawned process.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut end = self.0.read.lock().unwrap();
        let Some(file) = end.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Removes and returns the read end, fixing the reader's identity.
    pub(crate) fn take_read_end(&self) -> Option<File> {
        self.0.read.lock().unwrap().take()
    }

    /// Removes and returns the write end, fixing the writer's identity.
    pub(crate) fn take_write_end(&self) -> Option<File> {
        self.0.write.lock().unwrap().take()
    }
}
