//! Where a child's standard streams are connected.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};

use crate::channel::PipeChannel;
use crate::lines::LineConsumer;

pub const NULL_DEVICE: &str = "/dev/null";

/// Instruction what to do with one standard stream of a spawned process.
///
/// An endpoint is bound to the child's stream when the task spawns;
/// dispatch happens on the variant tag at that point.
#[derive(Debug, Default)]
pub enum StreamEndpoint {
    /// The child shares the host's corresponding stream.
    #[default]
    Inherit,

    /// The stream is connected to the null device: reads return EOF
    /// immediately, writes are discarded.
    Null,

    /// The stream is connected to one end of a [`PipeChannel`]: the read
    /// end for stdin, the write end for stdout/stderr.  The other end
    /// stays with the host, or with another task sharing the channel.
    Pipe(PipeChannel),

    /// Output bytes are routed into a [`LineConsumer`]'s internal channel.
    ///
    /// Only valid for stdout/stderr; using it for stdin is a spawn-time
    /// error.
    LineSink(LineConsumer),
}

impl StreamEndpoint {
    /// Produces the file the child should `dup2` onto this stream's
    /// descriptor, or `None` to inherit the host's.
    pub(crate) fn child_end(&self, input: bool) -> io::Result<Option<File>> {
        match self {
            StreamEndpoint::Inherit => Ok(None),
            StreamEndpoint::Null => {
                let file = if input {
                    OpenOptions::new().read(true).open(NULL_DEVICE)?
                } else {
                    OpenOptions::new().write(true).open(NULL_DEVICE)?
                };
                Ok(Some(file))
            }
            StreamEndpoint::Pipe(channel) => {
                let end = if input {
                    channel.take_read_end()
                } else {
                    channel.take_write_end()
                };
                end.map(Some).ok_or_else(already_bound)
            }
            StreamEndpoint::LineSink(consumer) => {
                if input {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        "LineSink is only valid for output streams",
                    ));
                }
                consumer
                    .channel()
                    .take_write_end()
                    .map(Some)
                    .ok_or_else(already_bound)
            }
        }
    }
}

fn already_bound() -> io::Error {
    io::Error::new(
        ErrorKind::InvalidInput,
        "channel end already bound to another party",
    )
}
