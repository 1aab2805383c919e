use std::thread;

use crate::{Error, PipeChannel};

#[test]
fn write_then_read_all() {
    let ch = PipeChannel::new().unwrap();
    ch.write(b"hello ").unwrap();
    ch.write(b"world").unwrap();
    ch.close_write();
    assert_eq!(ch.read_all().unwrap(), b"hello world");
}

#[test]
fn read_all_of_empty_channel() {
    let ch = PipeChannel::new().unwrap();
    ch.close_write();
    assert_eq!(ch.read_all().unwrap(), b"");
}

#[test]
fn write_after_close_fails() {
    let ch = PipeChannel::new().unwrap();
    ch.close_write();
    assert!(matches!(ch.write(b"x"), Err(Error::ChannelClosed)));
}

#[test]
fn close_write_is_idempotent() {
    let ch = PipeChannel::new().unwrap();
    ch.write(b"data").unwrap();
    ch.close_write();
    ch.close_write();
    assert_eq!(ch.read_all().unwrap(), b"data");
}

#[test]
fn write_without_reader_fails() {
    let ch = PipeChannel::new().unwrap();
    drop(ch.take_read_end().unwrap());
    // Exceed the kernel pipe buffer so the broken pipe is observed even
    // if the first chunks are accepted.
    let chunk = vec![b'x'; 65536];
    let result = (0..32).try_for_each(|_| ch.write(&chunk));
    assert!(matches!(result, Err(Error::ChannelClosed)));
}

#[test]
fn large_transfer_with_backpressure() {
    let ch = PipeChannel::new().unwrap();
    let writer = ch.clone();
    let t = thread::spawn(move || {
        let chunk = vec![b'y'; 4096];
        for _ in 0..256 {
            writer.write(&chunk).unwrap();
        }
        writer.close_write();
    });
    let data = ch.read_all().unwrap();
    t.join().unwrap();
    assert_eq!(data.len(), 4096 * 256);
    assert!(data.iter().all(|&b| b == b'y'));
}
