mod common;

mod channel;
mod task;

use crate::{Capture, Error, LineConsumer, PipeChannel, StreamEndpoint, Task};

#[test]
fn public_types_are_send_and_sync() {
    fn assert_both<T: Send + Sync>() {}
    assert_both::<Task>();
    assert_both::<PipeChannel>();
    assert_both::<LineConsumer>();
    assert_both::<StreamEndpoint>();
    assert_both::<Capture>();
    assert_both::<Error>();
}
