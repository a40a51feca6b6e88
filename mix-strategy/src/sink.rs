use crossbeam::channel;

use crate::message::{Direction, Message};

/// Downstream hand-off for released messages.
///
/// Releases are fire-and-forget: a sink logs its own failures and the
/// engine never retries. Batches are never empty.
pub trait Sink: Send + Sync {
    fn release_requests(&self, messages: Vec<Message>);
    fn release_replies(&self, messages: Vec<Message>);

    fn release(&self, direction: Direction, messages: Vec<Message>) {
        match direction {
            Direction::Request => self.release_requests(messages),
            Direction::Reply => self.release_replies(messages),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub direction: Direction,
    pub messages: Vec<Message>,
}

/// Forwards every release over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: channel::Sender<Release>,
}

impl ChannelSink {
    pub fn new(sender: channel::Sender<Release>) -> Self {
        Self { sender }
    }

    pub fn unbounded() -> (Self, channel::Receiver<Release>) {
        let (sender, receiver) = channel::unbounded();
        (Self::new(sender), receiver)
    }

    fn forward(&self, direction: Direction, messages: Vec<Message>) {
        let count = messages.len();
        if self.sender.send(Release { direction, messages }).is_err() {
            tracing::warn!(%direction, count, "release receiver is gone, dropping batch");
        }
    }
}

impl Sink for ChannelSink {
    fn release_requests(&self, messages: Vec<Message>) {
        self.forward(Direction::Request, messages)
    }

    fn release_replies(&self, messages: Vec<Message>) {
        self.forward(Direction::Reply, messages)
    }
}
