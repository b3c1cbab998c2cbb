//! Event channel built on crossbeam-channel.
//!
//! The pipeline owns the sending side and never waits on it: the channel is
//! unbounded and a missing listener is not an error.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Sends events from the pipeline and its workers.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Send a batch, task or cache event.
    ///
    /// If the receiver is gone the event is dropped; a batch never fails
    /// because nobody is listening.
    pub fn send(&self, event: impl Into<Event>) {
        let _ = self.inner.send(event.into());
    }
}

/// Receives events on the consumer side (CLI progress bar, tests).
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Events in send order, ending once every sender has been dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }

    /// Take every event already queued without waiting for more
    pub fn drain(&self) -> Vec<Event> {
        self.inner.try_iter().collect()
    }
}

/// Constructor for sender/receiver pairs.
pub struct EventChannel;

impl EventChannel {
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender for runs nobody observes
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
