// Copyright (c) 2024 Mike Tsao

use crossbeam::channel::{Receiver, Sender};

/// A convenience struct to bundle both halves of a crossbeam channel together.
///
/// Cloning yields another handle to the same channel, so one clone can send
/// while another drains.
#[derive(Clone, Debug)]
pub struct CrossbeamChannel<T> {
    #[allow(missing_docs)]
    pub sender: Sender<T>,
    #[allow(missing_docs)]
    pub receiver: Receiver<T>,
}
impl<T> Default for CrossbeamChannel<T> {
    fn default() -> Self {
        let (sender, receiver) = crossbeam::channel::unbounded();
        Self { sender, receiver }
    }
}
impl<T> CrossbeamChannel<T> {
    /// Takes everything queued so far without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossbeam_channel() {
        let channel = CrossbeamChannel::default();

        let _ = channel.sender.send(42);

        assert_eq!(channel.receiver.recv().unwrap(), 42);
    }

    #[test]
    fn clones_share_the_queue() {
        let channel = CrossbeamChannel::default();
        let other = channel.clone();
        let _ = other.sender.send(1);
        let _ = other.sender.send(2);
        assert_eq!(channel.drain(), vec![1, 2]);
        assert!(other.drain().is_empty());
    }
}
