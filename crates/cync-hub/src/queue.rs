//! Outbound command queue
//!
//! Packets wait here until the relay session is authenticated. Entries are
//! never dropped or reordered, and the queue is unbounded: a long outage
//! grows it for as long as the process lives. An entry leaves the queue once
//! the socket accepts it; entries the socket refused go back to the head.

use bytes::Bytes;
use cync_core::Packet;
use std::collections::VecDeque;

/// A framed packet waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub seq: Option<u16>,
    pub data: Bytes,
}

impl From<&Packet> for QueuedPacket {
    fn from(packet: &Packet) -> Self {
        Self {
            seq: packet.seq,
            data: packet.encode(),
        }
    }
}

/// FIFO of not-yet-sent packets
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<QueuedPacket>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, packet: &Packet) {
        self.entries.push_back(QueuedPacket::from(packet));
    }

    /// Remove every entry in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedPacket> + '_ {
        self.entries.drain(..)
    }

    /// Put entries that could not be written back at the head, in order
    pub fn requeue_front(&mut self, entries: Vec<QueuedPacket>) {
        for entry in entries.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cync_core::command;

    #[test]
    fn test_drain_in_arrival_order() {
        let mut queue = CommandQueue::new();
        queue.enqueue(&command::connection_query(1, 10));
        queue.enqueue(&command::ping());
        queue.enqueue(&command::connection_query(2, 11));
        assert_eq!(queue.len(), 3);

        let seqs: Vec<_> = queue.drain().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![Some(10), None, Some(11)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_goes_ahead_of_newer_entries() {
        let mut queue = CommandQueue::new();
        queue.enqueue(&command::connection_query(1, 10));
        queue.enqueue(&command::connection_query(2, 11));
        let unsent: Vec<_> = queue.drain().collect();

        queue.enqueue(&command::connection_query(3, 12));
        queue.requeue_front(unsent);

        let seqs: Vec<_> = queue.drain().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![Some(10), Some(11), Some(12)]);
    }
}
