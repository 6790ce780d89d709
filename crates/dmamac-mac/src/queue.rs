//! Bounded outgoing data queue.
//!
//! Frames wait here for the node's transmit slot. The queue never signals
//! backpressure upward: at capacity a new frame is simply dropped and
//! counted. Actuator traffic being forwarded down the tree is the one
//! exception, it evicts the head to make room, since a stalled actuator
//! command is worse than a lost sensor reading.
//!
//! Retransmission carries no counter of its own. The head frame stays queued
//! until an ACK confirms it or the schedule offers no further transmit slot
//! (see the ack-timeout handling in the state machine), so the slot tables
//! bound the number of attempts.

use dmamac_common::Frame;
use std::collections::VecDeque;

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Frame is resident in the queue.
    Queued,
    /// Queue was full; the frame was dropped.
    Dropped,
    /// Queue was full; the head was evicted to admit the frame.
    Evicted,
}

/// Bounded FIFO of outgoing data frames.
#[derive(Debug)]
pub struct OutgoingQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl OutgoingQueue {
    pub fn new(capacity: usize) -> Self {
        OutgoingQueue {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail; drops the frame when at capacity.
    pub fn enqueue(&mut self, frame: Frame) -> EnqueueResult {
        if self.frames.len() >= self.capacity {
            return EnqueueResult::Dropped;
        }
        self.frames.push_back(frame);
        EnqueueResult::Queued
    }

    /// Append at the tail, evicting the head when at capacity.
    pub fn enqueue_evicting(&mut self, frame: Frame) -> EnqueueResult {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            self.frames.push_back(frame);
            return EnqueueResult::Evicted;
        }
        self.frames.push_back(frame);
        EnqueueResult::Queued
    }

    /// Remove and return the head frame.
    pub fn dequeue_head(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Inspect the head frame without removing it.
    pub fn peek_head(&self) -> Option<&Frame> {
        self.frames.front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
