//! Output buffer queue.
//!
//! The receiver writes each frame to a single destination buffer. Buffers are
//! supplied by a [`BufferQueue`]: the buffer at the head of the queue is the
//! one being written, and it is completed when the receiver signals the end of
//! the frame.

use std::collections::VecDeque;

/// Queue of destination buffers.
///
/// All the methods are called with the receiver lock held, including from the
/// interrupt handler, so they must not block.
pub trait BufferQueue {
    /// Buffer handle.
    type Buffer;

    /// Adds a buffer to the tail of the queue.
    ///
    /// Returns the address of the buffer if it has become the head of the
    /// queue, which means that it should be programmed into the hardware
    /// immediately.
    fn queue(&mut self, buffer: Self::Buffer) -> Option<u32>;

    /// Completes the buffer at the head of the queue.
    ///
    /// Returns the address of the new head, or `None` if the queue has run
    /// empty.
    fn next_buffer(&mut self) -> Option<u32>;

    /// Returns all the queued buffers to their owner without completing them.
    fn flush(&mut self);
}

/// Frame buffer in a DMA ring.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FrameBuffer {
    /// Index of the buffer in the ring.
    pub index: usize,
    /// Device address of the buffer.
    pub addr: u32,
}

/// [`BufferQueue`] of [`FrameBuffer`]s.
///
/// Completed buffers are kept until they are collected with
/// [`FrameQueue::take_done`]. Flushed buffers are kept until they are
/// collected with [`FrameQueue::take_idle`].
#[derive(Debug, Default, Clone)]
pub struct FrameQueue {
    pending: VecDeque<FrameBuffer>,
    done: Vec<FrameBuffer>,
    idle: Vec<FrameBuffer>,
}

impl FrameQueue {
    /// Creates an empty queue.
    pub fn new() -> FrameQueue {
        FrameQueue::default()
    }

    /// Gives the number of buffers waiting to be written, including the one
    /// currently being written.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Gives the buffer currently being written.
    pub fn active(&self) -> Option<&FrameBuffer> {
        self.pending.front()
    }

    /// Gives the buffers that have been completed and not yet taken.
    pub fn done(&self) -> &[FrameBuffer] {
        &self.done
    }

    /// Takes the buffers that have been completed, in completion order.
    pub fn take_done(&mut self) -> Vec<FrameBuffer> {
        std::mem::take(&mut self.done)
    }

    /// Takes the buffers that have been flushed.
    pub fn take_idle(&mut self) -> Vec<FrameBuffer> {
        std::mem::take(&mut self.idle)
    }
}

impl BufferQueue for FrameQueue {
    type Buffer = FrameBuffer;

    fn queue(&mut self, buffer: FrameBuffer) -> Option<u32> {
        self.pending.push_back(buffer);
        if self.pending.len() == 1 {
            Some(buffer.addr)
        } else {
            None
        }
    }

    fn next_buffer(&mut self) -> Option<u32> {
        if let Some(buffer) = self.pending.pop_front() {
            self.done.push(buffer);
        }
        self.pending.front().map(|buffer| buffer.addr)
    }

    fn flush(&mut self) {
        self.idle.extend(self.pending.drain(..));
    }
}
