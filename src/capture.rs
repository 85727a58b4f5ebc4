//! Frame capture.
//!
//! This module contains the consumer of the frames that the receiver writes to
//! memory. Completed buffers are read, published to the WebSocket clients and
//! handed back to the receiver.

use crate::buffer::FrameBuffer;
use crate::format::{Family, Pad, PadFormat};
use crate::interrupt::InterruptWaiter;
use crate::isp::Csi2Receiver;
use crate::rxbuffer::RxBuffer;
use anyhow::Result;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Frame capture.
///
/// This struct waits for the frames completed by the receiver, reads them from
/// the frame buffer ring and sends them (as [`Bytes`]) into a
/// [`tokio::sync::broadcast::Sender`]. Each buffer is queued to the receiver
/// again after it has been read.
#[derive(Debug)]
pub struct Capture {
    receiver: Arc<Mutex<Csi2Receiver>>,
    frames: RxBuffer,
    interrupt: InterruptWaiter,
    sender: broadcast::Sender<Bytes>,
}

impl Capture {
    /// Creates a new frame capture.
    ///
    /// All the buffers of the `frames` ring are queued to the receiver. The
    /// `interrupt` parameter should be the waiter for the frames completed by
    /// the receiver.
    pub fn new(
        receiver: Arc<Mutex<Csi2Receiver>>,
        frames: RxBuffer,
        interrupt: InterruptWaiter,
        sender: broadcast::Sender<Bytes>,
    ) -> Capture {
        {
            let mut receiver = receiver.lock().unwrap();
            for buffer in frames.frame_buffers() {
                receiver.queue_buffer(buffer);
            }
        }
        Capture {
            receiver,
            frames,
            interrupt,
            sender,
        }
    }

    /// Runs the frame capture.
    ///
    /// This function only returns if there is an error. The function should be
    /// run concurrently with the rest of the application for the frames to be
    /// captured.
    #[tracing::instrument(name = "capture", skip_all)]
    pub async fn run(self) -> Result<()> {
        loop {
            self.interrupt.wait().await;
            let (done, size) = {
                let mut receiver = self.receiver.lock().unwrap();
                let done = receiver.queue_mut().take_done();
                (done, frame_size(&receiver.format(Pad::Source)))
            };
            // The buffers are not queued while they are read, so the receiver
            // cannot write to them.
            for &buffer in &done {
                self.publish(buffer, size)?;
            }
            let mut receiver = self.receiver.lock().unwrap();
            for buffer in done {
                receiver.queue_buffer(buffer);
            }
        }
    }

    fn publish(&self, buffer: FrameBuffer, frame_size: usize) -> Result<()> {
        tracing::trace!(index = buffer.index, addr = buffer.addr, "frame done");
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.frames.cache_invalidate(buffer.index)?;
        let data = self.frames.buffer_as_slice(buffer.index);
        let len = frame_size.min(data.len());
        // It is ok if send returns Err, because there might be no receiver
        // handles in this moment.
        let _ = self.sender.send(Bytes::copy_from_slice(&data[..len]));
        Ok(())
    }
}

/// Gives the size in bytes of the frames written to memory with a source
/// format.
///
/// 10-bit samples are written expanded to 16 bits. DPCM-compressed samples
/// are written as 8 bits.
fn frame_size(format: &PadFormat) -> usize {
    let bytes_per_pixel = match format.code.family() {
        Some(Family::Raw10Dpcm8) => 1,
        _ => 2,
    };
    format.width as usize * format.height as usize * bytes_per_pixel
}
