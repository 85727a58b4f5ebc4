//! Interrupt handling.
//!
//! This module implements the interrupt handler of the [`Receiver`] and the
//! buffer exchange that it performs at the end of each frame written to
//! memory. The handler never blocks. It is called with the receiver lock held
//! by the interrupt dispatcher in [`crate::interrupt`].

use crate::buffer::BufferQueue;
use crate::error::Error;
use crate::format::Output;
use crate::receiver::Receiver;
use crate::regs::{csi2, main, Block, RegisterIo};

const TRANSMISSION_ERRORS: u32 = csi2::IRQSTATUS_OCP_ERR
    | csi2::IRQSTATUS_SHORT_PACKET
    | csi2::IRQSTATUS_ECC_NO_CORRECTION
    | csi2::IRQSTATUS_COMPLEXIO2_ERR
    | csi2::IRQSTATUS_FIFO_OVF;

/// Result of a buffer exchange.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Exchange {
    /// The next buffer was programmed and the context was enabled again.
    Next(u32),
    /// No buffer was available. The context stays disabled until a buffer is
    /// queued.
    Underrun,
}

/// Events handled by one invocation of the interrupt handler.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct IsrEvents {
    /// Top-level interrupt status.
    pub status: u32,
    /// Complex I/O interrupt status, if a complex I/O error was signalled.
    pub complexio: Option<u32>,
    /// A transmission error was signalled.
    pub transmission_error: bool,
    /// Buffer exchange done at the end of a frame written to memory.
    pub exchange: Option<Exchange>,
}

impl IsrEvents {
    /// Returns `true` if a frame was completed in memory.
    pub fn frame_done(&self) -> bool {
        self.exchange.is_some()
    }

    /// Converts a transmission error into an [`Error::TransmissionError`].
    pub fn check(&self) -> Result<(), Error> {
        if self.transmission_error {
            Err(Error::TransmissionError(self.status))
        } else {
            Ok(())
        }
    }
}

impl<R: RegisterIo, Q: BufferQueue> Receiver<R, Q> {
    /// Handles a receiver interrupt.
    ///
    /// Reads and clears the interrupt status, and classifies it. Transmission
    /// errors do not stop the stream. They are reported in the returned
    /// [`IsrEvents`], together with the buffer exchange done if context 0
    /// signalled the end of a frame written to memory.
    pub fn isr(&mut self) -> Result<IsrEvents, Error> {
        if !self.available {
            return Err(Error::DeviceUnavailable);
        }
        let status = self.regs.read(Block::Csi2, csi2::IRQSTATUS);
        self.regs.write(Block::Csi2, csi2::IRQSTATUS, status);
        let mut events = IsrEvents {
            status,
            ..Default::default()
        };

        if status & csi2::IRQSTATUS_COMPLEXIO1_ERR != 0 {
            let complexio = self.regs.read(Block::Csi2, csi2::PHY_IRQSTATUS);
            self.regs
                .write(Block::Csi2, csi2::PHY_IRQSTATUS, complexio);
            tracing::debug!("complex I/O error {complexio:#010x}");
            events.complexio = Some(complexio);
            events.transmission_error = true;
        }

        if status & TRANSMISSION_ERRORS != 0 {
            tracing::debug!(
                ocp = status & csi2::IRQSTATUS_OCP_ERR != 0,
                short_packet = status & csi2::IRQSTATUS_SHORT_PACKET != 0,
                ecc = status & csi2::IRQSTATUS_ECC_NO_CORRECTION != 0,
                complexio2 = status & csi2::IRQSTATUS_COMPLEXIO2_ERR != 0,
                fifo_overflow = status & csi2::IRQSTATUS_FIFO_OVF != 0,
                "receiver error"
            );
            events.transmission_error = true;
        }

        if status & csi2::irqstatus_context(0) != 0 {
            let ctx_status = self.regs.read(Block::Csi2, csi2::ctx_irqstatus(0));
            self.regs
                .write(Block::Csi2, csi2::ctx_irqstatus(0), ctx_status);
            if ctx_status & csi2::CTX_IRQSTATUS_FE != 0 && self.output.contains(Output::MEMORY) {
                events.exchange = Some(self.exchange_buffer());
            }
        }

        if status & csi2::IRQSTATUS_ECC_CORRECTION != 0 {
            tracing::debug!("ECC correction done");
        }

        if events.transmission_error {
            self.stats.transmission_errors += 1;
            tracing::warn!("transmission error (status {status:#010x})");
        }
        Ok(events)
    }

    /// Handles an ISP interrupt.
    ///
    /// Reads and clears the ISP top-level interrupt status and calls
    /// [`Receiver::isr`] if the receiver interrupt is pending. Returns `None`
    /// if the interrupt did not come from the receiver.
    pub fn isp_isr(&mut self) -> Result<Option<IsrEvents>, Error> {
        let status = self.regs.read(Block::Main, main::IRQ0STATUS) & main::IRQ0_CSIA;
        if status == 0 {
            return Ok(None);
        }
        self.regs.write(Block::Main, main::IRQ0STATUS, status);
        self.isr().map(Some)
    }

    /// Enables or disables the receiver interrupt at the ISP top level.
    ///
    /// A pending receiver interrupt is cleared before enabling it.
    pub fn isp_irq_enable(&mut self, enable: bool) {
        if enable {
            self.regs
                .write(Block::Main, main::IRQ0STATUS, main::IRQ0_CSIA);
            self.regs
                .set_bits(Block::Main, main::IRQ0ENABLE, main::IRQ0_CSIA);
        } else {
            self.regs
                .clr_bits(Block::Main, main::IRQ0ENABLE, main::IRQ0_CSIA);
        }
    }

    fn exchange_buffer(&mut self) -> Exchange {
        self.context_enable(false);
        self.stats.frames += 1;
        match self.queue.next_buffer() {
            None => {
                self.buffers_ready = false;
                self.underrun = true;
                self.stats.underruns += 1;
                tracing::warn!("buffer underrun");
                Exchange::Underrun
            }
            Some(addr) => {
                self.contexts[0].set_output_address(&mut self.regs, addr);
                self.context_enable(true);
                tracing::trace!("next buffer {addr:#010x}");
                Exchange::Next(addr)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{Pad, Revision};
    use crate::receiver::test::{ctx0_enabled, frame, interface_enabled, receiver, FakeReceiver};
    use crate::receiver::{Remote, StreamState};
    use std::sync::{Arc, Mutex};

    fn streaming_to_memory(buffers: usize) -> FakeReceiver {
        let mut receiver = receiver(Revision::Legacy);
        receiver
            .link_setup(Pad::Source, Remote::VideoNode, true)
            .unwrap();
        for n in 0..buffers {
            receiver.queue_buffer(frame(n));
        }
        receiver.start_stream().unwrap();
        receiver
    }

    fn raise_frame_end(receiver: &mut FakeReceiver) {
        receiver
            .regs
            .raise(Block::Csi2, csi2::ctx_irqstatus(0), csi2::CTX_IRQSTATUS_FE);
        receiver
            .regs
            .raise(Block::Csi2, csi2::IRQSTATUS, csi2::irqstatus_context(0));
    }

    #[test]
    fn complexio_error_only() {
        let mut receiver = streaming_to_memory(2);
        receiver
            .regs
            .raise(Block::Csi2, csi2::PHY_IRQSTATUS, 0x0000_0021);
        receiver
            .regs
            .raise(Block::Csi2, csi2::IRQSTATUS, csi2::IRQSTATUS_COMPLEXIO1_ERR);
        let events = receiver.isr().unwrap();
        assert_eq!(events.complexio, Some(0x21));
        assert_eq!(events.exchange, None);
        assert_eq!(
            events.check(),
            Err(Error::TransmissionError(csi2::IRQSTATUS_COMPLEXIO1_ERR))
        );
        assert_eq!(receiver.regs.get(Block::Csi2, csi2::IRQSTATUS), 0);
        assert_eq!(receiver.regs.get(Block::Csi2, csi2::PHY_IRQSTATUS), 0);
        assert_eq!(receiver.stats().transmission_errors, 1);
        assert_eq!(receiver.stats().frames, 0);
        // errors do not stop the stream
        assert_eq!(receiver.state(), StreamState::Streaming);
        assert!(ctx0_enabled(&receiver));
    }

    #[test]
    fn frame_end_only() {
        let mut receiver = streaming_to_memory(2);
        raise_frame_end(&mut receiver);
        let events = receiver.isr().unwrap();
        assert_eq!(events.exchange, Some(Exchange::Next(frame(1).addr)));
        assert_eq!(events.check(), Ok(()));
        assert_eq!(receiver.queue().done().len(), 1);
        assert_eq!(
            receiver.regs.get(Block::Csi2, csi2::ctx_dat_ping_addr(0)),
            frame(1).addr
        );
        assert_eq!(
            receiver.regs.get(Block::Csi2, csi2::ctx_dat_pong_addr(0)),
            frame(1).addr
        );
        assert!(ctx0_enabled(&receiver));
        assert_eq!(receiver.regs.get(Block::Csi2, csi2::ctx_irqstatus(0)), 0);
        assert_eq!(receiver.stats().frames, 1);
        assert_eq!(receiver.stats().transmission_errors, 0);
    }

    #[test]
    fn frame_end_and_error() {
        let mut receiver = streaming_to_memory(2);
        raise_frame_end(&mut receiver);
        receiver.regs.raise(
            Block::Csi2,
            csi2::IRQSTATUS,
            csi2::IRQSTATUS_COMPLEXIO1_ERR | csi2::IRQSTATUS_FIFO_OVF,
        );
        let events = receiver.isr().unwrap();
        assert!(events.frame_done());
        assert!(events.transmission_error);
        assert!(matches!(events.check(), Err(Error::TransmissionError(_))));
        assert_eq!(receiver.queue().done().len(), 1);
        assert_eq!(receiver.stats().transmission_errors, 1);
    }

    #[test]
    fn each_error_source() {
        for bit in [
            csi2::IRQSTATUS_OCP_ERR,
            csi2::IRQSTATUS_SHORT_PACKET,
            csi2::IRQSTATUS_ECC_NO_CORRECTION,
            csi2::IRQSTATUS_COMPLEXIO2_ERR,
            csi2::IRQSTATUS_FIFO_OVF,
        ] {
            let mut receiver = streaming_to_memory(1);
            receiver.regs.raise(Block::Csi2, csi2::IRQSTATUS, bit);
            let events = receiver.isr().unwrap();
            assert_eq!(events.check(), Err(Error::TransmissionError(bit)));
            assert_eq!(events.complexio, None);
        }
    }

    #[test]
    fn ecc_correction_is_not_an_error() {
        let mut receiver = streaming_to_memory(1);
        receiver
            .regs
            .raise(Block::Csi2, csi2::IRQSTATUS, csi2::IRQSTATUS_ECC_CORRECTION);
        let events = receiver.isr().unwrap();
        assert_eq!(events.check(), Ok(()));
        assert!(!events.frame_done());
        assert_eq!(receiver.stats().transmission_errors, 0);
    }

    #[test]
    fn frame_end_without_memory_output() {
        let mut receiver = receiver(Revision::Legacy);
        receiver
            .link_setup(Pad::Source, Remote::Subdev, true)
            .unwrap();
        receiver.start_stream().unwrap();
        raise_frame_end(&mut receiver);
        let events = receiver.isr().unwrap();
        assert_eq!(events.exchange, None);
        assert!(ctx0_enabled(&receiver));
        assert_eq!(receiver.stats().frames, 0);
    }

    #[test]
    fn underrun_and_recovery() {
        let mut receiver = streaming_to_memory(1);
        raise_frame_end(&mut receiver);
        let events = receiver.isr().unwrap();
        assert_eq!(events.exchange, Some(Exchange::Underrun));
        assert_eq!(receiver.state(), StreamState::Underrun);
        assert!(!ctx0_enabled(&receiver));
        assert_eq!(receiver.stats().underruns, 1);

        receiver.queue_buffer(frame(5));
        assert_eq!(receiver.state(), StreamState::Streaming);
        assert!(ctx0_enabled(&receiver));
        assert!(interface_enabled(&receiver));
        assert_eq!(
            receiver.regs.get(Block::Csi2, csi2::ctx_dat_ping_addr(0)),
            frame(5).addr
        );
    }

    #[test]
    fn unavailable() {
        let mut receiver = receiver(Revision::Legacy);
        receiver.available = false;
        receiver
            .regs
            .raise(Block::Csi2, csi2::IRQSTATUS, csi2::IRQSTATUS_FIFO_OVF);
        assert_eq!(receiver.isr(), Err(Error::DeviceUnavailable));
        // status left pending
        assert_eq!(
            receiver.regs.get(Block::Csi2, csi2::IRQSTATUS),
            csi2::IRQSTATUS_FIFO_OVF
        );
    }

    #[test]
    fn isp_interrupt() {
        let mut receiver = streaming_to_memory(2);
        assert_eq!(receiver.isp_isr(), Ok(None));
        raise_frame_end(&mut receiver);
        receiver
            .regs
            .raise(Block::Main, main::IRQ0STATUS, main::IRQ0_CSIA);
        let events = receiver.isp_isr().unwrap().unwrap();
        assert!(events.frame_done());
        assert_eq!(receiver.regs.get(Block::Main, main::IRQ0STATUS), 0);
    }

    #[test]
    fn isp_irq_enable() {
        let mut receiver = receiver(Revision::Legacy);
        receiver
            .regs
            .raise(Block::Main, main::IRQ0STATUS, main::IRQ0_CSIA);
        receiver.regs.write(Block::Main, main::IRQ0ENABLE, 1 << 8);
        receiver.isp_irq_enable(true);
        assert_eq!(receiver.regs.get(Block::Main, main::IRQ0STATUS), 0);
        assert_eq!(
            receiver.regs.get(Block::Main, main::IRQ0ENABLE),
            (1 << 8) | main::IRQ0_CSIA
        );
        receiver.isp_irq_enable(false);
        assert_eq!(receiver.regs.get(Block::Main, main::IRQ0ENABLE), 1 << 8);
    }

    fn check_invariants(receiver: &FakeReceiver) {
        let regs = &receiver.regs;
        let ping = regs.get(Block::Csi2, csi2::ctx_dat_ping_addr(0));
        let pong = regs.get(Block::Csi2, csi2::ctx_dat_pong_addr(0));
        assert_eq!(ping, pong);
        let enabled = (0..csi2::NUM_CONTEXTS)
            .filter(|&n| regs.get(Block::Csi2, csi2::ctx_ctrl1(n)) & csi2::CTX_CTRL1_CTX_EN != 0)
            .count();
        assert!(enabled <= 1);
        if enabled == 1 {
            assert!(ctx0_enabled(receiver));
            assert_eq!(receiver.queue().active().map(|b| b.addr), Some(ping));
        }
    }

    #[test]
    fn concurrent_enqueue_and_exchange() {
        const NUM_BUFFERS: usize = 3;
        const ITERATIONS: usize = 2000;

        let receiver = Arc::new(Mutex::new(streaming_to_memory(NUM_BUFFERS)));

        let producer = {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    let mut receiver = receiver.lock().unwrap();
                    let done = receiver.queue_mut().take_done();
                    for buffer in done {
                        receiver.queue_buffer(buffer);
                    }
                    check_invariants(&receiver);
                    drop(receiver);
                    std::thread::yield_now();
                }
            })
        };

        let interrupts = {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || {
                let mut frames = 0u64;
                for _ in 0..ITERATIONS {
                    let mut receiver = receiver.lock().unwrap();
                    // the hardware only ends frames while the context is
                    // enabled
                    if ctx0_enabled(&receiver) {
                        raise_frame_end(&mut receiver);
                        let events = receiver.isr().unwrap();
                        assert!(events.frame_done());
                        assert_eq!(events.check(), Ok(()));
                        frames += 1;
                    }
                    check_invariants(&receiver);
                    drop(receiver);
                    std::thread::yield_now();
                }
                frames
            })
        };

        producer.join().unwrap();
        let frames = interrupts.join().unwrap();

        let mut receiver = receiver.lock().unwrap();
        assert_eq!(receiver.stats().frames, frames);
        receiver.stop_stream();
        let queue = receiver.queue_mut();
        assert_eq!(queue.take_done().len() + queue.take_idle().len(), NUM_BUFFERS);
    }
}
