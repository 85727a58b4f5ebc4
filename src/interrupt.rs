//! Interrupt dispatcher.
//!
//! The ISP interrupt is received through its UIO device. For each interrupt the
//! dispatcher runs the interrupt handler of the receiver with the receiver lock
//! held, and notifies the [`InterruptWaiter`]s of the events that happened.

use crate::isp::Csi2Receiver;
use crate::uio::Uio;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Interrupt waiter.
///
/// This is associated with an event signalled by the interrupt handler and can
/// be used by a future to await until such an event happens.
#[derive(Debug)]
pub struct InterruptWaiter {
    notify: Arc<Notify>,
}

/// Interrupt dispatcher.
///
/// Receives the interrupts produced by the ISP and sends notifications to the
/// [`InterruptWaiter`]s. It is necessary to call [`InterruptHandler::run`] in
/// order to receive and process interrupts.
#[derive(Debug)]
pub struct InterruptHandler {
    uio: Uio,
    receiver: Arc<Mutex<Csi2Receiver>>,
    notify_frame: Arc<Notify>,
}

impl InterruptHandler {
    /// Creates an interrupt dispatcher for a receiver.
    ///
    /// `uio` must be the UIO device of the ISP to which the receiver belongs.
    pub fn new(uio: Uio, receiver: Arc<Mutex<Csi2Receiver>>) -> InterruptHandler {
        InterruptHandler {
            uio,
            receiver,
            notify_frame: Arc::new(Notify::new()),
        }
    }

    /// Runs the interrupt dispatcher.
    ///
    /// This function only returns if there is an error.
    ///
    /// The function must be run concurrently with the rest of the application
    /// so that interrupts can be received and notifications can be sent to the
    /// waiters.
    #[tracing::instrument(name = "interrupt", skip_all)]
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.wait_and_notify().await?;
        }
    }

    async fn wait_and_notify(&mut self) -> Result<()> {
        self.uio.irq_enable().await?;
        self.uio.irq_wait().await?;
        let events = self.receiver.lock().unwrap().isp_isr()?;
        let Some(events) = events else {
            tracing::trace!("spurious interrupt");
            return Ok(());
        };
        if events.frame_done() {
            self.notify_frame.notify_one();
        }
        Ok(())
    }

    /// Returns a waiter for the frames completed in memory.
    pub fn waiter_frame(&self) -> InterruptWaiter {
        InterruptWaiter {
            notify: Arc::clone(&self.notify_frame),
        }
    }
}

impl InterruptWaiter {
    /// Waits for an event.
    ///
    /// Awaiting on the future returned by this function will only return when
    /// the event is signalled.
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.notify.notified()
    }
}
