//! csi2-httpd application.
//!
//! This module contains a top-level structure [`App`] that represents the whole
//! csi2-httpd application and a structure [`AppState`] that contains the
//! application state.

use crate::{
    args::Args,
    capture::Capture,
    format::Pad,
    httpd,
    interrupt::InterruptHandler,
    isp::{self, Csi2Receiver},
    receiver::{BusConfig, Remote},
    rxbuffer::RxBuffer,
};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// csi2-httpd application.
///
/// This struct represents the csi2-httpd application. It owns the different
/// objects of which the application is formed, and runs them concurrently.
#[derive(Debug)]
pub struct App {
    httpd: httpd::Server,
    interrupt_handler: InterruptHandler,
    capture: Capture,
}

impl App {
    /// Creates a new application.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub async fn new(args: &Args) -> Result<App> {
        let bus = BusConfig {
            vpclk_div: args.vpclk_div,
            crc: !args.no_crc,
        };
        let (receiver, interrupt_handler) = isp::take(&args.uio, bus).await?;
        {
            let mut receiver = receiver.lock().unwrap();
            receiver
                .link_setup(Pad::Source, Remote::VideoNode, !args.no_memory)
                .context("failed to set up memory link")?;
            receiver
                .link_setup(Pad::Source, Remote::Subdev, args.cascade)
                .context("failed to set up cascade link")?;
        }
        let frames = RxBuffer::new(&args.frames)
            .await
            .with_context(|| format!("failed to open {} frame buffer", args.frames))?;

        let (frame_sender, _) = broadcast::channel(4);
        let capture = Capture::new(
            Arc::clone(&receiver),
            frames,
            interrupt_handler.waiter_frame(),
            frame_sender.clone(),
        );

        let state = AppState(Arc::new(State { receiver }));
        let httpd = httpd::Server::new(&args.listen, state, frame_sender).await?;

        Ok(App {
            httpd,
            interrupt_handler,
            capture,
        })
    }

    /// Runs the application.
    ///
    /// This only returns if one of the objects that form the application fails.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub async fn run(self) -> Result<()> {
        tokio::select! {
            ret = self.httpd.run() => ret,
            ret = self.interrupt_handler.run() => ret,
            ret = self.capture.run() => ret,
        }
    }
}

/// Application state.
///
/// This struct contains the application state that needs to be shared between
/// different modules, such as different Axum handlers in the HTTP server. The
/// struct behaves as an `Arc<...>`. It is cheaply clonable and clones represent
/// a reference to a shared object.
#[derive(Debug, Clone)]
pub struct AppState(Arc<State>);

#[derive(Debug)]
struct State {
    receiver: Arc<Mutex<Csi2Receiver>>,
}

impl AppState {
    /// Gives access to the [`Csi2Receiver`] object of the application.
    pub fn receiver(&self) -> &Mutex<Csi2Receiver> {
        &self.0.receiver
    }
}
