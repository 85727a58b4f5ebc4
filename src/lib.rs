//! csi2-httpd is a userspace driver for the MIPI CSI-2 receiver of the OMAP3
//! camera ISP. It programs the receiver through memory-mapped registers,
//! handles its interrupts, and exchanges frame buffers with it. A web server
//! provides a RESTful API to negotiate formats, set up links and start and
//! stop streaming. Captured frames are streamed to clients using WebSockets.

#![warn(missing_docs)]

pub mod app;
pub mod args;
pub mod buffer;
pub mod capture;
pub mod context;
pub mod error;
pub mod format;
pub mod httpd;
pub mod interrupt;
pub mod isp;
pub mod isr;
pub mod phy;
pub mod receiver;
pub mod regs;
pub mod rxbuffer;
pub mod timing;
pub mod uio;
