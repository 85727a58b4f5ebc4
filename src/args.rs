//! csi2-httpd CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the csi2-httpd
//! application.

use clap::Parser;
use std::net::SocketAddr;

/// csi2-httpd CLI arguments.
#[derive(Parser, Debug, Clone, Eq, PartialEq, Hash)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Listen address for the HTTP server
    #[clap(long, default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,
    /// Name of the ISP UIO device
    #[clap(long, default_value = "omap3isp")]
    pub uio: String,
    /// Name of the frame buffer device
    #[clap(long, default_value = "csi2-frames")]
    pub frames: String,
    /// Video port output clock divider
    #[clap(long, default_value_t = 1)]
    pub vpclk_div: u8,
    /// Disable ECC checking of the packet headers
    #[clap(long)]
    pub no_crc: bool,
    /// Do not activate the link to memory at startup
    #[clap(long)]
    pub no_memory: bool,
    /// Activate the link to the processing stage at startup
    #[clap(long)]
    pub cascade: bool,
}
