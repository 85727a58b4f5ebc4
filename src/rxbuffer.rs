//! Userspace driver for the frame buffer device.
//!
//! The frame buffer device gives access to a physically contiguous DMA buffer
//! formed by a ring of frame buffers of equal size. The receiver writes frames
//! to them using their device addresses. The CPU reads them through a
//! read-only memory mapping, after invalidating the cache of each buffer.

use crate::buffer::FrameBuffer;
use anyhow::{Context, Result};
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::fs;

// The context output addresses must be aligned to 32 bytes.
const ADDR_ALIGN: usize = 32;

/// Frame buffer ring.
///
/// This struct corresponds to a frame buffer device.
#[derive(Debug)]
pub struct RxBuffer {
    _file: fs::File,
    fd: RawFd,
    buffer: *mut libc::c_void,
    buffer_size: usize,
    num_buffers: usize,
    phys_addr: u32,
}

unsafe impl Send for RxBuffer {}

async fn read_sysfs(name: &str, attr: &str) -> Result<String> {
    let path = format!("/sys/class/csi2-frames/{name}/device/{attr}");
    let value = fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    Ok(value.trim_end().to_string())
}

fn parse_hex(value: &str) -> Result<usize> {
    Ok(usize::from_str_radix(value.trim_start_matches("0x"), 16)?)
}

// Checks the ring attributes and gives the 32-bit device address of the ring
// and its length in bytes. The whole ring must be addressable by the receiver.
fn ring_layout(phys_addr: usize, buffer_size: usize, num_buffers: usize) -> Result<(u32, usize)> {
    if buffer_size == 0 || num_buffers == 0 {
        anyhow::bail!("frame buffer is empty");
    }
    if buffer_size % ADDR_ALIGN != 0 || phys_addr % ADDR_ALIGN != 0 {
        anyhow::bail!("frame buffer is not aligned to {ADDR_ALIGN} bytes");
    }
    let len = buffer_size
        .checked_mul(num_buffers)
        .context("frame buffer size overflows")?;
    let last = phys_addr
        .checked_add(len - 1)
        .context("frame buffer end address overflows")?;
    u32::try_from(last).context("frame buffer outside the 32-bit address space")?;
    Ok((u32::try_from(phys_addr)?, len))
}

impl RxBuffer {
    /// Opens a frame buffer device.
    ///
    /// The name of the device corresponds to the filename of the character
    /// device in `/dev`.
    pub async fn new(name: &str) -> Result<RxBuffer> {
        let file = fs::File::open(format!("/dev/{name}")).await?;
        let fd = file.as_raw_fd();
        let buffer_size = parse_hex(&read_sysfs(name, "buffer_size").await?)?;
        let num_buffers = read_sysfs(name, "num_buffers").await?.parse::<usize>()?;
        let phys_addr = parse_hex(&read_sysfs(name, "phys_addr").await?)?;
        let (phys_addr, len) = ring_layout(phys_addr, buffer_size, num_buffers)
            .with_context(|| format!("invalid frame buffer {name}"))?;
        let buffer = unsafe {
            match libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                0,
            ) {
                libc::MAP_FAILED => anyhow::bail!("mmap frame buffer failed"),
                x => x,
            }
        };
        tracing::info!(
            name,
            buffer_size,
            num_buffers,
            phys_addr = %format!("{phys_addr:#010x}"),
            "opened frame buffer"
        );
        Ok(RxBuffer {
            _file: file,
            fd,
            buffer,
            buffer_size,
            num_buffers,
            phys_addr,
        })
    }

    /// Returns the size in bytes of each of the buffers in the ring.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the number of buffers in the ring.
    pub fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    /// Returns the device address of one of the buffers in the ring.
    ///
    /// # Panics
    ///
    /// This function panics if `num_buffer` is greater or equal to the number
    /// of buffers in the ring.
    pub fn buffer_addr(&self, num_buffer: usize) -> u32 {
        assert!(num_buffer < self.num_buffers);
        // fits in u32, as checked in new()
        self.phys_addr + (num_buffer * self.buffer_size) as u32
    }

    /// Returns all the buffers in the ring as [`FrameBuffer`]s.
    pub fn frame_buffers(&self) -> impl Iterator<Item = FrameBuffer> + '_ {
        (0..self.num_buffers).map(|index| FrameBuffer {
            index,
            addr: self.buffer_addr(index),
        })
    }

    /// Returns a slice that contains one of the buffers in the ring.
    ///
    /// # Panics
    ///
    /// This function panics if `num_buffer` is greater or equal to the number
    /// of buffers in the ring.
    pub fn buffer_as_slice(&self, num_buffer: usize) -> &[u8] {
        assert!(num_buffer < self.num_buffers);
        unsafe {
            std::slice::from_raw_parts(
                self.buffer.add(num_buffer * self.buffer_size) as *const u8,
                self.buffer_size,
            )
        }
    }

    /// Invalidates the cache of one of the buffers in the ring.
    ///
    /// This must be called after the receiver has written a frame to the
    /// buffer and before reading it, since the writes done by the receiver are
    /// not coherent with the CPU caches.
    pub fn cache_invalidate(&self, num_buffer: usize) -> Result<()> {
        assert!(num_buffer < self.num_buffers);
        unsafe { ioctl::csi2_frames_cacheinv(self.fd, num_buffer as _) }?;
        Ok(())
    }
}

mod ioctl {
    use nix::ioctl_write_int;

    const CSI2_FRAMES_IOC_MAGIC: u8 = b'C';
    const CSI2_FRAMES_CACHEINV: u8 = 0;

    ioctl_write_int!(
        csi2_frames_cacheinv,
        CSI2_FRAMES_IOC_MAGIC,
        CSI2_FRAMES_CACHEINV
    );
}

impl Drop for RxBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.buffer, self.buffer_size * self.num_buffers);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_attributes() {
        assert_eq!(parse_hex("0x8f000000").unwrap(), 0x8f00_0000);
        assert_eq!(parse_hex("400000").unwrap(), 0x40_0000);
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn ring_layouts() {
        assert_eq!(
            ring_layout(0x8f00_0000, 0x40_0000, 4).unwrap(),
            (0x8f00_0000, 0x100_0000)
        );
        // ends exactly at the top of the 32-bit address space
        assert_eq!(
            ring_layout(0xff00_0000, 0x80_0000, 2).unwrap(),
            (0xff00_0000, 0x100_0000)
        );
        assert!(ring_layout(0xff00_0000, 0x80_0000, 3).is_err());
        assert!(ring_layout(0x8f00_0000, 0, 4).is_err());
        assert!(ring_layout(0x8f00_0000, 0x40_0000, 0).is_err());
        assert!(ring_layout(0x8f00_0010, 0x40_0000, 4).is_err());
        assert!(ring_layout(0x8f00_0000, 0x40_0020, usize::MAX).is_err());
        assert!(ring_layout(usize::MAX - 31, 0x40_0000, 1).is_err());
    }
}
