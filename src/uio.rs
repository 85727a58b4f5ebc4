//! ISP UIO device.
//!
//! The kernel exposes the ISP as a UIO device. Each register block of the ISP
//! is one memory mapping of the device, described in
//! `/sys/class/uio/uio<N>/maps/map<M>`. The ISP interrupt line is delivered
//! through the character device, which masks it after every interrupt.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// ISP UIO device.
#[derive(Debug)]
pub struct Uio {
    num: usize,
    file: fs::File,
}

/// Register block mapped from the UIO device.
///
/// Dropping this struct unmaps the block.
#[derive(Debug)]
pub struct Mapping {
    page: *mut libc::c_void,
    page_len: usize,
    regs: *mut u8,
    len: usize,
}

/// Memory region of a UIO mapping, as listed in sysfs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Region {
    addr: usize,
    size: usize,
    // offset of the registers within the first mapped page
    offset: usize,
}

// Parses the UIO number out of a `/sys/class/uio` entry name.
fn uio_number(entry: &str) -> Option<usize> {
    entry.strip_prefix("uio")?.parse().ok()
}

// UIO publishes the map attributes in hexadecimal with a `0x` prefix.
fn parse_map_attr(value: &str) -> Result<usize> {
    let digits = value
        .trim_end()
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("map attribute {value:?} is not hexadecimal"))?;
    Ok(usize::from_str_radix(digits, 16)?)
}

impl Region {
    // Length to mmap so that the whole region is covered.
    fn page_len(&self) -> Result<usize> {
        self.offset
            .checked_add(self.size)
            .context("UIO mapping size overflows")
    }
}

impl Uio {
    /// Opens the UIO device whose name is `name`.
    ///
    /// The devices listed in `/sys/class/uio` are searched for one whose
    /// `name` attribute matches.
    pub async fn from_name(name: &str) -> Result<Uio> {
        let mut entries = fs::read_dir("/sys/class/uio").await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(num) = entry.file_name().to_str().and_then(uio_number) else {
                continue;
            };
            let this_name = fs::read_to_string(entry.path().join("name")).await?;
            if this_name.trim_end() == name {
                let file = fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(format!("/dev/uio{num}"))
                    .await
                    .with_context(|| format!("failed to open /dev/uio{num}"))?;
                tracing::debug!(name, num, "found UIO device");
                return Ok(Uio { num, file });
            }
        }
        anyhow::bail!("UIO device {name} not found")
    }

    async fn region(&self, mapping: usize) -> Result<Region> {
        let dir = format!("/sys/class/uio/uio{}/maps/map{mapping}", self.num);
        let mut attrs = [0; 3];
        for (value, attr) in attrs.iter_mut().zip(["addr", "size", "offset"]) {
            let path = format!("{dir}/{attr}");
            let text = fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            *value = parse_map_attr(&text)?;
        }
        let [addr, size, offset] = attrs;
        Ok(Region { addr, size, offset })
    }

    /// Maps a register block.
    ///
    /// `mapping` is the number of the UIO mapping that holds the block, and
    /// `min_len` the number of bytes that the block registers span. The
    /// mapping fails if the region published by the kernel is smaller.
    pub async fn map_register_block(&self, mapping: usize, min_len: usize) -> Result<Mapping> {
        let region = self.region(mapping).await?;
        if region.size < min_len {
            anyhow::bail!(
                "UIO mapping {mapping} has {:#x} bytes, but {min_len:#x} are needed",
                region.size
            );
        }
        let page_len = region.page_len()?;
        // UIO selects the mapping through the page offset of mmap.
        let page = unsafe {
            match libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                page_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                (mapping * page_size::get()) as libc::off_t,
            ) {
                libc::MAP_FAILED => anyhow::bail!("mmap UIO mapping {mapping} failed"),
                x => x,
            }
        };
        let regs = unsafe { (page as *mut u8).add(region.offset) };
        tracing::debug!(
            mapping,
            addr = %format!("{:#010x}", region.addr),
            size = region.size,
            "mapped register block"
        );
        Ok(Mapping {
            page,
            page_len,
            regs,
            len: region.size,
        })
    }

    /// Unmasks the interrupt.
    ///
    /// This must be called before every wait, since the interrupt is masked
    /// each time that it fires.
    pub async fn irq_enable(&mut self) -> Result<()> {
        self.file.write_all(&1u32.to_ne_bytes()).await?;
        Ok(())
    }

    /// Waits for an interrupt.
    ///
    /// Returns the number of interrupts received since the device was
    /// registered.
    pub async fn irq_wait(&mut self) -> Result<u32> {
        let mut count = [0; 4];
        self.file.read_exact(&mut count).await?;
        Ok(u32::from_ne_bytes(count))
    }
}

impl Mapping {
    /// Gives the address of the first register of the block.
    pub fn addr(&self) -> *mut u8 {
        self.regs
    }

    /// Gives the size in bytes of the block.
    pub fn size(&self) -> usize {
        self.len
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            if libc::munmap(self.page, self.page_len) != 0 {
                tracing::error!("munmap register block failed");
            }
        }
    }
}
