//! Receiver timing and reset.
//!
//! This module programs the per-I/O timing of the receiver and runs the reset
//! handshake. The handshake polls status bits with a bounded number of
//! retries, using a [`Delay`] so that it can be driven by a fake clock.

use crate::error::Error;
use crate::format::Revision;
use crate::regs::{csi2, phy, Block, RegisterIo};
use std::time::Duration;

/// Number of soft reset status reads before giving up.
const SOFT_RESET_RETRIES: usize = 5;
/// Number of PHY reset status reads before giving up.
const PHY_RESET_RETRIES: usize = 100;
/// Delay between status reads, in microseconds.
const POLL_DELAY_US: u32 = 100;

/// Source of delays for polling loops.
pub trait Delay {
    /// Waits for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

/// [`Delay`] implemented by sleeping the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us.into()));
    }
}

/// Timing parameters of one I/O of the receiver.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Timing {
    // 1 or 2, see Timing::for_io
    ionum: u8,
    /// Force receive mode.
    pub force_rx_mode: bool,
    /// Multiply the stop state counter by 16.
    pub stop_state_16x: bool,
    /// Multiply the stop state counter by 4.
    pub stop_state_4x: bool,
    /// Stop state counter (13 bits).
    pub stop_state_counter: u16,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing {
            ionum: 1,
            force_rx_mode: true,
            stop_state_16x: true,
            stop_state_4x: true,
            stop_state_counter: 0x1ff,
        }
    }
}

fn update_bit(reg: u32, mask: u32, value: bool) -> u32 {
    if value {
        reg | mask
    } else {
        reg & !mask
    }
}

impl Timing {
    /// Gives the default timing parameters of an I/O.
    ///
    /// The TIMING register has fields for I/O 1 and I/O 2. Returns `None` for
    /// any other `ionum`.
    pub fn for_io(ionum: u8) -> Option<Timing> {
        matches!(ionum, 1 | 2).then(|| Timing {
            ionum,
            ..Default::default()
        })
    }

    /// Gives the I/O number.
    pub fn ionum(&self) -> u8 {
        self.ionum
    }

    /// Programs the timing register.
    pub fn configure<R: RegisterIo>(&self, regs: &mut R) {
        let io = self.ionum;
        let mut reg = regs.read(Block::Csi2, csi2::TIMING);
        reg = update_bit(reg, csi2::timing_force_rx_mode(io), self.force_rx_mode);
        reg = update_bit(reg, csi2::timing_stop_state_x16(io), self.stop_state_16x);
        reg = update_bit(reg, csi2::timing_stop_state_x4(io), self.stop_state_4x);
        reg &= !csi2::timing_stop_state_counter_mask(io);
        reg |= (u32::from(self.stop_state_counter) << csi2::timing_stop_state_counter_shift(io))
            & csi2::timing_stop_state_counter_mask(io);
        regs.write(Block::Csi2, csi2::TIMING, reg);
    }
}

fn poll<R: RegisterIo, D: Delay>(
    regs: &R,
    delay: &mut D,
    block: Block,
    offset: u32,
    mask: u32,
    retries: usize,
) -> bool {
    for attempt in 0..retries {
        if regs.read(block, offset) & mask == mask {
            return true;
        }
        if attempt + 1 < retries {
            delay.delay_us(POLL_DELAY_US);
        }
    }
    false
}

/// Runs the reset handshake.
///
/// Soft-resets the receiver and waits for the reset to complete. On the
/// revised ISP, also resets the PHY control clock domain and waits for it.
/// Finally, disables auto-idle and standby.
///
/// Fails with [`Error::Busy`] if the soft reset does not complete and with
/// [`Error::Timeout`] if the PHY reset does not complete.
pub(crate) fn reset<R: RegisterIo, D: Delay>(
    regs: &mut R,
    revision: Revision,
    delay: &mut D,
) -> Result<(), Error> {
    regs.set_bits(Block::Csi2, csi2::SYSCONFIG, csi2::SYSCONFIG_SOFT_RESET);
    if !poll(
        regs,
        delay,
        Block::Csi2,
        csi2::SYSSTATUS,
        csi2::SYSSTATUS_RESET_DONE,
        SOFT_RESET_RETRIES,
    ) {
        tracing::error!("soft reset try count exceeded");
        return Err(Error::Busy);
    }

    if revision == Revision::Revised {
        regs.set_bits(Block::Csi2, csi2::PHY_CFG, csi2::PHY_CFG_RESET_CTRL);
        if !poll(
            regs,
            delay,
            Block::Phy,
            phy::REG1,
            phy::REG1_RESET_DONE_CTRLCLK,
            PHY_RESET_RETRIES,
        ) {
            tracing::error!("reset of the PHY control clock domain failed");
            return Err(Error::Timeout);
        }
    }

    regs.clr_set(
        Block::Csi2,
        csi2::SYSCONFIG,
        csi2::SYSCONFIG_MSTANDBY_MODE_MASK | csi2::SYSCONFIG_AUTO_IDLE,
        csi2::SYSCONFIG_MSTANDBY_MODE_NO,
    );
    Ok(())
}
