//! Register access.
//!
//! This module contains the register map of the CSI-2 receiver, of its PHY and
//! of the ISP top-level block, and the [`RegisterIo`] capability through which
//! the rest of the crate accesses them. [`UioRegisters`] implements it on top
//! of memory-mapped UIO regions.

use crate::uio::Mapping;

/// Register block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Block {
    /// ISP top-level registers.
    Main,
    /// CSI-2 receiver registers.
    Csi2,
    /// CSI-2 PHY registers.
    Phy,
}

impl Block {
    /// Gives the number of bytes spanned by the registers of the block.
    pub const fn size(self) -> usize {
        match self {
            Block::Main => main::CTRL as usize + 4,
            Block::Csi2 => csi2::ctx_ctrl3(csi2::NUM_CONTEXTS - 1) as usize + 4,
            Block::Phy => phy::REG1 as usize + 4,
        }
    }
}

/// Register read/write capability.
///
/// Read-modify-write sequences built from these methods are not atomic. The
/// caller must serialize all the accesses to a receiver.
pub trait RegisterIo {
    /// Reads a 32-bit register.
    fn read(&self, block: Block, offset: u32) -> u32;

    /// Writes a 32-bit register.
    fn write(&mut self, block: Block, offset: u32, value: u32);

    /// Sets the bits of `mask` in a register.
    fn set_bits(&mut self, block: Block, offset: u32, mask: u32) {
        let value = self.read(block, offset);
        self.write(block, offset, value | mask);
    }

    /// Clears the bits of `mask` in a register.
    fn clr_bits(&mut self, block: Block, offset: u32, mask: u32) {
        let value = self.read(block, offset);
        self.write(block, offset, value & !mask);
    }

    /// Clears the bits of `clear` and then sets the bits of `set` in a
    /// register.
    fn clr_set(&mut self, block: Block, offset: u32, clear: u32, set: u32) {
        let value = self.read(block, offset);
        self.write(block, offset, (value & !clear) | set);
    }
}

/// ISP top-level register offsets.
pub mod main {
    /// Revision register.
    pub const REVISION: u32 = 0x000;
    /// Interrupt 0 enable register.
    pub const IRQ0ENABLE: u32 = 0x00c;
    /// Interrupt 0 status register.
    pub const IRQ0STATUS: u32 = 0x010;
    /// CSI2A receiver interrupt, in the interrupt 0 registers.
    pub const IRQ0_CSIA: u32 = 1 << 0;
    /// Control register.
    pub const CTRL: u32 = 0x040;
}

/// CSI-2 receiver register offsets and fields.
#[allow(missing_docs)]
pub mod csi2 {
    pub const SYSCONFIG: u32 = 0x010;
    pub const SYSCONFIG_MSTANDBY_MODE_MASK: u32 = 0x3 << 12;
    pub const SYSCONFIG_MSTANDBY_MODE_NO: u32 = 0x1 << 12;
    pub const SYSCONFIG_SOFT_RESET: u32 = 1 << 1;
    pub const SYSCONFIG_AUTO_IDLE: u32 = 1 << 0;

    pub const SYSSTATUS: u32 = 0x014;
    pub const SYSSTATUS_RESET_DONE: u32 = 1 << 0;

    pub const IRQSTATUS: u32 = 0x018;
    pub const IRQENABLE: u32 = 0x01c;
    pub const IRQSTATUS_OCP_ERR: u32 = 1 << 14;
    pub const IRQSTATUS_SHORT_PACKET: u32 = 1 << 13;
    pub const IRQSTATUS_ECC_CORRECTION: u32 = 1 << 12;
    pub const IRQSTATUS_ECC_NO_CORRECTION: u32 = 1 << 11;
    pub const IRQSTATUS_COMPLEXIO2_ERR: u32 = 1 << 10;
    pub const IRQSTATUS_COMPLEXIO1_ERR: u32 = 1 << 9;
    pub const IRQSTATUS_FIFO_OVF: u32 = 1 << 8;
    pub const fn irqstatus_context(n: u8) -> u32 {
        1 << n
    }

    pub const CTRL: u32 = 0x040;
    pub const CTRL_VP_CLK_EN: u32 = 1 << 15;
    pub const CTRL_VP_ONLY_EN: u32 = 1 << 11;
    pub const CTRL_VP_OUT_CTRL_SHIFT: u32 = 8;
    pub const CTRL_VP_OUT_CTRL_MASK: u32 = 0x3 << CTRL_VP_OUT_CTRL_SHIFT;
    pub const CTRL_FRAME: u32 = 1 << 3;
    pub const CTRL_ECC_EN: u32 = 1 << 2;
    pub const CTRL_IF_EN: u32 = 1 << 0;

    pub const DBG_H: u32 = 0x044;
    pub const GNQ: u32 = 0x048;

    pub const PHY_CFG: u32 = 0x050;
    pub const PHY_CFG_RESET_CTRL: u32 = 1 << 30;

    pub const PHY_IRQSTATUS: u32 = 0x054;
    pub const SHORT_PACKET: u32 = 0x05c;
    pub const PHY_IRQENABLE: u32 = 0x060;
    /// All the error and ULPM bits of the five lanes of the complex I/O.
    pub const PHY_IRQ_ALL: u32 = 0x07ff_ffff;
    pub const DBG_P: u32 = 0x068;

    pub const TIMING: u32 = 0x06c;
    const fn timing_io_shift(io: u8) -> u32 {
        16 * (io as u32 - 1)
    }
    pub const fn timing_force_rx_mode(io: u8) -> u32 {
        1 << (timing_io_shift(io) + 15)
    }
    pub const fn timing_stop_state_x16(io: u8) -> u32 {
        1 << (timing_io_shift(io) + 14)
    }
    pub const fn timing_stop_state_x4(io: u8) -> u32 {
        1 << (timing_io_shift(io) + 13)
    }
    pub const fn timing_stop_state_counter_shift(io: u8) -> u32 {
        timing_io_shift(io)
    }
    pub const fn timing_stop_state_counter_mask(io: u8) -> u32 {
        0x1fff << timing_io_shift(io)
    }

    /// Number of receiver contexts.
    pub const NUM_CONTEXTS: u8 = 8;

    const fn ctx(base: u32, n: u8) -> u32 {
        base + 0x20 * n as u32
    }
    pub const fn ctx_ctrl1(n: u8) -> u32 {
        ctx(0x070, n)
    }
    pub const CTX_CTRL1_COUNT_SHIFT: u32 = 8;
    pub const CTX_CTRL1_COUNT_MASK: u32 = 0xff << CTX_CTRL1_COUNT_SHIFT;
    pub const CTX_CTRL1_EOF_EN: u32 = 1 << 7;
    pub const CTX_CTRL1_EOL_EN: u32 = 1 << 6;
    pub const CTX_CTRL1_CS_EN: u32 = 1 << 5;
    pub const CTX_CTRL1_COUNT_UNLOCK: u32 = 1 << 4;
    pub const CTX_CTRL1_CTX_EN: u32 = 1 << 0;

    pub const fn ctx_ctrl2(n: u8) -> u32 {
        ctx(0x074, n)
    }
    pub const CTX_CTRL2_USER_DEF_MAP_SHIFT: u32 = 13;
    pub const CTX_CTRL2_USER_DEF_MAP_MASK: u32 = 0x3 << CTX_CTRL2_USER_DEF_MAP_SHIFT;
    pub const CTX_CTRL2_VIRTUAL_ID_SHIFT: u32 = 11;
    pub const CTX_CTRL2_VIRTUAL_ID_MASK: u32 = 0x3 << CTX_CTRL2_VIRTUAL_ID_SHIFT;
    pub const CTX_CTRL2_DPCM_PRED: u32 = 1 << 10;
    pub const CTX_CTRL2_FORMAT_SHIFT: u32 = 0;
    pub const CTX_CTRL2_FORMAT_MASK: u32 = 0x3ff << CTX_CTRL2_FORMAT_SHIFT;

    pub const fn ctx_dat_ofst(n: u8) -> u32 {
        ctx(0x078, n)
    }
    pub const CTX_DAT_OFST_SHIFT: u32 = 5;
    pub const CTX_DAT_OFST_MASK: u32 = 0x7ff << CTX_DAT_OFST_SHIFT;

    pub const fn ctx_dat_ping_addr(n: u8) -> u32 {
        ctx(0x07c, n)
    }
    pub const fn ctx_dat_pong_addr(n: u8) -> u32 {
        ctx(0x080, n)
    }
    pub const fn ctx_irqenable(n: u8) -> u32 {
        ctx(0x084, n)
    }
    pub const fn ctx_irqstatus(n: u8) -> u32 {
        ctx(0x088, n)
    }
    pub const CTX_IRQSTATUS_FE: u32 = 1 << 1;

    pub const fn ctx_ctrl3(n: u8) -> u32 {
        ctx(0x08c, n)
    }
    pub const CTX_CTRL3_ALPHA_SHIFT: u32 = 5;
    pub const CTX_CTRL3_ALPHA_MASK: u32 = 0x3fff << CTX_CTRL3_ALPHA_SHIFT;
}

/// CSI-2 PHY register offsets and fields.
#[allow(missing_docs)]
pub mod phy {
    pub const REG1: u32 = 0x004;
    pub const REG1_RESET_DONE_CTRLCLK: u32 = 1 << 29;
}

/// Registers of one receiver backed by UIO mappings.
///
/// Each register block is a separate mapping of the ISP UIO device.
#[derive(Debug)]
pub struct UioRegisters {
    main: Mapping,
    csi2: Mapping,
    phy: Mapping,
}

// The mappings are only accessed through &mut self or behind the receiver
// mutex.
unsafe impl Send for UioRegisters {}

impl UioRegisters {
    /// Creates the register access from the mappings of each block.
    pub fn new(main: Mapping, csi2: Mapping, phy: Mapping) -> UioRegisters {
        UioRegisters { main, csi2, phy }
    }

    fn register(&self, block: Block, offset: u32) -> *mut u32 {
        let mapping = match block {
            Block::Main => &self.main,
            Block::Csi2 => &self.csi2,
            Block::Phy => &self.phy,
        };
        assert!((offset as usize) + 4 <= mapping.size());
        unsafe { mapping.addr().add(offset as usize) as *mut u32 }
    }
}

impl RegisterIo for UioRegisters {
    fn read(&self, block: Block, offset: u32) -> u32 {
        unsafe { std::ptr::read_volatile(self.register(block, offset)) }
    }

    fn write(&mut self, block: Block, offset: u32, value: u32) {
        unsafe { std::ptr::write_volatile(self.register(block, offset), value) }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory register file used by the unit tests.

    use super::{csi2, main, phy, Block, RegisterIo};
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct FakeRegisters {
        values: HashMap<(Block, u32), u32>,
        // Number of reads of SYSSTATUS before RESET_DONE reads as set.
        // `None` means never.
        pub soft_reset_polls: Option<usize>,
        // Number of reads of PHY REG1 before RESET_DONE_CTRLCLK reads as set.
        pub phy_reset_polls: Option<usize>,
        pub sysstatus_reads: std::cell::Cell<usize>,
        pub phy_reg1_reads: std::cell::Cell<usize>,
        pub writes: Vec<(Block, u32, u32)>,
    }

    // Status registers where writing a one clears the bit.
    fn write_one_to_clear(block: Block, offset: u32) -> bool {
        match block {
            Block::Main => offset == main::IRQ0STATUS,
            Block::Csi2 => {
                offset == csi2::IRQSTATUS
                    || offset == csi2::PHY_IRQSTATUS
                    || (0..csi2::NUM_CONTEXTS).any(|n| offset == csi2::ctx_irqstatus(n))
            }
            Block::Phy => false,
        }
    }

    impl FakeRegisters {
        pub fn new() -> FakeRegisters {
            FakeRegisters {
                soft_reset_polls: Some(0),
                phy_reset_polls: Some(0),
                ..Default::default()
            }
        }

        pub fn get(&self, block: Block, offset: u32) -> u32 {
            self.values.get(&(block, offset)).copied().unwrap_or(0)
        }

        // Simulates the hardware raising status bits.
        pub fn raise(&mut self, block: Block, offset: u32, bits: u32) {
            *self.values.entry((block, offset)).or_default() |= bits;
        }

        fn done_after(polls: Option<usize>, reads: &std::cell::Cell<usize>) -> bool {
            let n = reads.get();
            reads.set(n + 1);
            polls.is_some_and(|polls| n >= polls)
        }
    }

    impl RegisterIo for FakeRegisters {
        fn read(&self, block: Block, offset: u32) -> u32 {
            let value = self.get(block, offset);
            match (block, offset) {
                (Block::Csi2, csi2::SYSSTATUS) => {
                    if Self::done_after(self.soft_reset_polls, &self.sysstatus_reads) {
                        value | csi2::SYSSTATUS_RESET_DONE
                    } else {
                        value & !csi2::SYSSTATUS_RESET_DONE
                    }
                }
                (Block::Phy, phy::REG1) => {
                    if Self::done_after(self.phy_reset_polls, &self.phy_reg1_reads) {
                        value | phy::REG1_RESET_DONE_CTRLCLK
                    } else {
                        value & !phy::REG1_RESET_DONE_CTRLCLK
                    }
                }
                _ => value,
            }
        }

        fn write(&mut self, block: Block, offset: u32, value: u32) {
            self.writes.push((block, offset, value));
            let entry = self.values.entry((block, offset)).or_default();
            if write_one_to_clear(block, offset) {
                *entry &= !value;
            } else {
                *entry = value;
            }
        }
    }
}
