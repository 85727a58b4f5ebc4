//! Receiver contexts.
//!
//! A context is one of the hardware sub-streams of the receiver. Each context
//! captures one virtual channel with its own format and output address. Only
//! context 0 is driven by the receiver.

use crate::format::PhysFormat;
use crate::regs::{csi2, Block, RegisterIo};

/// Receiver context configuration.
///
/// This is a RAM copy of the configuration of a context. It is programmed into
/// the registers by [`Context::configure`], which must only be called while the
/// context and the receiver interface are disabled.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Context {
    index: u8,
    /// Physical format.
    pub format: PhysFormat,
    /// Virtual channel ID.
    pub virtual_id: u8,
    /// Use the advanced DPCM predictor.
    pub dpcm_predictor: bool,
    /// Decompress DPCM-compressed samples.
    pub dpcm_decompress: bool,
    /// Line offset in memory, in units of 32 bytes. Zero means no padding.
    pub data_offset: u16,
    /// Alpha value for the RGB888 and RGB444 formats.
    pub alpha: u16,
    /// Generate end of frame signals.
    pub eof_enabled: bool,
    /// Generate end of line signals.
    pub eol_enabled: bool,
    /// Check the payload checksum.
    pub checksum_enabled: bool,
    ping_addr: u32,
    pong_addr: u32,
    enabled: bool,
}

fn update_bit(reg: u32, mask: u32, value: bool) -> u32 {
    if value {
        reg | mask
    } else {
        reg & !mask
    }
}

impl Context {
    /// Creates a disabled context with a default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid context number.
    pub fn new(index: u8) -> Context {
        assert!(index < csi2::NUM_CONTEXTS);
        Context {
            index,
            format: PhysFormat::OTHERS,
            virtual_id: 0,
            dpcm_predictor: false,
            dpcm_decompress: false,
            data_offset: 0,
            alpha: 0,
            eof_enabled: false,
            eol_enabled: false,
            checksum_enabled: true,
            ping_addr: 0,
            pong_addr: 0,
            enabled: false,
        }
    }

    /// Gives the context number.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Returns `true` if the context is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Gives the current output address.
    ///
    /// The ping and pong addresses are always equal, so a single address is
    /// returned.
    pub fn output_address(&self) -> u32 {
        self.ping_addr
    }

    /// Programs the context registers from the configuration.
    pub fn configure<R: RegisterIo>(&self, regs: &mut R) {
        let n = self.index;

        let mut reg = regs.read(Block::Csi2, csi2::ctx_ctrl1(n));
        reg = update_bit(reg, csi2::CTX_CTRL1_EOF_EN, self.eof_enabled);
        reg = update_bit(reg, csi2::CTX_CTRL1_EOL_EN, self.eol_enabled);
        reg = update_bit(reg, csi2::CTX_CTRL1_CS_EN, self.checksum_enabled);
        regs.write(Block::Csi2, csi2::ctx_ctrl1(n), reg);

        let mut reg = regs.read(Block::Csi2, csi2::ctx_ctrl2(n));
        reg &= !csi2::CTX_CTRL2_VIRTUAL_ID_MASK;
        reg |= (u32::from(self.virtual_id) << csi2::CTX_CTRL2_VIRTUAL_ID_SHIFT)
            & csi2::CTX_CTRL2_VIRTUAL_ID_MASK;
        reg &= !csi2::CTX_CTRL2_FORMAT_MASK;
        reg |= (u32::from(self.format.0) << csi2::CTX_CTRL2_FORMAT_SHIFT)
            & csi2::CTX_CTRL2_FORMAT_MASK;
        // the predictor bit is left alone unless decompressing
        if self.dpcm_decompress {
            reg = update_bit(reg, csi2::CTX_CTRL2_DPCM_PRED, self.dpcm_predictor);
        }
        if self.format.is_user_defined() {
            reg &= !csi2::CTX_CTRL2_USER_DEF_MAP_MASK;
            reg |= 2 << csi2::CTX_CTRL2_USER_DEF_MAP_SHIFT;
        }
        regs.write(Block::Csi2, csi2::ctx_ctrl2(n), reg);

        regs.clr_set(
            Block::Csi2,
            csi2::ctx_ctrl3(n),
            csi2::CTX_CTRL3_ALPHA_MASK,
            (u32::from(self.alpha) << csi2::CTX_CTRL3_ALPHA_SHIFT) & csi2::CTX_CTRL3_ALPHA_MASK,
        );
        regs.clr_set(
            Block::Csi2,
            csi2::ctx_dat_ofst(n),
            csi2::CTX_DAT_OFST_MASK,
            (u32::from(self.data_offset) << csi2::CTX_DAT_OFST_SHIFT) & csi2::CTX_DAT_OFST_MASK,
        );

        regs.write(Block::Csi2, csi2::ctx_dat_ping_addr(n), self.ping_addr);
        regs.write(Block::Csi2, csi2::ctx_dat_pong_addr(n), self.pong_addr);
    }

    /// Enables or disables the context.
    ///
    /// When enabling with the memory output active, the frame counter is set
    /// so that the context captures a single frame and then stops.
    pub fn enable<R: RegisterIo>(&mut self, regs: &mut R, enable: bool, memory: bool) {
        let n = self.index;
        let mut reg = regs.read(Block::Csi2, csi2::ctx_ctrl1(n));
        if enable {
            reg &= !csi2::CTX_CTRL1_COUNT_MASK;
            if memory {
                reg |= 1 << csi2::CTX_CTRL1_COUNT_SHIFT;
            }
            reg |= csi2::CTX_CTRL1_COUNT_UNLOCK | csi2::CTX_CTRL1_CTX_EN;
        } else {
            reg &= !csi2::CTX_CTRL1_CTX_EN;
        }
        regs.write(Block::Csi2, csi2::ctx_ctrl1(n), reg);
        self.enabled = enable;
    }

    /// Sets the output address.
    ///
    /// Both the ping and the pong registers are written with the same address.
    pub fn set_output_address<R: RegisterIo>(&mut self, regs: &mut R, addr: u32) {
        self.ping_addr = addr;
        self.pong_addr = addr;
        regs.write(Block::Csi2, csi2::ctx_dat_ping_addr(self.index), addr);
        regs.write(Block::Csi2, csi2::ctx_dat_pong_addr(self.index), addr);
    }
}
