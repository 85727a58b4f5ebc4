//! CSI-2 receiver.
//!
//! This module contains [`Receiver`], the userspace driver of one CSI-2
//! receiver of the ISP. It holds a RAM copy of the receiver configuration and
//! implements the control path: format negotiation, link setup, reset and
//! starting and stopping the stream. The interrupt handler is implemented in
//! [`crate::isr`].
//!
//! All the methods take `&mut self`. The receiver is shared between the
//! control path and the interrupt dispatcher behind a single mutex, which
//! serializes the register read-modify-write sequences.

use crate::buffer::BufferQueue;
use crate::context::Context;
use crate::error::Error;
use crate::format::{self, FrameSizeRange, MbusCode, Output, Pad, PadFormat, PhysFormat, Revision};
use crate::phy::CsiPhy;
use crate::regs::{csi2, main, Block, RegisterIo};
use crate::timing::{self, Delay, Timing};

/// Receiver instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Instance {
    /// CSI2A receiver, present in all the ISP revisions.
    Csi2a,
    /// CSI2C receiver, only present in the revised ISP.
    Csi2c,
}

impl Instance {
    /// Returns `true` if the instance exists in an ISP revision.
    pub fn available(self, revision: Revision) -> bool {
        match self {
            Instance::Csi2a => true,
            Instance::Csi2c => revision == Revision::Revised,
        }
    }

    /// Gives the name of the PHY used by the instance.
    pub fn phy_name(self) -> &'static str {
        match self {
            Instance::Csi2a => "CSIPHY2",
            Instance::Csi2c => "CSIPHY1",
        }
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Instance::Csi2a => write!(f, "CSI2a"),
            Instance::Csi2c => write!(f, "CSI2c"),
        }
    }
}

/// Sensor bus parameters.
///
/// These are supplied by the sensor side and consumed when the stream is
/// started.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BusConfig {
    /// Video port output clock divider.
    pub vpclk_div: u8,
    /// Enable ECC and CRC checking.
    pub crc: bool,
}

/// Frame mode of the receiver interface.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum FrameMode {
    /// Disabling the interface takes effect immediately.
    #[default]
    Immediate,
    /// Disabling the interface takes effect after the end of the frame.
    AfterFrameEnd,
}

/// Receiver control configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Control {
    /// Frame mode.
    pub frame_mode: FrameMode,
    /// Enable the video port clock.
    pub vp_clk_enable: bool,
    /// Send the data only to the video port.
    pub vp_only_enable: bool,
    /// Video port output clock divider.
    pub vp_out_ctrl: u8,
    /// Enable ECC checking.
    pub ecc_enable: bool,
    /// Interface enabled.
    pub if_enable: bool,
}

impl Control {
    /// Programs the control register, except for the interface enable.
    pub fn configure<R: RegisterIo>(&self, regs: &mut R) {
        let mut set = (u32::from(self.vp_out_ctrl) << csi2::CTRL_VP_OUT_CTRL_SHIFT)
            & csi2::CTRL_VP_OUT_CTRL_MASK;
        if self.frame_mode == FrameMode::AfterFrameEnd {
            set |= csi2::CTRL_FRAME;
        }
        if self.vp_clk_enable {
            set |= csi2::CTRL_VP_CLK_EN;
        }
        if self.vp_only_enable {
            set |= csi2::CTRL_VP_ONLY_EN;
        }
        if self.ecc_enable {
            set |= csi2::CTRL_ECC_EN;
        }
        regs.clr_set(
            Block::Csi2,
            csi2::CTRL,
            csi2::CTRL_FRAME
                | csi2::CTRL_VP_CLK_EN
                | csi2::CTRL_VP_ONLY_EN
                | csi2::CTRL_VP_OUT_CTRL_MASK
                | csi2::CTRL_ECC_EN,
            set,
        );
    }
}

/// Kind of the entity at the remote end of a link.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Remote {
    /// Video capture node writing frames to memory.
    VideoNode,
    /// Downstream processing stage.
    Subdev,
    /// Image sensor.
    Sensor,
}

const REGDUMP: [(&str, Block, u32); 24] = [
    ("ISP_CTRL", Block::Main, main::CTRL),
    ("ISP_IRQ0ENABLE", Block::Main, main::IRQ0ENABLE),
    ("ISP_IRQ0STATUS", Block::Main, main::IRQ0STATUS),
    ("SYSCONFIG", Block::Csi2, csi2::SYSCONFIG),
    ("SYSSTATUS", Block::Csi2, csi2::SYSSTATUS),
    ("IRQENABLE", Block::Csi2, csi2::IRQENABLE),
    ("IRQSTATUS", Block::Csi2, csi2::IRQSTATUS),
    ("CTRL", Block::Csi2, csi2::CTRL),
    ("DBG_H", Block::Csi2, csi2::DBG_H),
    ("GNQ", Block::Csi2, csi2::GNQ),
    ("PHY_CFG", Block::Csi2, csi2::PHY_CFG),
    ("PHY_IRQSTATUS", Block::Csi2, csi2::PHY_IRQSTATUS),
    ("SHORT_PACKET", Block::Csi2, csi2::SHORT_PACKET),
    ("PHY_IRQENABLE", Block::Csi2, csi2::PHY_IRQENABLE),
    ("DBG_P", Block::Csi2, csi2::DBG_P),
    ("TIMING", Block::Csi2, csi2::TIMING),
    ("CTX_CTRL1(0)", Block::Csi2, csi2::ctx_ctrl1(0)),
    ("CTX_CTRL2(0)", Block::Csi2, csi2::ctx_ctrl2(0)),
    ("CTX_DAT_OFST(0)", Block::Csi2, csi2::ctx_dat_ofst(0)),
    ("CTX_DAT_PING_ADDR(0)", Block::Csi2, csi2::ctx_dat_ping_addr(0)),
    ("CTX_DAT_PONG_ADDR(0)", Block::Csi2, csi2::ctx_dat_pong_addr(0)),
    ("CTX_IRQENABLE(0)", Block::Csi2, csi2::ctx_irqenable(0)),
    ("CTX_IRQSTATUS(0)", Block::Csi2, csi2::ctx_irqstatus(0)),
    ("CTX_CTRL3(0)", Block::Csi2, csi2::ctx_ctrl3(0)),
];

/// Streaming state of the receiver.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StreamState {
    /// Interface and context disabled.
    Idle,
    /// Interface enabled and capturing.
    Streaming,
    /// Streaming requested but waiting for an output buffer.
    Underrun,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Streaming => "streaming",
            StreamState::Underrun => "underrun",
        };
        f.write_str(s)
    }
}

/// Frame and error counters.
///
/// The counters start at zero when the receiver is created and are never
/// reset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Stats {
    /// Frames written to memory.
    pub frames: u64,
    /// Frames that ended without a buffer to continue into.
    pub underruns: u64,
    /// Interrupts that reported a transmission error.
    pub transmission_errors: u64,
}

/// CSI-2 receiver.
///
/// The receiver accesses its registers through `R` and takes its destination
/// buffers from `Q`.
#[derive(Debug)]
pub struct Receiver<R, Q> {
    pub(crate) regs: R,
    instance: Instance,
    revision: Revision,
    pub(crate) available: bool,
    phy: CsiPhy,
    pub(crate) queue: Q,
    bus: BusConfig,
    ctrl: Control,
    timing: Timing,
    pub(crate) contexts: [Context; csi2::NUM_CONTEXTS as usize],
    pub(crate) output: Output,
    dpcm_decompress: bool,
    pub(crate) buffers_ready: bool,
    pub(crate) underrun: bool,
    streaming: bool,
    formats: [PadFormat; 2],
    pub(crate) stats: Stats,
}

fn pad_index(pad: Pad) -> usize {
    match pad {
        Pad::Sink => 0,
        Pad::Source => 1,
    }
}

impl<R: RegisterIo, Q: BufferQueue> Receiver<R, Q> {
    /// Creates a receiver.
    ///
    /// The receiver starts idle, with no outputs routed and both pads set to
    /// [`format::DEFAULT_CODE`]. The hardware is not touched until
    /// [`Receiver::reset`] is called.
    pub fn new(
        regs: R,
        instance: Instance,
        revision: Revision,
        phy: CsiPhy,
        queue: Q,
        bus: BusConfig,
    ) -> Receiver<R, Q> {
        let initial = PadFormat {
            code: format::DEFAULT_CODE,
            ..Default::default()
        };
        Receiver {
            regs,
            instance,
            revision,
            available: instance.available(revision),
            phy,
            queue,
            bus,
            ctrl: Control::default(),
            timing: Timing::default(),
            contexts: std::array::from_fn(|n| Context::new(n as u8)),
            output: Output::empty(),
            dpcm_decompress: false,
            buffers_ready: false,
            underrun: false,
            streaming: false,
            formats: [initial; 2],
            stats: Stats::default(),
        }
    }

    /// Gives the receiver instance.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Gives the ISP revision.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns `true` if the receiver exists in this ISP.
    pub fn available(&self) -> bool {
        self.available
    }

    /// Gives the streaming state.
    pub fn state(&self) -> StreamState {
        if !self.streaming {
            StreamState::Idle
        } else if self.underrun {
            StreamState::Underrun
        } else {
            StreamState::Streaming
        }
    }

    /// Gives the current output routing.
    pub fn output(&self) -> Output {
        self.output
    }

    /// Returns `true` if the DPCM decompression was enabled by the last stream
    /// start.
    pub fn dpcm_decompress(&self) -> bool {
        self.dpcm_decompress
    }

    /// Gives the receiver control configuration.
    pub fn control(&self) -> &Control {
        &self.ctrl
    }

    /// Gives the configuration of a context.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not a valid context number.
    pub fn context(&self, n: u8) -> &Context {
        &self.contexts[usize::from(n)]
    }

    /// Gives the frame and error counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Gives access to the buffer queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Gives mutable access to the buffer queue.
    ///
    /// Buffers must be added with [`Receiver::queue_buffer`] rather than
    /// through this reference, so that the hardware is updated.
    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// Sets the sensor bus parameters used by the next stream start.
    pub fn set_bus_config(&mut self, bus: BusConfig) {
        self.bus = bus;
    }

    /// Resets the receiver.
    ///
    /// Fails with [`Error::Busy`] if the PHY is in use. See
    /// [`timing::reset`](crate::timing) for the reset handshake.
    pub fn reset<D: Delay>(&mut self, delay: &mut D) -> Result<(), Error> {
        if !self.available {
            return Err(Error::DeviceUnavailable);
        }
        if self.phy.in_use() {
            return Err(Error::Busy);
        }
        timing::reset(&mut self.regs, self.revision, delay)?;
        tracing::info!(instance = %self.instance, "receiver reset");
        Ok(())
    }

    /// Gives the format of a pad.
    pub fn format(&self, pad: Pad) -> PadFormat {
        self.formats[pad_index(pad)]
    }

    /// Sets the format of a pad.
    ///
    /// The format is adjusted with [`format::try_format`] and the adjusted
    /// format is returned. Setting the sink format also resets the source
    /// format to follow it. Fails with [`Error::Busy`] while streaming.
    pub fn set_format(&mut self, pad: Pad, mut fmt: PadFormat) -> Result<PadFormat, Error> {
        if self.streaming {
            return Err(Error::Busy);
        }
        let sink = self.formats[pad_index(Pad::Sink)];
        format::try_format(pad, &mut fmt, &sink);
        self.formats[pad_index(pad)] = fmt;
        if pad == Pad::Sink {
            let mut source = fmt;
            format::try_format(Pad::Source, &mut source, &fmt);
            self.formats[pad_index(Pad::Source)] = source;
        }
        tracing::debug!(
            ?pad,
            code = %fmt.code,
            width = fmt.width,
            height = fmt.height,
            "format set"
        );
        Ok(fmt)
    }

    /// Enumerates the codes supported by a pad. See [`format::enum_mbus_code`].
    pub fn enum_mbus_code(&self, pad: Pad, index: usize) -> Option<MbusCode> {
        format::enum_mbus_code(pad, index, &self.formats[pad_index(Pad::Sink)])
    }

    /// Gives the frame size range of a code on a pad. See
    /// [`format::enum_frame_size`].
    pub fn enum_frame_size(&self, pad: Pad, code: MbusCode) -> Option<FrameSizeRange> {
        format::enum_frame_size(pad, code, &self.formats[pad_index(Pad::Sink)])
    }

    /// Activates or deactivates a link.
    ///
    /// Only the links from the source pad to a video node or to a processing
    /// stage can be changed. The video port control bits are recomputed, but
    /// they only reach the hardware at the next stream start.
    pub fn link_setup(&mut self, local: Pad, remote: Remote, active: bool) -> Result<(), Error> {
        let output = match (local, remote) {
            (Pad::Source, Remote::VideoNode) => Output::MEMORY,
            (Pad::Source, Remote::Subdev) => Output::CASCADE,
            _ => return Err(Error::InvalidTopology),
        };
        self.output.set(output, active);
        self.ctrl.vp_only_enable = !self.output.contains(Output::MEMORY);
        self.ctrl.vp_clk_enable = self.output.contains(Output::CASCADE);
        tracing::debug!(output = ?self.output, "link setup");
        Ok(())
    }

    /// Starts streaming.
    ///
    /// Configures the receiver and context 0 and enables the interrupts. If
    /// frames are not written to memory, or a buffer is already queued, the
    /// capture starts immediately. Otherwise the receiver stays in underrun
    /// until a buffer is queued.
    pub fn start_stream(&mut self) -> Result<(), Error> {
        if !self.available {
            return Err(Error::DeviceUnavailable);
        }
        if self.streaming || self.contexts[0].enabled() || self.ctrl.if_enable {
            return Err(Error::Busy);
        }
        let sink = self.formats[pad_index(Pad::Sink)];
        let source = self.formats[pad_index(Pad::Source)];
        let decompress = sink.code != source.code;
        let phys_format = format::map_format(sink.code, decompress, self.output, self.revision)?;

        self.phy.acquire()?;
        self.configure(decompress, phys_format);
        self.streaming = true;

        if !self.output.contains(Output::MEMORY) || self.buffers_ready {
            self.context_enable(true);
            self.interface_enable(true);
        } else {
            self.underrun = true;
        }
        tracing::info!(
            instance = %self.instance,
            code = %sink.code,
            decompress,
            format = phys_format.0,
            state = %self.state(),
            "stream started"
        );
        Ok(())
    }

    /// Stops streaming.
    ///
    /// This can be called in any state. Queued buffers are flushed from the
    /// buffer queue.
    pub fn stop_stream(&mut self) {
        self.buffers_ready = false;
        self.underrun = false;
        self.context_enable(false);
        self.interface_enable(false);
        self.irq_context_set(false);
        self.queue.flush();
        if self.streaming {
            self.phy.release();
            self.streaming = false;
            tracing::info!(instance = %self.instance, "stream stopped");
        }
    }

    /// Queues a destination buffer.
    ///
    /// If the buffer becomes the head of the queue, its address is programmed
    /// immediately, as in [`Receiver::on_buffer_enqueued`].
    pub fn queue_buffer(&mut self, buffer: Q::Buffer) {
        if let Some(addr) = self.queue.queue(buffer) {
            self.on_buffer_enqueued(addr);
        }
    }

    /// Programs the address of a newly queued buffer.
    ///
    /// This leaves the underrun state if the receiver was waiting for a
    /// buffer.
    pub fn on_buffer_enqueued(&mut self, addr: u32) {
        self.contexts[0].set_output_address(&mut self.regs, addr);
        if self.underrun {
            self.underrun = false;
            self.interface_enable(true);
            self.context_enable(true);
            tracing::debug!("underrun recovered");
        }
        self.buffers_ready = true;
    }

    /// Dumps the receiver registers.
    ///
    /// Each register is logged at debug level. The register names and values
    /// are also returned. Nothing is dumped if the receiver is not available.
    pub fn regdump(&self) -> Vec<(&'static str, u32)> {
        if !self.available {
            return Vec::new();
        }
        REGDUMP
            .iter()
            .map(|&(name, block, offset)| {
                let value = self.regs.read(block, offset);
                tracing::debug!("{name} = {value:#010x}");
                (name, value)
            })
            .collect()
    }

    fn configure(&mut self, decompress: bool, phys_format: PhysFormat) {
        self.ctrl.vp_out_ctrl = self.bus.vpclk_div;
        self.ctrl.frame_mode = FrameMode::Immediate;
        self.ctrl.ecc_enable = self.bus.crc;
        self.timing = Timing::default();
        self.dpcm_decompress = decompress;

        let ctx = &mut self.contexts[0];
        ctx.format = phys_format;
        ctx.dpcm_decompress = decompress;
        // no padding at the end of the lines
        ctx.data_offset = 0;
        ctx.eof_enabled = true;

        self.irq_complexio_set(true);
        self.irq_context_set(true);
        self.irq_status_set(true);

        self.timing.configure(&mut self.regs);
        self.ctrl.configure(&mut self.regs);
        self.contexts[0].configure(&mut self.regs);
    }

    pub(crate) fn context_enable(&mut self, enable: bool) {
        let memory = self.output.contains(Output::MEMORY);
        self.contexts[0].enable(&mut self.regs, enable, memory);
    }

    fn interface_enable(&mut self, enable: bool) {
        self.regs.clr_set(
            Block::Csi2,
            csi2::CTRL,
            csi2::CTRL_IF_EN,
            if enable { csi2::CTRL_IF_EN } else { 0 },
        );
        self.ctrl.if_enable = enable;
    }

    fn irq_context_set(&mut self, enable: bool) {
        for n in 0..csi2::NUM_CONTEXTS {
            self.regs.write(
                Block::Csi2,
                csi2::ctx_irqstatus(n),
                csi2::CTX_IRQSTATUS_FE,
            );
            if enable {
                self.regs
                    .set_bits(Block::Csi2, csi2::ctx_irqenable(n), csi2::CTX_IRQSTATUS_FE);
            } else {
                self.regs
                    .clr_bits(Block::Csi2, csi2::ctx_irqenable(n), csi2::CTX_IRQSTATUS_FE);
            }
        }
    }

    fn irq_complexio_set(&mut self, enable: bool) {
        let mask = csi2::PHY_IRQ_ALL;
        self.regs.write(Block::Csi2, csi2::PHY_IRQSTATUS, mask);
        if enable {
            self.regs.set_bits(Block::Csi2, csi2::PHY_IRQENABLE, mask);
        } else {
            self.regs.write(Block::Csi2, csi2::PHY_IRQENABLE, 0);
        }
    }

    fn irq_status_set(&mut self, enable: bool) {
        let mask = csi2::IRQSTATUS_OCP_ERR
            | csi2::IRQSTATUS_SHORT_PACKET
            | csi2::IRQSTATUS_ECC_CORRECTION
            | csi2::IRQSTATUS_ECC_NO_CORRECTION
            | csi2::IRQSTATUS_COMPLEXIO2_ERR
            | csi2::IRQSTATUS_COMPLEXIO1_ERR
            | csi2::IRQSTATUS_FIFO_OVF
            | csi2::irqstatus_context(0);
        self.regs.write(Block::Csi2, csi2::IRQSTATUS, mask);
        if enable {
            self.regs.set_bits(Block::Csi2, csi2::IRQENABLE, mask);
        } else {
            self.regs.write(Block::Csi2, csi2::IRQENABLE, 0);
        }
    }
}
