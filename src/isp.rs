//! ISP hardware.
//!
//! This module opens the ISP through its UIO device, maps the register blocks
//! used by the CSI2A receiver and brings the receiver to a known state.

use crate::buffer::FrameQueue;
use crate::format::Revision;
use crate::interrupt::InterruptHandler;
use crate::phy::CsiPhy;
use crate::receiver::{BusConfig, Instance, Receiver};
use crate::regs::{main, Block, RegisterIo, UioRegisters};
use crate::timing::StdDelay;
use crate::uio::{Mapping, Uio};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

/// CSI-2 receiver backed by the ISP hardware.
pub type Csi2Receiver = Receiver<UioRegisters, FrameQueue>;

// UIO mappings of the ISP device.
const MAP_MAIN: usize = 0;
const MAP_CSI2A: usize = 1;
const MAP_CSIPHY2: usize = 2;

async fn map_block(uio: &Uio, uio_name: &str, mapping: usize, block: Block) -> Result<Mapping> {
    uio.map_register_block(mapping, block.size())
        .await
        .with_context(|| format!("failed to map {block:?} registers of {uio_name}"))
}

/// Opens the CSI2A receiver of the ISP.
///
/// The UIO device `uio_name` is opened and its register blocks are mapped. The
/// receiver is reset and its interrupt is enabled at the ISP top level. The
/// receiver is returned behind the mutex that serializes all the accesses to
/// it, together with the [`InterruptHandler`] that runs its interrupt handler.
#[tracing::instrument(name = "isp::take", level = "debug")]
pub async fn take(
    uio_name: &str,
    bus: BusConfig,
) -> Result<(Arc<Mutex<Csi2Receiver>>, InterruptHandler)> {
    let uio = Uio::from_name(uio_name)
        .await
        .with_context(|| format!("failed to open {uio_name} UIO"))?;
    let main_regs = map_block(&uio, uio_name, MAP_MAIN, Block::Main).await?;
    let csi2_regs = map_block(&uio, uio_name, MAP_CSI2A, Block::Csi2).await?;
    let phy_regs = map_block(&uio, uio_name, MAP_CSIPHY2, Block::Phy).await?;
    let regs = UioRegisters::new(main_regs, csi2_regs, phy_regs);

    let revision_reg = regs.read(Block::Main, main::REVISION);
    let revision = Revision::from_register(revision_reg);
    let instance = Instance::Csi2a;
    tracing::info!(
        %instance,
        %revision,
        revision_reg = %format!("{revision_reg:#010x}"),
        "opened ISP"
    );

    let phy = CsiPhy::new(instance.phy_name());
    let mut receiver = Receiver::new(regs, instance, revision, phy, FrameQueue::new(), bus);
    receiver
        .reset(&mut StdDelay)
        .context("failed to reset CSI-2 receiver")?;
    receiver.isp_irq_enable(true);

    let receiver = Arc::new(Mutex::new(receiver));
    let interrupt_handler = InterruptHandler::new(uio, Arc::clone(&receiver));
    Ok((receiver, interrupt_handler))
}
