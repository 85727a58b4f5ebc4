//! CSI-2 PHY.
//!
//! The PHY is shared between the receivers of the ISP. Only one receiver can
//! stream through it at a time.

use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared CSI-2 PHY.
///
/// This struct behaves as an `Arc<...>`: clones refer to the same PHY and see
/// the same ownership state.
#[derive(Debug, Clone)]
pub struct CsiPhy(Arc<Phy>);

#[derive(Debug)]
struct Phy {
    name: &'static str,
    in_use: AtomicBool,
}

impl CsiPhy {
    /// Creates a new PHY, initially free.
    pub fn new(name: &'static str) -> CsiPhy {
        CsiPhy(Arc::new(Phy {
            name,
            in_use: AtomicBool::new(false),
        }))
    }

    /// Gives the name of the PHY.
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Returns `true` if a streamer currently owns the PHY.
    pub fn in_use(&self) -> bool {
        self.0.in_use.load(Ordering::Acquire)
    }

    /// Acquires exclusive use of the PHY.
    ///
    /// Fails immediately with [`Error::PhyInUse`] if it is already owned.
    pub fn acquire(&self) -> Result<(), Error> {
        self.0
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::PhyInUse)?;
        tracing::debug!(phy = self.0.name, "acquired");
        Ok(())
    }

    /// Releases the PHY.
    pub fn release(&self) {
        if self.0.in_use.swap(false, Ordering::AcqRel) {
            tracing::debug!(phy = self.0.name, "released");
        }
    }
}
