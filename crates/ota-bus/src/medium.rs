//! Shared broadcast medium.
//!
//! All attached endpoints see every frame. The medium is lossy by
//! construction: it holds a bounded history, and a receiver that falls too
//! far behind under bursty load skips the overwritten frames.

use tokio::sync::broadcast;

use crate::frame::BusFrame;

/// Default frame capacity of the medium's history buffer.
pub const DEFAULT_BUS_CAPACITY: usize = 4096;

/// A shared, lossy, broadcast bus.
///
/// Cloning is cheap; all clones refer to the same medium.
#[derive(Debug, Clone)]
pub struct SharedBus {
    tx: broadcast::Sender<BusFrame>,
}

impl SharedBus {
    /// Create a medium with the given frame capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a new endpoint. The endpoint only observes frames emitted
    /// after attachment.
    #[must_use]
    pub fn attach(&self) -> BusEndpoint {
        BusEndpoint {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SharedBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// One attachment to the shared medium, able to emit and observe frames.
#[derive(Debug)]
pub struct BusEndpoint {
    tx: broadcast::Sender<BusFrame>,
    pub(crate) rx: broadcast::Receiver<BusFrame>,
}

impl BusEndpoint {
    /// Emit one frame onto the medium.
    ///
    /// A frame emitted with no attached listeners simply vanishes, as it
    /// would on a real bus.
    pub fn emit(&self, frame: BusFrame) {
        let _ = self.tx.send(frame);
    }
}
