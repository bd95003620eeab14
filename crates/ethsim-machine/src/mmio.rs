use memory::MmioHandler;

use crate::SharedMac;

/// Routes a bus window to a MAC that the simulator also steps directly.
///
/// A device DMA that lands in its own register window finds the MAC already borrowed; such
/// accesses read as zero and writes are dropped.
pub struct SharedMmio {
    mac: SharedMac,
    base: u64,
}

impl SharedMmio {
    pub fn new(mac: SharedMac, base: u64) -> Self {
        Self { mac, base }
    }
}

impl MmioHandler for SharedMmio {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        match self.mac.try_borrow_mut() {
            Ok(mut mac) => MmioHandler::read(&mut *mac, offset, size),
            Err(_) => {
                tracing::warn!(
                    addr = self.base + offset,
                    "re-entrant read of Ethernet MAC registers"
                );
                0
            }
        }
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        match self.mac.try_borrow_mut() {
            Ok(mut mac) => MmioHandler::write(&mut *mac, offset, size, value),
            Err(_) => tracing::warn!(
                addr = self.base + offset,
                value,
                "re-entrant write of Ethernet MAC registers dropped"
            ),
        }
    }
}
