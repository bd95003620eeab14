//! Simulated physical memory for device models.
//!
//! [`MemoryBus`] is the interface DMA-capable devices use to reach memory. [`Bus`] is a flat RAM
//! implementation with [`MmioHandler`] windows layered on top, which is what the simulator uses
//! to route register accesses to peripherals.
#![forbid(unsafe_code)]

mod bus;

pub use bus::{Bus, MapError, MemoryBus, MmioHandler};
