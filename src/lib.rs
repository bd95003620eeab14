//! Simulated OpenCores-style Ethernet MAC.
//!
//! The workspace is split the same way the device is wired: [`config`] parses simulator
//! configuration files, [`net`] moves frames to and from the host, [`ethmac`] is the register and
//! DMA model, and [`machine`] ties MACs to memory, interrupts and the tick scheduler.
#![forbid(unsafe_code)]

pub use ethsim_config as config;
pub use ethsim_ethmac as ethmac;
pub use ethsim_machine as machine;
pub use ethsim_net_backend as net;

pub use ethsim_machine::{RunExit, Simulator};
