//! Simulated OpenCores-style Ethernet MAC.
//!
//! The device exposes a 2 KiB register window (control registers plus 128 buffer descriptors)
//! and moves frames between guest memory and a [`PacketBackend`] with two independent engines.
//! Each engine advances by one state transition, or one copy of at most four bytes, per call to
//! [`EthMac::step`]; the owner decides when that happens through an [`EngineScheduler`].
#![forbid(unsafe_code)]

pub mod descriptor;
mod device;
pub mod regs;
mod rx;
mod status;
mod tx;

pub use device::{
    Engine, EngineScheduler, EthMac, StepStatus, VapiChannel, VapiObserver, ETHER_HDR_LEN,
    MAX_PACKET_LEN, VAPI_ID_COUNT,
};
pub use descriptor::{BufferDescriptor, DescriptorRam, RxBdFlags, TxBdFlags};
pub use regs::{IntBits, Moder, Reg, Registers, MMIO_WINDOW_LEN};
pub use rx::RxState;
pub use status::MacStatus;
pub use tx::TxState;

pub use ethsim_net_backend::PacketBackend;
