use ethsim_interrupts::InvalidIrqLine;
use memory::MapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to map Ethernet MAC registers: {0}")]
    Map(#[from] MapError),

    #[error(transparent)]
    Irq(#[from] InvalidIrqLine),
}
