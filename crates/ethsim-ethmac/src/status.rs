use std::fmt;

use ethsim_config::MacAddress;
use serde::Serialize;

use crate::regs::{Reg, Registers};
use crate::rx::RxState;
use crate::tx::TxState;

/// Point-in-time snapshot of a MAC for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacStatus {
    pub base_addr: u64,
    pub mac: MacAddress,
    pub registers: Registers,
    pub tx_state: TxState,
    pub rx_state: RxState,
    pub tx_bd_index: usize,
    pub rx_bd_index: usize,
}

impl fmt::Display for MacStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.registers;
        writeln!(f, "Ethernet MAC at 0x{:x}:", self.base_addr)?;
        for reg in Reg::ALL.into_iter().take_while(|&reg| reg != Reg::MacAddr0) {
            let value = r.get(reg).unwrap_or(0);
            writeln!(f, "{:<13}: 0x{value:08X}", reg.name())?;
        }
        writeln!(f, "{:<13}: {}", "MAC Address", self.mac)?;
        writeln!(f, "{:<13}: 0x{:08X}", "HASH0", r.hash0)?;
        writeln!(f, "{:<13}: 0x{:08X}", "HASH1", r.hash1)?;
        write!(
            f,
            "TX {:?} @ BD {}, RX {:?} @ BD {}",
            self.tx_state, self.tx_bd_index, self.rx_state, self.rx_bd_index
        )
    }
}
