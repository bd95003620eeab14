//! Register file layout.

use bitflags::bitflags;
use serde::Serialize;

/// Size of the device's MMIO window.
pub const MMIO_WINDOW_LEN: u64 = 0x800;

/// Start of the buffer descriptor RAM inside the MMIO window.
pub const BD_RAM_OFFSET: u64 = 0x400;

/// Size of the buffer descriptor RAM inside the MMIO window.
pub const BD_RAM_LEN: u64 = 0x400;

bitflags! {
    /// MODER: mode register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Moder: u32 {
        const RXEN = 1 << 0;
        const TXEN = 1 << 1;
        const NOPRE = 1 << 2;
        const BRO = 1 << 3;
        const IAM = 1 << 4;
        const PRO = 1 << 5;
        const IFG = 1 << 6;
        const LOOPBCK = 1 << 7;
        const NOBCKOF = 1 << 8;
        const EXDFREN = 1 << 9;
        const FULLD = 1 << 10;
        const RST = 1 << 11;
        const DLYCRCEN = 1 << 12;
        const CRCEN = 1 << 13;
        const HUGEN = 1 << 14;
        const PAD = 1 << 15;
        const RECSMALL = 1 << 16;
    }
}

bitflags! {
    /// INT_SOURCE and INT_MASK share one layout.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct IntBits: u32 {
        const TXB = 1 << 0;
        const TXE = 1 << 1;
        const RXB = 1 << 2;
        const RXE = 1 << 3;
        const BUSY = 1 << 4;
        const TXC = 1 << 5;
        const RXC = 1 << 6;
    }
}

/// Named registers, in offset order starting at 0 with a 4-byte stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Moder,
    IntSource,
    IntMask,
    Ipgt,
    Ipgr1,
    Ipgr2,
    PacketLen,
    CollConf,
    TxBdNum,
    CtrlModer,
    MiiModer,
    MiiCommand,
    MiiAddress,
    MiiTxData,
    MiiRxData,
    MiiStatus,
    MacAddr0,
    MacAddr1,
    Hash0,
    Hash1,
}

impl Reg {
    pub const ALL: [Reg; 20] = [
        Reg::Moder,
        Reg::IntSource,
        Reg::IntMask,
        Reg::Ipgt,
        Reg::Ipgr1,
        Reg::Ipgr2,
        Reg::PacketLen,
        Reg::CollConf,
        Reg::TxBdNum,
        Reg::CtrlModer,
        Reg::MiiModer,
        Reg::MiiCommand,
        Reg::MiiAddress,
        Reg::MiiTxData,
        Reg::MiiRxData,
        Reg::MiiStatus,
        Reg::MacAddr0,
        Reg::MacAddr1,
        Reg::Hash0,
        Reg::Hash1,
    ];

    pub const fn offset(self) -> u64 {
        (self as u64) * 4
    }

    pub fn decode(offset: u64) -> Option<Self> {
        if offset % 4 != 0 {
            return None;
        }
        Self::ALL.get(usize::try_from(offset / 4).ok()?).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Reg::Moder => "MODER",
            Reg::IntSource => "INT_SOURCE",
            Reg::IntMask => "INT_MASK",
            Reg::Ipgt => "IPGT",
            Reg::Ipgr1 => "IPGR1",
            Reg::Ipgr2 => "IPGR2",
            Reg::PacketLen => "PACKETLEN",
            Reg::CollConf => "COLLCONF",
            Reg::TxBdNum => "TX_BD_NUM",
            Reg::CtrlModer => "CTRLMODER",
            Reg::MiiModer => "MIIMODER",
            Reg::MiiCommand => "MIICOMMAND",
            Reg::MiiAddress => "MIIADDRESS",
            Reg::MiiTxData => "MIITX_DATA",
            Reg::MiiRxData => "MIIRX_DATA",
            Reg::MiiStatus => "MIISTATUS",
            Reg::MacAddr0 => "MAC_ADDR0",
            Reg::MacAddr1 => "MAC_ADDR1",
            Reg::Hash0 => "HASH0",
            Reg::Hash1 => "HASH1",
        }
    }
}

/// Stored register values. The MAC address registers are derived from the device's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub moder: u32,
    pub int_source: u32,
    pub int_mask: u32,
    pub ipgt: u32,
    pub ipgr1: u32,
    pub ipgr2: u32,
    pub packetlen: u32,
    pub collconf: u32,
    pub tx_bd_num: u32,
    pub ctrlmoder: u32,
    pub miimoder: u32,
    pub miicommand: u32,
    pub miiaddress: u32,
    pub miitx_data: u32,
    pub miirx_data: u32,
    pub miistatus: u32,
    pub hash0: u32,
    pub hash1: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            moder: 0x0000_A000,
            int_source: 0,
            int_mask: 0,
            ipgt: 0x12,
            ipgr1: 0x0C,
            ipgr2: 0x12,
            packetlen: 0x003C_0600,
            collconf: 0x000F_003F,
            tx_bd_num: 0x40,
            ctrlmoder: 0,
            miimoder: 0x64,
            miicommand: 0,
            miiaddress: 0,
            miitx_data: 0,
            miirx_data: 0,
            miistatus: 0,
            hash0: 0,
            hash1: 0,
        }
    }
}

impl Registers {
    pub fn moder(&self) -> Moder {
        Moder::from_bits_retain(self.moder)
    }

    pub fn int_mask(&self) -> IntBits {
        IntBits::from_bits_retain(self.int_mask)
    }

    /// PACKETLEN.MINFL.
    pub fn min_frame_len(&self) -> usize {
        (self.packetlen >> 16) as usize
    }

    /// PACKETLEN.MAXFL.
    pub fn max_frame_len(&self) -> usize {
        (self.packetlen & 0xFFFF) as usize
    }

    pub(crate) fn raise(&mut self, cause: IntBits) {
        self.int_source |= cause.bits();
    }

    /// Plain storage for every register without side effects.
    pub(crate) fn slot_mut(&mut self, reg: Reg) -> Option<&mut u32> {
        Some(match reg {
            Reg::Moder => &mut self.moder,
            Reg::IntSource => &mut self.int_source,
            Reg::IntMask => &mut self.int_mask,
            Reg::Ipgt => &mut self.ipgt,
            Reg::Ipgr1 => &mut self.ipgr1,
            Reg::Ipgr2 => &mut self.ipgr2,
            Reg::PacketLen => &mut self.packetlen,
            Reg::CollConf => &mut self.collconf,
            Reg::TxBdNum => &mut self.tx_bd_num,
            Reg::CtrlModer => &mut self.ctrlmoder,
            Reg::MiiModer => &mut self.miimoder,
            Reg::MiiCommand => &mut self.miicommand,
            Reg::MiiAddress => &mut self.miiaddress,
            Reg::MiiTxData => &mut self.miitx_data,
            Reg::MiiRxData => &mut self.miirx_data,
            Reg::MiiStatus => &mut self.miistatus,
            Reg::Hash0 => &mut self.hash0,
            Reg::Hash1 => &mut self.hash1,
            Reg::MacAddr0 | Reg::MacAddr1 => return None,
        })
    }

    pub(crate) fn get(&self, reg: Reg) -> Option<u32> {
        Some(match reg {
            Reg::Moder => self.moder,
            Reg::IntSource => self.int_source,
            Reg::IntMask => self.int_mask,
            Reg::Ipgt => self.ipgt,
            Reg::Ipgr1 => self.ipgr1,
            Reg::Ipgr2 => self.ipgr2,
            Reg::PacketLen => self.packetlen,
            Reg::CollConf => self.collconf,
            Reg::TxBdNum => self.tx_bd_num,
            Reg::CtrlModer => self.ctrlmoder,
            Reg::MiiModer => self.miimoder,
            Reg::MiiCommand => self.miicommand,
            Reg::MiiAddress => self.miiaddress,
            Reg::MiiTxData => self.miitx_data,
            Reg::MiiRxData => self.miirx_data,
            Reg::MiiStatus => self.miistatus,
            Reg::Hash0 => self.hash0,
            Reg::Hash1 => self.hash1,
            Reg::MacAddr0 | Reg::MacAddr1 => return None,
        })
    }
}

/// MAC_ADDR0 carries wire bytes 2..=5, byte 5 in the low bits.
pub fn mac_addr0(mac: &[u8; 6]) -> u32 {
    u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]])
}

/// MAC_ADDR1 carries wire bytes 0..=1, byte 1 in the low bits.
pub fn mac_addr1(mac: &[u8; 6]) -> u32 {
    u32::from(u16::from_be_bytes([mac[0], mac[1]]))
}

pub(crate) fn set_mac_addr0(mac: &mut [u8; 6], value: u32) {
    mac[2..6].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn set_mac_addr1(mac: &mut [u8; 6], value: u32) {
    mac[0..2].copy_from_slice(&(value as u16).to_be_bytes());
}
