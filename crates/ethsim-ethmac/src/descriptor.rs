//! Buffer descriptor RAM and ring arithmetic.
//!
//! Descriptors are two words (control/status, buffer address) and are addressed by the index of
//! their first word, so indices are always even. TX descriptors occupy `[0, 2 * tx_bd_num)` and
//! RX descriptors the rest of the RAM.

use bitflags::bitflags;

/// Number of 32-bit words of descriptor RAM.
pub const BD_RAM_WORDS: usize = 256;

/// Largest value TX_BD_NUM accepts.
pub const MAX_TX_BD_NUM: u32 = 0x80;

const LENGTH_SHIFT: u32 = 16;
const FLAGS_MASK: u32 = 0xFFFF;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TxBdFlags: u32 {
        const READY = 1 << 15;
        const IRQ = 1 << 14;
        const WRAP = 1 << 13;
        const PAD = 1 << 12;
        const CRC = 1 << 11;
        const UNDERRUN = 1 << 8;
        const RETRY = 0xF << 4;
        const RETRANSMIT_LIMIT = 1 << 3;
        const LATE_COLLISION = 1 << 2;
        const DEFER = 1 << 1;
        const CARRIER_LOST = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RxBdFlags: u32 {
        /// Set by software when the buffer may be filled; cleared by the MAC when it is.
        const EMPTY = 1 << 15;
        const IRQ = 1 << 14;
        const WRAP = 1 << 13;
        const CONTROL = 1 << 8;
        const MISS = 1 << 7;
        const OVERRUN = 1 << 6;
        const INVALID_SYMBOL = 1 << 5;
        const DRIBBLE = 1 << 4;
        const TOO_LONG = 1 << 3;
        const TOO_SHORT = 1 << 2;
        const CRC_ERROR = 1 << 1;
        const LATE_COLLISION = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub ctrl: u32,
    pub addr: u32,
}

impl BufferDescriptor {
    pub fn len(&self) -> usize {
        (self.ctrl >> LENGTH_SHIFT) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_len(&mut self, len: usize) {
        let len = (len as u32) & FLAGS_MASK;
        self.ctrl = (self.ctrl & FLAGS_MASK) | (len << LENGTH_SHIFT);
    }

    pub fn tx_flags(&self) -> TxBdFlags {
        TxBdFlags::from_bits_retain(self.ctrl & FLAGS_MASK)
    }

    pub fn set_tx_flags(&mut self, flags: TxBdFlags) {
        self.ctrl = (self.ctrl & !FLAGS_MASK) | (flags.bits() & FLAGS_MASK);
    }

    pub fn rx_flags(&self) -> RxBdFlags {
        RxBdFlags::from_bits_retain(self.ctrl & FLAGS_MASK)
    }

    pub fn set_rx_flags(&mut self, flags: RxBdFlags) {
        self.ctrl = (self.ctrl & !FLAGS_MASK) | (flags.bits() & FLAGS_MASK);
    }
}

#[derive(Clone)]
pub struct DescriptorRam {
    words: Box<[u32; BD_RAM_WORDS]>,
}

impl Default for DescriptorRam {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DescriptorRam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_use = self.words.iter().filter(|&&w| w != 0).count();
        f.debug_struct("DescriptorRam")
            .field("nonzero_words", &in_use)
            .finish()
    }
}

impl DescriptorRam {
    pub fn new() -> Self {
        Self {
            words: Box::new([0; BD_RAM_WORDS]),
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..]
    }

    /// Out-of-range words read as zero.
    pub fn read_word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Out-of-range writes are dropped.
    pub fn write_word(&mut self, index: usize, value: u32) {
        if let Some(word) = self.words.get_mut(index) {
            *word = value;
        }
    }

    pub fn load(&self, index: usize) -> BufferDescriptor {
        BufferDescriptor {
            ctrl: self.read_word(index),
            addr: self.read_word(index + 1),
        }
    }

    /// Write back the control/status word. The buffer address is never modified by the MAC.
    pub fn store_ctrl(&mut self, index: usize, bd: &BufferDescriptor) {
        self.write_word(index, bd.ctrl);
    }
}

/// Index of the first RX descriptor for a given TX_BD_NUM.
pub fn rx_ring_start(tx_bd_num: u32) -> usize {
    (tx_bd_num as usize) << 1
}

pub fn next_tx_index(index: usize, wrap: bool) -> usize {
    if wrap || index + 2 >= BD_RAM_WORDS {
        0
    } else {
        index + 2
    }
}

pub fn next_rx_index(index: usize, wrap: bool, tx_bd_num: u32) -> usize {
    if wrap || index + 2 >= BD_RAM_WORDS {
        rx_ring_start(tx_bd_num)
    } else {
        index + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_and_flags_share_the_control_word() {
        let mut bd = BufferDescriptor::default();
        bd.set_len(64);
        bd.set_tx_flags(TxBdFlags::READY | TxBdFlags::WRAP);
        assert_eq!(bd.ctrl, 0x0040_A000);
        assert_eq!(bd.len(), 64);

        bd.set_len(0x1_0005);
        assert_eq!(bd.len(), 5);
        assert!(bd.tx_flags().contains(TxBdFlags::READY));
    }

    #[test]
    fn out_of_range_access_is_harmless() {
        let mut ram = DescriptorRam::new();
        ram.write_word(BD_RAM_WORDS, 0xDEAD_BEEF);
        assert_eq!(ram.read_word(BD_RAM_WORDS), 0);
        assert_eq!(ram.load(BD_RAM_WORDS - 1).addr, 0);
        assert!(ram.words().iter().all(|&w| w == 0));
    }

    #[test]
    fn rings_wrap_to_their_own_start() {
        assert_eq!(next_tx_index(0, false), 2);
        assert_eq!(next_tx_index(10, true), 0);
        assert_eq!(next_tx_index(254, false), 0);
        assert_eq!(next_rx_index(128, false, 0x40), 130);
        assert_eq!(next_rx_index(200, true, 0x40), 128);
        assert_eq!(next_rx_index(254, false, 0x10), 32);
    }
}
