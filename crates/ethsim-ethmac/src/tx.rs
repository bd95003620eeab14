use memory::MemoryBus;
use serde::Serialize;

use crate::descriptor::{next_tx_index, BufferDescriptor, TxBdFlags};
use crate::device::{EthMac, MAX_PACKET_LEN};
use crate::regs::{IntBits, Moder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum TxState {
    #[default]
    Idle,
    /// Polling the current descriptor for READY.
    WaitBd,
    /// Staging the packet from guest memory, four bytes per step.
    ReadFifo,
    /// Handing the staged frame to the backend.
    Transmit,
}

#[derive(Debug, Default)]
pub(crate) struct TxContext {
    pub state: TxState,
    pub bd_index: usize,
    pub bd: BufferDescriptor,
    pub packet_len: usize,
    pub frame_len: usize,
    pub bytes_sent: usize,
    pub min_len: usize,
    pub add_crc: bool,
    pub crc_delayed: bool,
}

const TX_STATUS_BITS: TxBdFlags = TxBdFlags::DEFER
    .union(TxBdFlags::LATE_COLLISION)
    .union(TxBdFlags::RETRANSMIT_LIMIT)
    .union(TxBdFlags::UNDERRUN)
    .union(TxBdFlags::CARRIER_LOST)
    .union(TxBdFlags::RETRY);

impl EthMac {
    pub(crate) fn step_tx(&mut self, mem: &mut dyn MemoryBus) {
        match self.tx.state {
            TxState::Idle => self.tx.state = TxState::WaitBd,
            TxState::WaitBd => self.tx_wait_bd(),
            TxState::ReadFifo => self.tx_read_fifo(mem),
            TxState::Transmit => self.tx_transmit(),
        }
    }

    fn tx_wait_bd(&mut self) {
        let mut bd = self.bd_ram.load(self.tx.bd_index);
        let mut flags = bd.tx_flags();
        if !flags.contains(TxBdFlags::READY) {
            return;
        }

        flags.remove(TX_STATUS_BITS);
        bd.set_tx_flags(flags);

        let moder = self.regs.moder();
        let packet_len = bd.len();
        let min_len = if flags.contains(TxBdFlags::PAD) || moder.contains(Moder::PAD) {
            self.regs.min_frame_len()
        } else {
            packet_len
        };
        let max_len = if moder.contains(Moder::HUGEN) {
            packet_len
        } else {
            self.regs.max_frame_len()
        };
        let frame_len = packet_len.max(min_len).min(MAX_PACKET_LEN);

        self.tx.bd = bd;
        self.tx.packet_len = packet_len;
        self.tx.frame_len = frame_len;
        self.tx.bytes_sent = 0;
        self.tx.min_len = min_len;
        // CRC generation is not modelled; the flags only record what was requested.
        self.tx.add_crc = moder.contains(Moder::CRCEN) || flags.contains(TxBdFlags::CRC);
        self.tx.crc_delayed = moder.contains(Moder::DLYCRCEN);

        if frame_len > max_len {
            tracing::debug!(frame_len, max_len, "transmitting oversized frame");
        }
        if let Err(err) = self.backend.begin_transmit(frame_len) {
            tracing::warn!(%err, "failed to start transmit record");
        }

        self.tx.state = TxState::ReadFifo;
    }

    fn tx_read_fifo(&mut self, mem: &mut dyn MemoryBus) {
        let sent = self.tx.bytes_sent;
        if sent < self.tx.packet_len {
            let n = (self.tx.packet_len - sent).min(4);
            let src = u64::from(self.tx.bd.addr) + sent as u64;
            mem.read_physical(src, &mut self.tx_buf[sent..sent + n]);
            self.tx.bytes_sent += n;
        }
        if self.tx.bytes_sent >= self.tx.packet_len {
            self.tx.state = TxState::Transmit;
        }
    }

    fn tx_transmit(&mut self) {
        let TxContext {
            packet_len,
            frame_len,
            bd_index,
            min_len,
            add_crc,
            crc_delayed,
            ..
        } = self.tx;
        tracing::trace!(bd_index, packet_len, min_len, add_crc, crc_delayed, "transmit");
        self.tx_buf[packet_len..frame_len].fill(0);

        let result = self.backend.transmit(&self.tx_buf[..frame_len]);
        let mut flags = self.tx.bd.tx_flags();
        flags.remove(TxBdFlags::READY);
        let cause = match result {
            Ok(n) if n == frame_len => IntBits::TXB,
            Ok(n) => {
                tracing::warn!(written = n, frame_len, "short transmit");
                flags.remove(TxBdFlags::LATE_COLLISION);
                IntBits::TXE
            }
            Err(err) => {
                tracing::warn!(%err, frame_len, "transmit failed");
                flags.remove(TxBdFlags::LATE_COLLISION);
                IntBits::TXE
            }
        };

        self.tx.bd.set_tx_flags(flags);
        let bd = self.tx.bd;
        self.bd_ram.store_ctrl(bd_index, &bd);
        self.signal(cause, flags.contains(TxBdFlags::IRQ));

        self.tx.bd_index = next_tx_index(bd_index, flags.contains(TxBdFlags::WRAP));
        self.tx.state = TxState::WaitBd;
    }
}
