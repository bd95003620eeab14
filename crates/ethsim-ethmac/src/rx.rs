use ethsim_net_backend::{RecvOutcome, RxSource};
use memory::MemoryBus;
use serde::Serialize;

use crate::descriptor::{next_rx_index, BufferDescriptor, RxBdFlags};
use crate::device::{EthMac, StepStatus};
use crate::regs::{IntBits, Moder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum RxState {
    #[default]
    Idle,
    /// Polling the current descriptor for EMPTY.
    WaitBd,
    /// Waiting for the backend to deliver a frame.
    Recv,
    /// Copying the received frame into guest memory, four bytes per step.
    WriteFifo,
}

#[derive(Debug)]
pub(crate) struct RxContext {
    pub state: RxState,
    pub bd_index: usize,
    pub bd: BufferDescriptor,
    pub packet_len: usize,
    pub bytes_written: usize,
    pub error: bool,
    pub source: RxSource,
}

impl RxContext {
    pub fn new(bd_index: usize) -> Self {
        Self {
            state: RxState::Idle,
            bd_index,
            bd: BufferDescriptor::default(),
            packet_len: 0,
            bytes_written: 0,
            error: false,
            source: RxSource::Dedicated,
        }
    }
}

const RX_STATUS_BITS: RxBdFlags = RxBdFlags::MISS
    .union(RxBdFlags::INVALID_SYMBOL)
    .union(RxBdFlags::DRIBBLE)
    .union(RxBdFlags::OVERRUN)
    .union(RxBdFlags::LATE_COLLISION)
    .union(RxBdFlags::TOO_LONG)
    .union(RxBdFlags::TOO_SHORT);

impl EthMac {
    pub(crate) fn step_rx(&mut self, mem: &mut dyn MemoryBus) -> StepStatus {
        match self.rx.state {
            RxState::Idle => self.rx.state = RxState::WaitBd,
            RxState::WaitBd => self.rx_wait_bd(),
            RxState::Recv => return self.rx_recv(),
            RxState::WriteFifo => self.rx_write_fifo(mem),
        }
        StepStatus::Running
    }

    fn rx_wait_bd(&mut self) {
        let mut bd = self.bd_ram.load(self.rx.bd_index);
        let mut flags = bd.rx_flags();
        let moder = self.regs.moder();

        if flags.contains(RxBdFlags::EMPTY) {
            flags.remove(RX_STATUS_BITS);
            bd.set_rx_flags(flags);
            self.rx.bd = bd;
            self.rx.error = false;
            self.rx.source = if moder.contains(Moder::LOOPBCK) {
                RxSource::Loopback
            } else {
                RxSource::Dedicated
            };
            self.rx.state = RxState::Recv;
        } else if !moder.contains(Moder::RXEN) {
            self.rx.state = RxState::Idle;
        } else if self.backend.probe_readable() {
            tracing::debug!(bd_index = self.rx.bd_index, "frame dropped: no free RX buffer");
            self.signal(IntBits::BUSY, true);
        }
    }

    fn rx_recv(&mut self) -> StepStatus {
        match self.backend.receive(self.rx.source, &mut self.rx_buf) {
            RecvOutcome::Frame(len) => {
                if self.backend.filters_destination()
                    && !self.regs.moder().contains(Moder::PRO)
                    && !self.accepts_destination(&self.rx_buf[..len])
                {
                    tracing::trace!(len, "frame not addressed to us");
                    return StepStatus::Running;
                }
                self.rx.packet_len = len;
                self.rx.bytes_written = 0;
                self.rx.state = RxState::WriteFifo;
            }
            RecvOutcome::Pending => {}
            RecvOutcome::Skipped => self.rx.state = RxState::WaitBd,
            RecvOutcome::Truncated(read) => {
                tracing::warn!(read, "received record ended early");
                self.rx.error = true;
                self.signal(IntBits::RXE, true);
                self.rx.state = RxState::WaitBd;
            }
            RecvOutcome::Exhausted => {
                tracing::info!(base_addr = self.base_addr(), "receive input exhausted");
                return StepStatus::InputExhausted;
            }
        }
        StepStatus::Running
    }

    fn accepts_destination(&self, frame: &[u8]) -> bool {
        let Some(dest) = frame.get(..6) else {
            return false;
        };
        if self.regs.moder().contains(Moder::IAM) && dest[0] & 1 != 0 {
            tracing::trace!("group address; HASH0/HASH1 filtering is not modelled");
        }
        dest == self.mac_octets().as_slice()
    }

    fn rx_write_fifo(&mut self, mem: &mut dyn MemoryBus) {
        let written = self.rx.bytes_written;
        if written < self.rx.packet_len {
            let n = (self.rx.packet_len - written).min(4);
            let dst = u64::from(self.rx.bd.addr) + written as u64;
            mem.write_physical(dst, &self.rx_buf[written..written + n]);
            self.rx.bytes_written += n;
        }
        if self.rx.bytes_written >= self.rx.packet_len {
            self.rx_finish();
        }
    }

    fn rx_finish(&mut self) {
        let len = self.rx.packet_len;
        let index = self.rx.bd_index;

        let mut bd = self.rx.bd;
        bd.set_len(len);
        let mut flags = bd.rx_flags();
        flags.remove(RxBdFlags::EMPTY);
        if len < self.regs.min_frame_len().saturating_sub(4) {
            flags.insert(RxBdFlags::TOO_SHORT);
        }
        if len > self.regs.max_frame_len() {
            flags.insert(RxBdFlags::TOO_LONG);
        }
        bd.set_rx_flags(flags);
        self.rx.bd = bd;
        self.bd_ram.store_ctrl(index, &bd);

        self.rx.bd_index = next_rx_index(
            index,
            flags.contains(RxBdFlags::WRAP),
            self.regs.tx_bd_num,
        );
        self.signal(IntBits::RXB, flags.contains(RxBdFlags::IRQ));
        tracing::trace!(len, bd_index = index, "frame received");
        self.rx.state = RxState::Idle;
    }
}
