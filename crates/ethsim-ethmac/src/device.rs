use std::ops::Range;

use ethsim_config::{BackendKind, EthConfig, MacAddress};
use ethsim_interrupts::IrqLine;
use ethsim_net_backend::{FileBackend, PacketBackend, RawSocketBackend};
use memory::{MemoryBus, MmioHandler};

use crate::descriptor::{rx_ring_start, DescriptorRam, MAX_TX_BD_NUM};
use crate::regs::{self, IntBits, Moder, Reg, Registers, BD_RAM_LEN, BD_RAM_OFFSET};
use crate::rx::{RxContext, RxState};
use crate::status::MacStatus;
use crate::tx::{TxContext, TxState};

/// Largest frame the 16-bit descriptor LENGTH field can describe, and the size of each engine's
/// staging buffer.
pub const MAX_PACKET_LEN: usize = 0xFFFF;

/// Destination, source and EtherType.
pub const ETHER_HDR_LEN: usize = 14;

/// Number of instrumentation ids a MAC claims starting at its configured `vapi_id`.
pub const VAPI_ID_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Tx,
    Rx,
}

impl Engine {
    fn enable_bit(self) -> Moder {
        match self {
            Engine::Tx => Moder::TXEN,
            Engine::Rx => Moder::RXEN,
        }
    }
}

/// Hook used by the MAC to request future engine steps from its owner.
pub trait EngineScheduler {
    /// Ask for `engine` to be stepped `delay` ticks from now.
    fn schedule(&self, engine: Engine, delay: u64);

    /// Drop every pending step of `engine`.
    fn cancel(&self, engine: Engine);
}

impl EngineScheduler for () {
    fn schedule(&self, _engine: Engine, _delay: u64) {}

    fn cancel(&self, _engine: Engine) {}
}

impl<T: EngineScheduler + ?Sized> EngineScheduler for Box<T> {
    fn schedule(&self, engine: Engine, delay: u64) {
        (**self).schedule(engine, delay);
    }

    fn cancel(&self, engine: Engine) {
        (**self).cancel(engine);
    }
}

/// Outcome of a single engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    /// The replay input ran dry; the owner should end the run.
    InputExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VapiChannel {
    Data,
    Ctrl,
}

/// Receives external instrumentation traffic addressed to a MAC.
pub trait VapiObserver {
    fn on_vapi(&mut self, _channel: VapiChannel, _data: u32) {}
}

pub struct EthMac {
    config: EthConfig,
    mac: [u8; 6],
    pub(crate) regs: Registers,
    pub(crate) bd_ram: DescriptorRam,
    pub(crate) tx: TxContext,
    pub(crate) rx: RxContext,
    pub(crate) tx_buf: Vec<u8>,
    pub(crate) rx_buf: Vec<u8>,
    pub(crate) backend: Box<dyn PacketBackend>,
    irq: Box<dyn IrqLine>,
    sched: Box<dyn EngineScheduler>,
    vapi: Option<Box<dyn VapiObserver>>,
}

impl std::fmt::Debug for EthMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthMac")
            .field("base_addr", &self.config.base_addr)
            .field("mac", &MacAddress(self.mac))
            .field("regs", &self.regs)
            .field("tx_state", &self.tx.state)
            .field("rx_state", &self.rx.state)
            .finish_non_exhaustive()
    }
}

impl EthMac {
    /// Build a device around an explicit backend. Call [`reset`](Self::reset) before use.
    pub fn new(
        config: EthConfig,
        backend: Box<dyn PacketBackend>,
        irq: Box<dyn IrqLine>,
        sched: Box<dyn EngineScheduler>,
    ) -> Self {
        let regs = Registers::default();
        let rx = RxContext::new(rx_ring_start(regs.tx_bd_num));
        Self {
            mac: config.mac.octets(),
            config,
            regs,
            bd_ram: DescriptorRam::new(),
            tx: TxContext::default(),
            rx,
            tx_buf: vec![0; MAX_PACKET_LEN],
            rx_buf: vec![0; MAX_PACKET_LEN],
            backend,
            irq,
            sched,
            vapi: None,
        }
    }

    /// Build a device with the backend its configuration selects.
    pub fn from_config(
        config: EthConfig,
        irq: Box<dyn IrqLine>,
        sched: Box<dyn EngineScheduler>,
    ) -> Self {
        let backend: Box<dyn PacketBackend> = match config.backend {
            BackendKind::File => Box::new(FileBackend::new(&config.rx_file, &config.tx_file)),
            BackendKind::Socket => Box::new(RawSocketBackend::new(config.sock_if.clone())),
        };
        Self::new(config, backend, irq, sched)
    }

    pub fn config(&self) -> &EthConfig {
        &self.config
    }

    pub fn base_addr(&self) -> u64 {
        self.config.base_addr
    }

    pub fn mac(&self) -> MacAddress {
        MacAddress(self.mac)
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn descriptors(&self) -> &DescriptorRam {
        &self.bd_ram
    }

    pub fn tx_state(&self) -> TxState {
        self.tx.state
    }

    pub fn rx_state(&self) -> RxState {
        self.rx.state
    }

    pub fn tx_bd_index(&self) -> usize {
        self.tx.bd_index
    }

    pub fn rx_bd_index(&self) -> usize {
        self.rx.bd_index
    }

    /// Whether the last receive attempt ended with a short payload.
    pub fn rx_error(&self) -> bool {
        self.rx.error
    }

    pub fn set_vapi_observer(&mut self, observer: Box<dyn VapiObserver>) {
        self.vapi = Some(observer);
    }

    /// Bring the device to its power-on state and (re)open the backend.
    ///
    /// The MAC address is kept; it belongs to the configuration rather than the register file.
    pub fn reset(&mut self) {
        if let Err(err) = self.backend.reset() {
            tracing::error!(
                base_addr = self.config.base_addr,
                %err,
                "network backend unavailable; MAC continues without it"
            );
            self.backend = Box::new(());
        }

        self.regs = Registers::default();
        self.bd_ram.clear();
        self.tx = TxContext::default();
        self.rx = RxContext::new(rx_ring_start(self.regs.tx_bd_num));

        self.sched.cancel(Engine::Tx);
        self.sched.cancel(Engine::Rx);
        self.irq.set_level(false);
    }

    /// Run one step of `engine` and reschedule it while it stays enabled.
    pub fn step(&mut self, engine: Engine, mem: &mut dyn MemoryBus) -> StepStatus {
        let status = match engine {
            Engine::Tx => {
                self.step_tx(mem);
                StepStatus::Running
            }
            Engine::Rx => self.step_rx(mem),
        };

        if self.regs.moder().contains(engine.enable_bit()) {
            self.sched.schedule(engine, 1);
        }
        status
    }

    pub fn read(&self, offset: u64) -> u32 {
        if let Some(reg) = Reg::decode(offset) {
            return match reg {
                Reg::MacAddr0 => regs::mac_addr0(&self.mac),
                Reg::MacAddr1 => regs::mac_addr1(&self.mac),
                other => self.regs.get(other).unwrap_or(0),
            };
        }
        if let Some(word) = bd_word(offset) {
            return self.bd_ram.read_word(word);
        }
        tracing::warn!(
            addr = self.config.base_addr.wrapping_add(offset),
            "read from illegal Ethernet MAC address"
        );
        0
    }

    pub fn write(&mut self, offset: u64, value: u32) {
        if let Some(reg) = Reg::decode(offset) {
            match reg {
                Reg::Moder => self.write_moder(value),
                Reg::IntSource => self.write_int_source(value),
                Reg::TxBdNum => {
                    self.regs.tx_bd_num = (value & 0xFF).min(MAX_TX_BD_NUM);
                    self.rx.bd_index = rx_ring_start(self.regs.tx_bd_num);
                }
                Reg::MacAddr0 => regs::set_mac_addr0(&mut self.mac, value),
                Reg::MacAddr1 => regs::set_mac_addr1(&mut self.mac, value),
                other => {
                    if let Some(slot) = self.regs.slot_mut(other) {
                        *slot = value;
                    }
                }
            }
            return;
        }
        if let Some(word) = bd_word(offset) {
            self.bd_ram.write_word(word, value);
            return;
        }
        tracing::warn!(
            addr = self.config.base_addr.wrapping_add(offset),
            value,
            "write to illegal Ethernet MAC address"
        );
    }

    fn write_moder(&mut self, value: u32) {
        let old = self.regs.moder();
        let new = Moder::from_bits_retain(value);

        for engine in [Engine::Rx, Engine::Tx] {
            let bit = engine.enable_bit();
            if !old.contains(bit) && new.contains(bit) {
                match engine {
                    Engine::Tx => self.tx.state = TxState::Idle,
                    Engine::Rx => self.rx.state = RxState::Idle,
                }
                self.sched.schedule(engine, 1);
            } else if !new.contains(bit) {
                self.sched.cancel(engine);
            }
        }

        self.regs.moder = value;
        if new.contains(Moder::RST) {
            tracing::debug!(base_addr = self.config.base_addr, "software reset");
            self.reset();
        }
    }

    fn write_int_source(&mut self, value: u32) {
        let before = self.regs.int_source;
        self.regs.int_source &= !value;
        if before != 0 && self.regs.int_source == 0 {
            self.irq.set_level(false);
        }
    }

    /// Latch `cause` in INT_SOURCE and raise the line if `requested` and the cause is unmasked.
    pub(crate) fn signal(&mut self, cause: IntBits, requested: bool) {
        self.regs.raise(cause);
        if requested && self.regs.int_mask().intersects(cause) {
            self.irq.set_level(true);
        }
    }

    pub(crate) fn mac_octets(&self) -> &[u8; 6] {
        &self.mac
    }

    /// Ids `[vapi_id, vapi_id + VAPI_ID_COUNT)`, or `None` when instrumentation is off.
    pub fn vapi_ids(&self) -> Option<Range<u32>> {
        let base = self.config.vapi_id;
        (base != 0).then(|| base..base.saturating_add(VAPI_ID_COUNT))
    }

    pub fn vapi_read(&mut self, id: u32, data: u32) {
        let Some(ids) = self.vapi_ids() else {
            return;
        };
        let channel = match id.checked_sub(ids.start) {
            Some(0) => VapiChannel::Data,
            Some(1) => VapiChannel::Ctrl,
            _ => return,
        };
        tracing::trace!(id, data, ?channel, "vapi");
        if let Some(observer) = self.vapi.as_mut() {
            observer.on_vapi(channel, data);
        }
    }

    pub fn status(&self) -> MacStatus {
        MacStatus {
            base_addr: self.config.base_addr,
            mac: MacAddress(self.mac),
            registers: self.regs.clone(),
            tx_state: self.tx.state,
            rx_state: self.rx.state,
            tx_bd_index: self.tx.bd_index,
            rx_bd_index: self.rx.bd_index,
        }
    }
}

fn bd_word(offset: u64) -> Option<usize> {
    let rel = offset.checked_sub(BD_RAM_OFFSET)?;
    (rel < BD_RAM_LEN && rel % 4 == 0).then_some((rel / 4) as usize)
}

impl MmioHandler for EthMac {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        if size != 4 {
            tracing::warn!(offset, size, "unsupported Ethernet MAC access width");
            return 0;
        }
        u64::from(EthMac::read(self, offset))
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        if size != 4 {
            tracing::warn!(offset, size, "unsupported Ethernet MAC access width");
            return;
        }
        EthMac::write(self, offset, value as u32);
    }
}
