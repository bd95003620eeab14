#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use ethsim_config::{EthConfig, MacAddress};
use ethsim_ethmac::{Engine, EngineScheduler, EthMac, StepStatus};
use ethsim_net_backend::{BackendError, PacketBackend, RecvOutcome, RxSource};
use memory::MemoryBus;

pub const MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

pub const REG_MODER: u64 = 0x00;
pub const REG_INT_SOURCE: u64 = 0x04;
pub const REG_INT_MASK: u64 = 0x08;
pub const REG_PACKETLEN: u64 = 0x18;
pub const REG_TX_BD_NUM: u64 = 0x20;
pub const REG_MAC_ADDR0: u64 = 0x40;
pub const REG_MAC_ADDR1: u64 = 0x44;
pub const BD_BASE: u64 = 0x400;

pub struct TestDma {
    mem: Vec<u8>,
}

impl TestDma {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0u8; size],
        }
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) {
        let addr = addr as usize;
        self.mem[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_vec(&self, addr: u64, len: usize) -> Vec<u8> {
        let addr = addr as usize;
        self.mem[addr..addr + len].to_vec()
    }
}

impl MemoryBus for TestDma {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let addr = paddr as usize;
        buf.copy_from_slice(&self.mem[addr..addr + buf.len()]);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let addr = paddr as usize;
        self.mem[addr..addr + buf.len()].copy_from_slice(buf);
    }
}

/// Counts outstanding step requests per engine, the way a real scheduler queue would.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    pending: Rc<RefCell<Vec<Engine>>>,
}

impl RecordingScheduler {
    pub fn count(&self, engine: Engine) -> usize {
        self.pending.borrow().iter().filter(|&&e| e == engine).count()
    }

    pub fn take(&self, engine: Engine) -> bool {
        let mut pending = self.pending.borrow_mut();
        match pending.iter().position(|&e| e == engine) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl EngineScheduler for RecordingScheduler {
    fn schedule(&self, engine: Engine, _delay: u64) {
        self.pending.borrow_mut().push(engine);
    }

    fn cancel(&self, engine: Engine) {
        self.pending.borrow_mut().retain(|&e| e != engine);
    }
}

/// In-memory backend that behaves like a live link.
#[derive(Default)]
pub struct MockLink {
    pub inbox: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub announced: Vec<usize>,
    pub resets: usize,
    pub short_writes: bool,
}

#[derive(Clone, Default)]
pub struct SharedLink(pub Rc<RefCell<MockLink>>);

impl PacketBackend for SharedLink {
    fn reset(&mut self) -> Result<(), BackendError> {
        self.0.borrow_mut().resets += 1;
        Ok(())
    }

    fn begin_transmit(&mut self, len: usize) -> io::Result<()> {
        self.0.borrow_mut().announced.push(len);
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut link = self.0.borrow_mut();
        link.sent.push(frame.to_vec());
        Ok(if link.short_writes {
            frame.len() / 2
        } else {
            frame.len()
        })
    }

    fn receive(&mut self, _source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        match self.0.borrow_mut().inbox.pop_front() {
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                RecvOutcome::Frame(frame.len())
            }
            None => RecvOutcome::Pending,
        }
    }

    fn probe_readable(&mut self) -> bool {
        self.0.borrow_mut().inbox.pop_front().is_some()
    }

    fn filters_destination(&self) -> bool {
        true
    }
}

pub struct Harness {
    pub mac: EthMac,
    pub irq: Rc<Cell<bool>>,
    pub sched: RecordingScheduler,
    pub dma: TestDma,
}

impl Harness {
    pub fn new(backend: Box<dyn PacketBackend>) -> Self {
        Self::with_config(
            EthConfig {
                base_addr: 0x9200_0000,
                irq: 4,
                mac: MacAddress(MAC),
                ..EthConfig::default()
            },
            backend,
        )
    }

    pub fn with_config(config: EthConfig, backend: Box<dyn PacketBackend>) -> Self {
        let irq = Rc::new(Cell::new(false));
        let sched = RecordingScheduler::default();
        let mut mac = EthMac::new(config, backend, Box::new(irq.clone()), Box::new(sched.clone()));
        mac.reset();
        Self {
            mac,
            irq,
            sched,
            dma: TestDma::new(0x10000),
        }
    }

    pub fn link() -> (Self, Rc<RefCell<MockLink>>) {
        let link = SharedLink::default();
        let state = link.0.clone();
        (Self::new(Box::new(link)), state)
    }

    /// Run one scheduled step of `engine`; panics if none was requested.
    pub fn tick(&mut self, engine: Engine) -> StepStatus {
        assert!(self.sched.take(engine), "{engine:?} was not scheduled");
        self.mac.step(engine, &mut self.dma)
    }

    pub fn ticks(&mut self, engine: Engine, n: usize) {
        for _ in 0..n {
            assert_eq!(self.tick(engine), StepStatus::Running);
        }
    }

    pub fn set_bd(&mut self, index: usize, ctrl: u32, addr: u32) {
        let offset = BD_BASE + (index as u64) * 4;
        self.mac.write(offset, ctrl);
        self.mac.write(offset + 4, addr);
    }

    pub fn bd_ctrl(&self, index: usize) -> u32 {
        self.mac.read(BD_BASE + (index as u64) * 4)
    }
}

pub fn ethernet_frame(dest: [u8; 6], len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(len);
    frame.extend_from_slice(&dest);
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend((14..len).map(|i| i as u8));
    frame.truncate(len);
    frame
}
