//! Simulator context that owns memory, time, interrupts and the Ethernet MACs.
//!
//! [`Simulator`] wires each configured MAC into the MMIO bus at its base address, gives it a
//! line on the shared interrupt controller and a handle to the tick scheduler, then drives the
//! scheduler one tick at a time. Every due job steps exactly one engine of one device.
#![forbid(unsafe_code)]

mod error;
mod mmio;

use std::cell::RefCell;
use std::rc::Rc;

use ethsim_config::{EthConfig, SimConfig};
use ethsim_ethmac::{Engine, EngineScheduler, EthMac, MacStatus, StepStatus, MMIO_WINDOW_LEN};
use ethsim_interrupts::{ControllerLine, InterruptController, SharedInterruptController};
use ethsim_net_backend::PacketBackend;
use ethsim_time::{SharedTickScheduler, TickScheduler};
use memory::{Bus, MemoryBus};

pub use error::SimError;
pub use mmio::SharedMmio;

/// Shared handle to a MAC owned by the simulator.
pub type SharedMac = Rc<RefCell<EthMac>>;

/// A scheduled engine step of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Job {
    pub device: usize,
    pub engine: Engine,
}

/// Schedules engine steps for one device on the simulator's tick scheduler.
struct DeviceScheduler {
    sched: SharedTickScheduler<Job>,
    device: usize,
}

impl EngineScheduler for DeviceScheduler {
    fn schedule(&self, engine: Engine, delay: u64) {
        let job = Job {
            device: self.device,
            engine,
        };
        self.sched.borrow_mut().schedule(job, delay);
    }

    fn cancel(&self, engine: Engine) {
        let job = Job {
            device: self.device,
            engine,
        };
        self.sched.borrow_mut().cancel(job);
    }
}

/// Why [`Simulator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// `max_ticks` ticks elapsed.
    Completed { ticks: u64 },
    /// Nothing is scheduled, so no further tick can change device state.
    Idle { ticks: u64 },
    /// A device's replay input ran out.
    InputExhausted { device: usize, ticks: u64 },
}

impl RunExit {
    /// Ticks elapsed during the run.
    pub fn ticks(&self) -> u64 {
        match *self {
            RunExit::Completed { ticks }
            | RunExit::Idle { ticks }
            | RunExit::InputExhausted { ticks, .. } => ticks,
        }
    }
}

pub struct Simulator {
    bus: Bus,
    sched: SharedTickScheduler<Job>,
    irqs: SharedInterruptController,
    macs: Vec<SharedMac>,
}

impl Simulator {
    /// An empty simulator with `ram_size` bytes of RAM at physical address 0.
    pub fn new(ram_size: usize) -> Self {
        Self {
            bus: Bus::new(ram_size),
            sched: TickScheduler::shared(),
            irqs: InterruptController::shared(),
            macs: Vec::new(),
        }
    }

    /// Build a simulator with one MAC per enabled `ethernet` section, in file order.
    pub fn from_config(ram_size: usize, config: &SimConfig) -> Result<Self, SimError> {
        let mut sim = Self::new(ram_size);
        for eth in &config.ethernet {
            sim.add_mac(eth.clone())?;
        }
        Ok(sim)
    }

    /// Map and reset a MAC using the backend its configuration selects. Returns its device index.
    pub fn add_mac(&mut self, config: EthConfig) -> Result<usize, SimError> {
        self.attach(config, None)
    }

    pub fn add_mac_with_backend(
        &mut self,
        config: EthConfig,
        backend: Box<dyn PacketBackend>,
    ) -> Result<usize, SimError> {
        self.attach(config, Some(backend))
    }

    fn attach(
        &mut self,
        config: EthConfig,
        backend: Option<Box<dyn PacketBackend>>,
    ) -> Result<usize, SimError> {
        let device = self.macs.len();
        let base = config.base_addr;
        let irq = ControllerLine::new(self.irqs.clone(), config.irq)?;
        let sched = DeviceScheduler {
            sched: self.sched.clone(),
            device,
        };

        let mac = match backend {
            Some(backend) => EthMac::new(config, backend, Box::new(irq), Box::new(sched)),
            None => EthMac::from_config(config, Box::new(irq), Box::new(sched)),
        };
        let mac = Rc::new(RefCell::new(mac));

        self.bus.map_mmio(
            base,
            MMIO_WINDOW_LEN,
            Box::new(SharedMmio::new(mac.clone(), base)),
        )?;
        mac.borrow_mut().reset();
        tracing::debug!(device, base_addr = base, "Ethernet MAC attached");
        self.macs.push(mac);
        Ok(device)
    }

    /// Reset every device.
    pub fn reset(&mut self) {
        for mac in &self.macs {
            mac.borrow_mut().reset();
        }
    }

    pub fn now(&self) -> u64 {
        self.sched.borrow().now()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn interrupts(&self) -> &SharedInterruptController {
        &self.irqs
    }

    pub fn mac(&self, device: usize) -> Option<&SharedMac> {
        self.macs.get(device)
    }

    pub fn macs(&self) -> &[SharedMac] {
        &self.macs
    }

    pub fn read_u32(&mut self, paddr: u64) -> u32 {
        self.bus.read_u32(paddr)
    }

    pub fn write_u32(&mut self, paddr: u64, value: u32) {
        self.bus.write_u32(paddr, value);
    }

    /// Advance one tick and run every job that became due.
    ///
    /// Returns the index of a device whose receive input ran out during this tick.
    pub fn tick(&mut self) -> Option<usize> {
        let jobs = self.sched.borrow_mut().advance();
        let mut exhausted = None;
        for job in jobs {
            let Some(mac) = self.macs.get(job.device) else {
                tracing::warn!(?job, "job for unknown device");
                continue;
            };
            let status = mac.borrow_mut().step(job.engine, &mut self.bus);
            if status == StepStatus::InputExhausted {
                exhausted.get_or_insert(job.device);
            }
        }
        exhausted
    }

    /// Run up to `max_ticks` ticks.
    pub fn run(&mut self, max_ticks: u64) -> RunExit {
        let mut ticks = 0;
        while ticks < max_ticks {
            if self.sched.borrow().is_empty() {
                return RunExit::Idle { ticks };
            }
            ticks += 1;
            if let Some(device) = self.tick() {
                return RunExit::InputExhausted { device, ticks };
            }
        }
        RunExit::Completed { ticks }
    }

    /// Deliver an external instrumentation message to whichever MAC claims `id`.
    pub fn vapi_read(&mut self, id: u32, data: u32) {
        for mac in &self.macs {
            let claims = mac
                .borrow()
                .vapi_ids()
                .is_some_and(|ids| ids.contains(&id));
            if claims {
                mac.borrow_mut().vapi_read(id, data);
            }
        }
    }

    pub fn status(&self) -> Vec<MacStatus> {
        self.macs.iter().map(|mac| mac.borrow().status()).collect()
    }
}
