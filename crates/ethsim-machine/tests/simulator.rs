use std::cell::RefCell;
use std::fs::File;
use std::rc::Rc;

use ethsim_config::{BackendKind, EthConfig, MacAddress, SimConfig};
use ethsim_ethmac::{IntBits, Moder, RxBdFlags, RxState, TxBdFlags, VapiChannel, VapiObserver};
use ethsim_machine::{RunExit, SimError, Simulator};
use ethsim_net_backend::{read_records, write_record};
use memory::MapError;
use pretty_assertions::assert_eq;

const BASE: u64 = 0x9200_0000;
const MODER: u64 = BASE;
const INT_SOURCE: u64 = BASE + 0x04;
const INT_MASK: u64 = BASE + 0x08;
const MAC_ADDR0: u64 = BASE + 0x40;
const MAC_ADDR1: u64 = BASE + 0x44;
const BD: u64 = BASE + 0x400;
const RX_BD: u64 = BD + 0x80 * 4;

fn config(dir: &tempfile::TempDir) -> EthConfig {
    EthConfig {
        base_addr: BASE,
        irq: 4,
        backend: BackendKind::File,
        rx_file: dir.path().join("rx"),
        tx_file: dir.path().join("tx"),
        mac: MacAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]),
        ..EthConfig::default()
    }
}

#[test]
fn bus_accesses_reach_the_mac_registers() {
    let mut sim = Simulator::new(0x1000);
    let config = EthConfig {
        base_addr: BASE,
        ..EthConfig::default()
    };
    assert_eq!(sim.add_mac_with_backend(config, Box::new(())).unwrap(), 0);

    sim.write_u32(INT_MASK, 0x7F);
    assert_eq!(sim.read_u32(INT_MASK), 0x7F);
    assert_eq!(sim.mac(0).unwrap().borrow().registers().int_mask, 0x7F);

    sim.write_u32(MAC_ADDR0, 0x0304_0506);
    sim.write_u32(MAC_ADDR1, 0x0102);
    assert_eq!(sim.status()[0].mac, MacAddress([1, 2, 3, 4, 5, 6]));

    // Past the register window is unmapped.
    assert_eq!(sim.read_u32(BASE + 0x800), 0xFFFF_FFFF);
}

#[test]
fn transmitted_frame_lands_in_the_tx_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = Simulator::new(0x10000);
    sim.add_mac(config(&dir)).unwrap();

    let payload: Vec<u8> = (0..60u8).collect();
    sim.bus_mut().ram_mut()[0x1000..0x1000 + 60].copy_from_slice(&payload);
    sim.write_u32(INT_MASK, IntBits::TXB.bits());
    sim.write_u32(BD, (60 << 16) | (TxBdFlags::READY | TxBdFlags::IRQ).bits());
    sim.write_u32(BD + 4, 0x1000);
    sim.write_u32(MODER, Moder::TXEN.bits());

    // The TX engine keeps polling while enabled, so the run uses up its budget.
    assert_eq!(sim.run(40), RunExit::Completed { ticks: 40 });
    assert_eq!(sim.now(), 40);

    assert_eq!(read_records(dir.path().join("tx")).unwrap(), vec![payload]);
    assert_eq!(sim.read_u32(BD) & TxBdFlags::READY.bits(), 0);
    assert_eq!(sim.read_u32(INT_SOURCE), IntBits::TXB.bits());
    assert!(sim.interrupts().borrow().is_asserted(4));

    sim.write_u32(INT_SOURCE, IntBits::TXB.bits());
    assert!(!sim.interrupts().borrow().is_asserted(4));
}

#[test]
fn run_stops_when_the_rx_file_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let frame: Vec<u8> = (0..60u8).map(|b| b ^ 0x5A).collect();
    let mut rx = File::create(dir.path().join("rx")).unwrap();
    write_record(&mut rx, &frame).unwrap();
    drop(rx);

    let mut sim = Simulator::new(0x10000);
    sim.add_mac(config(&dir)).unwrap();
    sim.write_u32(INT_MASK, IntBits::RXB.bits());
    let empty = (RxBdFlags::EMPTY | RxBdFlags::IRQ).bits();
    sim.write_u32(RX_BD, empty);
    sim.write_u32(RX_BD + 4, 0x2000);
    sim.write_u32(RX_BD + 8, empty);
    sim.write_u32(RX_BD + 12, 0x3000);
    sim.write_u32(MODER, Moder::RXEN.bits());

    let exit = sim.run(1_000);
    assert!(
        matches!(exit, RunExit::InputExhausted { device: 0, .. }),
        "{exit:?}"
    );
    assert!(exit.ticks() < 1_000);

    assert_eq!(&sim.bus().ram()[0x2000..0x2000 + 60], frame.as_slice());
    assert_eq!(sim.read_u32(RX_BD), (60 << 16) | RxBdFlags::IRQ.bits());
    assert_eq!(sim.read_u32(INT_SOURCE), IntBits::RXB.bits());
    assert!(sim.interrupts().borrow().is_asserted(4));

    let mac = sim.mac(0).unwrap().borrow();
    assert_eq!(mac.rx_state(), RxState::Recv);
    assert_eq!(mac.rx_bd_index(), 0x82);
}

#[test]
fn run_reports_idle_when_nothing_is_scheduled() {
    let mut sim = Simulator::new(0x1000);
    assert_eq!(sim.run(10), RunExit::Idle { ticks: 0 });

    sim.add_mac_with_backend(
        EthConfig {
            base_addr: BASE,
            ..EthConfig::default()
        },
        Box::new(()),
    )
    .unwrap();
    sim.write_u32(MODER, Moder::TXEN.bits());
    sim.write_u32(MODER, 0);
    assert_eq!(sim.run(10), RunExit::Idle { ticks: 0 });
}

#[test]
fn overlapping_windows_are_rejected() {
    let mut sim = Simulator::new(0x1000);
    let config = EthConfig {
        base_addr: BASE,
        ..EthConfig::default()
    };
    sim.add_mac_with_backend(config.clone(), Box::new(())).unwrap();

    let overlapping = EthConfig {
        base_addr: BASE + 0x400,
        ..config
    };
    let err = sim
        .add_mac_with_backend(overlapping, Box::new(()))
        .unwrap_err();
    assert!(
        matches!(
            err,
            SimError::Map(MapError::Overlap {
                existing_base: BASE,
                ..
            })
        ),
        "{err}"
    );
    assert_eq!(sim.macs().len(), 1);
}

#[test]
fn out_of_range_interrupt_line_is_rejected() {
    let mut sim = Simulator::new(0x1000);
    let config = EthConfig {
        base_addr: BASE,
        irq: 64,
        ..EthConfig::default()
    };
    let err = sim.add_mac_with_backend(config, Box::new(())).unwrap_err();
    assert!(matches!(err, SimError::Irq(_)), "{err}");
}

#[test]
fn config_file_builds_one_mac_per_enabled_section() {
    let dir = tempfile::tempdir().unwrap();
    let text = format!(
        "\
section ethernet
  baseaddr = 0x92000000
  irq = 4
  rxfile = \"{rx0}\"
  txfile = \"{tx0}\"
  vapi_id = 0x10
end
section ethernet
  enabled = 0
  baseaddr = 0x93000000
end
section ethernet
  baseaddr = 0x94000000
  irq = 5
  rxfile = \"{rx1}\"
  txfile = \"{tx1}\"
end
",
        rx0 = dir.path().join("rx0").display(),
        tx0 = dir.path().join("tx0").display(),
        rx1 = dir.path().join("rx1").display(),
        tx1 = dir.path().join("tx1").display(),
    );
    let config = SimConfig::parse(&text).unwrap();
    let mut sim = Simulator::from_config(0x1000, &config).unwrap();

    let bases: Vec<u64> = sim.status().iter().map(|s| s.base_addr).collect();
    assert_eq!(bases, vec![0x9200_0000, 0x9400_0000]);
    assert_eq!(sim.read_u32(0x9400_0000), 0x0000_A000);
    assert_eq!(sim.read_u32(0x9300_0000), 0xFFFF_FFFF);

    assert!(dir.path().join("tx0").exists());
    assert!(dir.path().join("tx1").exists());

    let seen = Rc::new(RefCell::new(Vec::new()));
    sim.mac(0)
        .unwrap()
        .borrow_mut()
        .set_vapi_observer(Box::new(Recorder(seen.clone())));
    sim.vapi_read(0x10, 0xAB);
    sim.vapi_read(0x11, 0xCD);
    sim.vapi_read(0x12, 0xEF);
    assert_eq!(
        *seen.borrow(),
        vec![(VapiChannel::Data, 0xAB), (VapiChannel::Ctrl, 0xCD)]
    );
}

struct Recorder(Rc<RefCell<Vec<(VapiChannel, u32)>>>);

impl VapiObserver for Recorder {
    fn on_vapi(&mut self, channel: VapiChannel, data: u32) {
        self.0.borrow_mut().push((channel, data));
    }
}
