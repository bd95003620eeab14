mod common;

use std::fs;

use common::*;
use ethsim_config::{EthConfig, MacAddress};
use ethsim_ethmac::{Engine, EthMac, IntBits, Moder, RxBdFlags, RxState, StepStatus, TxBdFlags};
use ethsim_net_backend::{write_record, FileBackend};
use pretty_assertions::assert_eq;

const BUF: u64 = 0x3000;
const RX_BD: usize = 0x80;

fn empty_bd(extra: RxBdFlags) -> u32 {
    (RxBdFlags::EMPTY | extra).bits()
}

fn file_harness(dir: &tempfile::TempDir, records: &[Vec<u8>]) -> Harness {
    let rx = dir.path().join("eth_rx");
    let tx = dir.path().join("eth_tx");
    let mut file = fs::File::create(&rx).unwrap();
    for record in records {
        write_record(&mut file, record).unwrap();
    }
    drop(file);
    Harness::new(Box::new(FileBackend::new(rx, tx)))
}

#[test]
fn file_record_lands_in_guest_memory() {
    let dir = tempfile::tempdir().unwrap();
    let frame: Vec<u8> = (0..60u8).map(|i| i.wrapping_mul(7)).collect();
    let mut h = file_harness(&dir, &[frame.clone()]);

    h.mac.write(REG_INT_MASK, IntBits::RXB.bits());
    h.set_bd(RX_BD, empty_bd(RxBdFlags::IRQ), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 2);
    assert_eq!(h.mac.rx_state(), RxState::Recv);
    h.ticks(Engine::Rx, 1);
    assert_eq!(h.mac.rx_state(), RxState::WriteFifo);
    h.ticks(Engine::Rx, 15);
    assert_eq!(h.mac.rx_state(), RxState::Idle);

    assert_eq!(h.dma.read_vec(BUF, 60), frame);
    let ctrl = h.bd_ctrl(RX_BD);
    assert_eq!(ctrl >> 16, 60);
    assert_eq!(ctrl & RxBdFlags::EMPTY.bits(), 0);
    assert_eq!(h.mac.read(REG_INT_SOURCE), IntBits::RXB.bits());
    assert!(h.irq.get());
    assert_eq!(h.mac.rx_bd_index(), RX_BD + 2);
}

#[test]
fn partial_last_word_does_not_overrun_the_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let frame = ethernet_frame(MAC, 61);
    let mut h = file_harness(&dir, &[frame.clone()]);
    h.dma.write(BUF + 61, &[0xEE; 3]);

    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());
    h.ticks(Engine::Rx, 3 + 16);

    assert_eq!(h.dma.read_vec(BUF, 61), frame);
    assert_eq!(h.dma.read_vec(BUF + 61, 3), vec![0xEE; 3]);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
}

#[test]
fn header_sized_records_are_skipped_without_consuming_a_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = file_harness(&dir, &[vec![0xAB; 10], ethernet_frame(MAC, 20)]);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3);
    assert_eq!(h.mac.rx_state(), RxState::WaitBd);
    assert_eq!(h.bd_ctrl(RX_BD), empty_bd(RxBdFlags::empty()));
    assert_eq!(h.mac.rx_bd_index(), RX_BD);
    assert_eq!(h.mac.read(REG_INT_SOURCE), 0);

    h.ticks(Engine::Rx, 2 + 5);
    assert_eq!(h.bd_ctrl(RX_BD) >> 16, 20);
}

#[test]
fn records_longer_than_the_length_field_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let frame = ethernet_frame(MAC, 60);
    let mut h = file_harness(&dir, &[vec![0x5A; 0x10000], frame.clone()]);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3);
    assert_eq!(h.mac.rx_state(), RxState::WaitBd);
    assert_eq!(h.bd_ctrl(RX_BD), empty_bd(RxBdFlags::empty()));
    assert_eq!(h.mac.rx_bd_index(), RX_BD);

    h.ticks(Engine::Rx, 2 + 15);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
    assert_eq!(h.bd_ctrl(RX_BD) >> 16, 60);
    assert_eq!(h.dma.read_vec(BUF, 60), frame);
}

#[test]
fn exhausted_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = file_harness(&dir, &[]);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());
    h.ticks(Engine::Rx, 2);
    assert_eq!(h.tick(Engine::Rx), StepStatus::InputExhausted);
}

#[test]
fn truncated_payload_raises_receive_error() {
    let dir = tempfile::tempdir().unwrap();
    let rx = dir.path().join("eth_rx");
    let mut bytes = 60u32.to_ne_bytes().to_vec();
    bytes.extend_from_slice(&[1; 30]);
    fs::write(&rx, bytes).unwrap();
    let mut h = Harness::new(Box::new(FileBackend::new(rx, dir.path().join("eth_tx"))));

    h.mac.write(REG_INT_MASK, IntBits::RXE.bits());
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());
    h.ticks(Engine::Rx, 3);

    assert!(h.mac.rx_error());
    assert_eq!(h.mac.rx_state(), RxState::WaitBd);
    assert_eq!(h.mac.read(REG_INT_SOURCE), IntBits::RXE.bits());
    assert!(h.irq.get());
    assert_eq!(h.bd_ctrl(RX_BD), empty_bd(RxBdFlags::empty()));
}

#[test]
fn length_bounds_mark_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = file_harness(&dir, &[ethernet_frame(MAC, 40), ethernet_frame(MAC, 100)]);
    // MINFL 64, MAXFL 80.
    h.mac.write(REG_PACKETLEN, (64 << 16) | 80);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.set_bd(RX_BD + 2, empty_bd(RxBdFlags::empty()), BUF as u32 + 0x100);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3 + 10);
    let first = RxBdFlags::from_bits_retain(h.bd_ctrl(RX_BD) & 0xFFFF);
    assert_eq!(first, RxBdFlags::TOO_SHORT);

    h.ticks(Engine::Rx, 3 + 25);
    let second = RxBdFlags::from_bits_retain(h.bd_ctrl(RX_BD + 2) & 0xFFFF);
    assert_eq!(second, RxBdFlags::TOO_LONG);
}

#[test]
fn rx_ring_wraps_to_its_own_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = file_harness(&dir, &[ethernet_frame(MAC, 16), ethernet_frame(MAC, 16)]);
    h.mac.write(REG_TX_BD_NUM, 4);
    let start = 8;
    h.set_bd(start, empty_bd(RxBdFlags::WRAP), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3 + 4);
    assert_eq!(h.mac.rx_bd_index(), start);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
}

#[test]
fn tx_bd_num_write_mid_frame_moves_the_rx_ring() {
    let dir = tempfile::tempdir().unwrap();
    let frame: Vec<u8> = (0..60u8).collect();
    let mut h = file_harness(&dir, &[frame.clone()]);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3 + 4);
    assert_eq!(h.mac.rx_state(), RxState::WriteFifo);

    h.mac.write(REG_TX_BD_NUM, 0x10);
    assert_eq!(h.mac.rx_bd_index(), 0x20);

    // The frame in flight completes into the slot at the new ring start.
    h.ticks(Engine::Rx, 11);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
    assert_eq!(h.dma.read_vec(BUF, 60), frame);
    assert_eq!(h.bd_ctrl(0x20), 60 << 16);
    assert_eq!(h.bd_ctrl(RX_BD), empty_bd(RxBdFlags::empty()));
    assert_eq!(h.mac.rx_bd_index(), 0x22);
}

#[test]
fn promiscuous_off_discards_frames_for_other_stations() {
    let (mut h, link) = Harness::link();
    link.borrow_mut()
        .inbox
        .push_back(ethernet_frame([0x02, 0, 0, 0, 0, 0x99], 60));
    h.mac.write(REG_INT_MASK, 0x7F);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::IRQ), BUF as u32);
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 3);
    assert_eq!(h.mac.rx_state(), RxState::Recv);
    assert!(link.borrow().inbox.is_empty());
    assert_eq!(h.bd_ctrl(RX_BD), empty_bd(RxBdFlags::IRQ));
    assert_eq!(h.mac.read(REG_INT_SOURCE), 0);
    assert!(!h.irq.get());

    link.borrow_mut().inbox.push_back(ethernet_frame(MAC, 60));
    h.ticks(Engine::Rx, 1);
    assert_eq!(h.mac.rx_state(), RxState::WriteFifo);
}

#[test]
fn promiscuous_mode_accepts_any_destination() {
    let (mut h, link) = Harness::link();
    let frame = ethernet_frame([0xFF; 6], 32);
    link.borrow_mut().inbox.push_back(frame.clone());
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac.write(REG_MODER, (Moder::RXEN | Moder::PRO).bits());

    h.ticks(Engine::Rx, 3 + 8);
    assert_eq!(h.dma.read_vec(BUF, 32), frame);
}

#[test]
fn frames_arriving_without_a_buffer_set_busy() {
    let (mut h, link) = Harness::link();
    link.borrow_mut().inbox.push_back(ethernet_frame(MAC, 60));
    h.mac.write(REG_INT_MASK, IntBits::BUSY.bits());
    h.mac.write(REG_MODER, Moder::RXEN.bits());

    h.ticks(Engine::Rx, 2);
    assert_eq!(h.mac.rx_state(), RxState::WaitBd);
    assert_eq!(h.mac.read(REG_INT_SOURCE), IntBits::BUSY.bits());
    assert!(h.irq.get());
    assert!(link.borrow().inbox.is_empty());
}

#[test]
fn wait_bd_falls_back_to_idle_when_disabled() {
    let (mut h, _) = Harness::link();
    h.mac.write(REG_MODER, Moder::RXEN.bits());
    h.ticks(Engine::Rx, 1);
    h.mac.write(REG_MODER, 0);
    h.mac.step(Engine::Rx, &mut h.dma);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
}

#[test]
fn loopback_reads_back_transmitted_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = file_harness(&dir, &[]);
    let frame = ethernet_frame(MAC, 24);
    h.dma.write(0x1000, &frame);
    h.set_bd(0, (24 << 16) | TxBdFlags::READY.bits(), 0x1000);
    h.set_bd(RX_BD, empty_bd(RxBdFlags::empty()), BUF as u32);
    h.mac
        .write(REG_MODER, (Moder::TXEN | Moder::RXEN | Moder::LOOPBCK).bits());

    // TX announces the record before its payload exists; RX must wait for it.
    h.ticks(Engine::Tx, 2);
    h.ticks(Engine::Rx, 3);
    assert_eq!(h.mac.rx_state(), RxState::Recv);

    h.ticks(Engine::Tx, 6 + 1);
    h.ticks(Engine::Rx, 1 + 6);
    assert_eq!(h.mac.rx_state(), RxState::Idle);
    assert_eq!(h.dma.read_vec(BUF, 24), frame);
}

#[test]
fn vapi_ids_route_to_observer() {
    use std::cell::RefCell;
    use std::rc::Rc;

    use ethsim_ethmac::{VapiChannel, VapiObserver};

    struct Log(Rc<RefCell<Vec<(VapiChannel, u32)>>>);
    impl VapiObserver for Log {
        fn on_vapi(&mut self, channel: VapiChannel, data: u32) {
            self.0.borrow_mut().push((channel, data));
        }
    }

    let config = EthConfig {
        vapi_id: 0x100,
        mac: MacAddress(MAC),
        ..EthConfig::default()
    };
    let mut mac = EthMac::new(config, Box::new(()), Box::new(()), Box::new(()));
    let log = Rc::new(RefCell::new(Vec::new()));
    mac.set_vapi_observer(Box::new(Log(log.clone())));

    assert_eq!(mac.vapi_ids(), Some(0x100..0x102));
    mac.vapi_read(0x100, 1);
    mac.vapi_read(0x101, 2);
    mac.vapi_read(0x102, 3);
    mac.vapi_read(0xFF, 4);
    assert_eq!(
        *log.borrow(),
        vec![(VapiChannel::Data, 1), (VapiChannel::Ctrl, 2)]
    );
}
