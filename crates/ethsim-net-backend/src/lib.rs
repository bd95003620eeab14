//! Packet transports behind the simulated Ethernet MAC.
//!
//! A MAC never touches files or sockets directly. It drives a [`PacketBackend`], which either
//! replays/captures length-prefixed packet records ([`FileBackend`]) or passes frames through a
//! raw link-layer socket on the host ([`RawSocketBackend`]).
//!
//! Every call is non-blocking: "nothing available yet" is reported as [`RecvOutcome::Pending`] and
//! the caller simply retries on a later tick.
#![deny(unsafe_code)]

mod error;
mod file;
mod socket;

use std::io;

pub use error::BackendError;
pub use file::{read_records, write_record, FileBackend};
pub use socket::RawSocketBackend;

/// Size of the native-endian length prefix in front of every file record.
pub const RECORD_HEADER_LEN: usize = 4;

/// Records shorter than an Ethernet header are skipped instead of delivered.
pub const MIN_RECORD_LEN: usize = 14;

/// Where the receive engine wants its next frame from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxSource {
    /// The backend's regular input (RX file or socket).
    Dedicated,
    /// The backend's own transmit output, for MAC loopback mode.
    Loopback,
}

/// Result of one [`PacketBackend::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A complete frame of this many bytes is at the start of the buffer.
    Frame(usize),
    /// Nothing to deliver right now.
    Pending,
    /// A malformed record was consumed and dropped.
    Skipped,
    /// The record's payload ended early; only this many bytes were read.
    Truncated(usize),
    /// The input has no further records and never will.
    Exhausted,
}

/// Host side of a simulated MAC.
pub trait PacketBackend {
    /// (Re)open the underlying transport. Called on every device reset.
    fn reset(&mut self) -> Result<(), BackendError>;

    /// Announce the length of the frame that the next [`transmit`](Self::transmit) will carry.
    ///
    /// An announcement may be abandoned by an engine restart or reset, so nothing visible to a
    /// receiver should happen until the frame is transmitted.
    fn begin_transmit(&mut self, _len: usize) -> io::Result<()> {
        Ok(())
    }

    /// Send one frame, returning how many bytes were accepted.
    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Fetch at most one frame into `buf`.
    fn receive(&mut self, source: RxSource, buf: &mut [u8]) -> RecvOutcome;

    /// Whether a frame is waiting even though the MAC has no buffer for it.
    ///
    /// Backends that answer `true` have dropped that frame.
    fn probe_readable(&mut self) -> bool {
        false
    }

    /// Whether received frames come from a shared medium and must be address filtered.
    fn filters_destination(&self) -> bool {
        false
    }
}

impl<T: PacketBackend + ?Sized> PacketBackend for Box<T> {
    fn reset(&mut self) -> Result<(), BackendError> {
        <T as PacketBackend>::reset(&mut **self)
    }

    fn begin_transmit(&mut self, len: usize) -> io::Result<()> {
        <T as PacketBackend>::begin_transmit(&mut **self, len)
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        <T as PacketBackend>::transmit(&mut **self, frame)
    }

    fn receive(&mut self, source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        <T as PacketBackend>::receive(&mut **self, source, buf)
    }

    fn probe_readable(&mut self) -> bool {
        <T as PacketBackend>::probe_readable(&mut **self)
    }

    fn filters_destination(&self) -> bool {
        <T as PacketBackend>::filters_destination(&**self)
    }
}

impl<T: PacketBackend + ?Sized> PacketBackend for &mut T {
    fn reset(&mut self) -> Result<(), BackendError> {
        <T as PacketBackend>::reset(&mut **self)
    }

    fn begin_transmit(&mut self, len: usize) -> io::Result<()> {
        <T as PacketBackend>::begin_transmit(&mut **self, len)
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        <T as PacketBackend>::transmit(&mut **self, frame)
    }

    fn receive(&mut self, source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        <T as PacketBackend>::receive(&mut **self, source, buf)
    }

    fn probe_readable(&mut self) -> bool {
        <T as PacketBackend>::probe_readable(&mut **self)
    }

    fn filters_destination(&self) -> bool {
        <T as PacketBackend>::filters_destination(&**self)
    }
}

/// Inert backend: frames sent to it vanish and nothing is ever received.
impl PacketBackend for () {
    fn reset(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        Ok(frame.len())
    }

    fn receive(&mut self, _source: RxSource, _buf: &mut [u8]) -> RecvOutcome {
        RecvOutcome::Pending
    }
}

impl<B: PacketBackend> PacketBackend for Option<B> {
    fn reset(&mut self) -> Result<(), BackendError> {
        match self.as_mut() {
            Some(backend) => backend.reset(),
            None => Ok(()),
        }
    }

    fn begin_transmit(&mut self, len: usize) -> io::Result<()> {
        match self.as_mut() {
            Some(backend) => backend.begin_transmit(len),
            None => Ok(()),
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        match self.as_mut() {
            Some(backend) => backend.transmit(frame),
            None => ().transmit(frame),
        }
    }

    fn receive(&mut self, source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        self.as_mut()
            .map_or(RecvOutcome::Pending, |backend| backend.receive(source, buf))
    }

    fn probe_readable(&mut self) -> bool {
        self.as_mut().is_some_and(|backend| backend.probe_readable())
    }

    fn filters_destination(&self) -> bool {
        self.as_ref().is_some_and(|backend| backend.filters_destination())
    }
}
