//! Raw link-layer socket passthrough (Linux `AF_PACKET`).
#![allow(unsafe_code)]

use std::io;

use crate::{BackendError, PacketBackend, RecvOutcome, RxSource, MIN_RECORD_LEN};

/// Frames exchanged with a host interface through a raw packet socket.
///
/// The socket is opened on the first [`reset`](PacketBackend::reset) and kept for the lifetime of
/// the backend; later resets only discard whatever queued up in the meantime.
#[derive(Debug)]
pub struct RawSocketBackend {
    ifname: String,
    #[cfg(target_os = "linux")]
    sock: Option<linux::LinkSocket>,
}

impl RawSocketBackend {
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            #[cfg(target_os = "linux")]
            sock: None,
        }
    }

    pub fn interface(&self) -> &str {
        &self.ifname
    }
}

#[cfg(target_os = "linux")]
impl PacketBackend for RawSocketBackend {
    fn reset(&mut self) -> Result<(), BackendError> {
        match &self.sock {
            Some(sock) => {
                let dropped = sock.drain();
                if dropped > 0 {
                    tracing::debug!(dropped, ifname = %self.ifname, "discarded queued frames");
                }
            }
            None => {
                let sock = linux::LinkSocket::open(&self.ifname)?;
                tracing::debug!(ifname = %self.ifname, ifindex = sock.ifindex(), "raw socket bound");
                sock.drain();
                self.sock = Some(sock);
            }
        }
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        match &self.sock {
            Some(sock) => sock.send(frame),
            None => Ok(0),
        }
    }

    fn receive(&mut self, _source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        let Some(sock) = &self.sock else {
            return RecvOutcome::Pending;
        };
        match sock.recv(buf) {
            Ok(0) => RecvOutcome::Pending,
            Ok(n) if n < MIN_RECORD_LEN => RecvOutcome::Skipped,
            Ok(n) => RecvOutcome::Frame(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => RecvOutcome::Pending,
            Err(err) => {
                tracing::warn!(%err, ifname = %self.ifname, "raw socket receive failed");
                RecvOutcome::Pending
            }
        }
    }

    fn probe_readable(&mut self) -> bool {
        let Some(sock) = &self.sock else {
            return false;
        };
        if !sock.readable() {
            return false;
        }
        let mut scratch = [0u8; 1];
        let _ = sock.recv(&mut scratch);
        true
    }

    fn filters_destination(&self) -> bool {
        true
    }
}

#[cfg(not(target_os = "linux"))]
impl PacketBackend for RawSocketBackend {
    fn reset(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported)
    }

    fn transmit(&mut self, _frame: &[u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn receive(&mut self, _source: RxSource, _buf: &mut [u8]) -> RecvOutcome {
        RecvOutcome::Pending
    }

    fn filters_destination(&self) -> bool {
        true
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    use crate::BackendError;

    fn eth_p_all() -> u16 {
        (libc::ETH_P_ALL as u16).to_be()
    }

    #[derive(Debug)]
    pub(super) struct LinkSocket {
        fd: OwnedFd,
        ifindex: u32,
    }

    impl LinkSocket {
        pub(super) fn open(ifname: &str) -> Result<Self, BackendError> {
            let name = CString::new(ifname).map_err(|_| BackendError::InvalidInterfaceName {
                name: ifname.to_string(),
            })?;

            let raw = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    i32::from(eth_p_all()),
                )
            };
            if raw < 0 {
                return Err(BackendError::Socket(io::Error::last_os_error()));
            }
            // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };

            let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
            if ifindex == 0 {
                return Err(BackendError::InterfaceIndex {
                    name: ifname.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            // SAFETY: `sockaddr_ll` is plain old data; all-zero is a valid value.
            let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as libc::c_ushort;
            addr.sll_protocol = eth_p_all();
            addr.sll_ifindex = ifindex as libc::c_int;

            let rc = unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(BackendError::Bind {
                    name: ifname.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            Ok(Self { fd, ifindex })
        }

        pub(super) fn ifindex(&self) -> u32 {
            self.ifindex
        }

        pub(super) fn readable(&self) -> bool {
            let mut pollfd = libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let ret = unsafe { libc::poll(&mut pollfd, 1, 0) };
            ret > 0 && (pollfd.revents & libc::POLLIN) != 0
        }

        /// Throw away every frame already queued on the socket.
        pub(super) fn drain(&self) -> usize {
            let mut scratch = [0u8; 1];
            let mut dropped = 0;
            while self.readable() {
                if self.recv(&mut scratch).is_err() {
                    break;
                }
                dropped += 1;
            }
            dropped
        }

        pub(super) fn send(&self, frame: &[u8]) -> io::Result<usize> {
            let ret = unsafe {
                libc::send(
                    self.fd.as_raw_fd(),
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        }

        pub(super) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let ret = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        }
    }
}
