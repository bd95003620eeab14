use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{BackendError, PacketBackend, RecvOutcome, RxSource, MIN_RECORD_LEN, RECORD_HEADER_LEN};

/// Append one `(length, payload)` record to `out`.
pub fn write_record(out: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large for a record"))?;
    out.write_all(&len.to_ne_bytes())?;
    out.write_all(frame)
}

/// Read every complete record from a capture file. A trailing partial record is ignored.
pub fn read_records(path: impl AsRef<Path>) -> io::Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path)?;
    let mut records = Vec::new();
    let mut rest = bytes.as_slice();
    while let Some((header, tail)) = rest.split_first_chunk::<RECORD_HEADER_LEN>() {
        let len = u32::from_ne_bytes(*header) as usize;
        if tail.len() < len {
            break;
        }
        records.push(tail[..len].to_vec());
        rest = &tail[len..];
    }
    Ok(records)
}

/// Packet records replayed from one file and captured into another.
///
/// The RX file is read front to back, one record per successful receive. Transmitted frames are
/// appended to the TX file as whole records, prefix and payload together, so a transmit that is
/// announced but never completed leaves nothing behind. In loopback mode the receive side reads those same records back,
/// starting from wherever the TX file ended when the backend was last reset.
#[derive(Debug)]
pub struct FileBackend {
    rx_path: PathBuf,
    tx_path: PathBuf,
    rx: Option<File>,
    tx: Option<File>,
    loopback_offset: u64,
    announced_len: Option<usize>,
}

impl FileBackend {
    /// Files are not touched until [`PacketBackend::reset`].
    pub fn new(rx_path: impl Into<PathBuf>, tx_path: impl Into<PathBuf>) -> Self {
        Self {
            rx_path: rx_path.into(),
            tx_path: tx_path.into(),
            rx: None,
            tx: None,
            loopback_offset: 0,
            announced_len: None,
        }
    }

    pub fn rx_path(&self) -> &Path {
        &self.rx_path
    }

    pub fn tx_path(&self) -> &Path {
        &self.tx_path
    }

    /// Offset in the TX file of the next record loopback will deliver.
    pub fn loopback_offset(&self) -> u64 {
        self.loopback_offset
    }

    fn receive_dedicated(&mut self, buf: &mut [u8]) -> RecvOutcome {
        let Some(rx) = self.rx.as_mut() else {
            return RecvOutcome::Pending;
        };

        let mut header = [0u8; RECORD_HEADER_LEN];
        if rx.read_exact(&mut header).is_err() {
            return RecvOutcome::Exhausted;
        }
        let len = u32::from_ne_bytes(header) as usize;

        if len < MIN_RECORD_LEN || len > buf.len() {
            tracing::debug!(len, path = %self.rx_path.display(), "skipping malformed record");
            if let Err(err) = rx.seek(SeekFrom::Current(len as i64)) {
                tracing::warn!(%err, "failed to skip RX record");
            }
            return RecvOutcome::Skipped;
        }

        match read_fully(rx, &mut buf[..len]) {
            Ok(n) if n == len => RecvOutcome::Frame(len),
            Ok(n) => RecvOutcome::Truncated(n),
            Err(err) => {
                tracing::warn!(%err, path = %self.rx_path.display(), "RX record read failed");
                RecvOutcome::Truncated(0)
            }
        }
    }

    fn receive_loopback(&mut self, buf: &mut [u8]) -> RecvOutcome {
        let Some(tx) = self.tx.as_mut() else {
            return RecvOutcome::Pending;
        };
        match read_loopback(tx, self.loopback_offset, buf) {
            Ok(Some((consumed, outcome))) => {
                self.loopback_offset += consumed;
                outcome
            }
            Ok(None) => RecvOutcome::Pending,
            Err(err) => {
                tracing::warn!(%err, path = %self.tx_path.display(), "loopback read failed");
                RecvOutcome::Pending
            }
        }
    }
}

/// Read the record at `offset` if it is completely written, returning the bytes it occupies.
fn read_loopback(
    tx: &mut File,
    offset: u64,
    buf: &mut [u8],
) -> io::Result<Option<(u64, RecvOutcome)>> {
    let end = tx.metadata()?.len();
    let header_len = RECORD_HEADER_LEN as u64;
    if offset + header_len > end {
        return Ok(None);
    }

    let mut header = [0u8; RECORD_HEADER_LEN];
    tx.seek(SeekFrom::Start(offset))?;
    tx.read_exact(&mut header)?;
    let len = u32::from_ne_bytes(header) as usize;
    let consumed = header_len + len as u64;
    if offset + consumed > end {
        return Ok(None);
    }

    if len < MIN_RECORD_LEN || len > buf.len() {
        tracing::debug!(len, offset, "skipping malformed loopback record");
        return Ok(Some((consumed, RecvOutcome::Skipped)));
    }
    tx.read_exact(&mut buf[..len])?;
    Ok(Some((consumed, RecvOutcome::Frame(len))))
}

fn read_fully(src: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

impl PacketBackend for FileBackend {
    fn reset(&mut self) -> Result<(), BackendError> {
        self.rx = match File::open(&self.rx_path) {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(%err, path = %self.rx_path.display(), "cannot open RX file");
                None
            }
        };

        self.tx = match OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.tx_path)
        {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(%err, path = %self.tx_path.display(), "cannot open TX file");
                None
            }
        };

        self.announced_len = None;
        self.loopback_offset = match &self.tx {
            Some(tx) => tx.metadata().map(|meta| meta.len()).unwrap_or(0),
            None => 0,
        };
        Ok(())
    }

    fn begin_transmit(&mut self, len: usize) -> io::Result<()> {
        if u32::try_from(len).is_err() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
        }
        if let Some(stale) = self.announced_len.replace(len) {
            tracing::debug!(stale, len, "previous transmit abandoned before completion");
        }
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        let announced = self.announced_len.take();
        if announced.is_some_and(|len| len != frame.len()) {
            tracing::warn!(?announced, len = frame.len(), "frame length differs from announcement");
        }
        let Some(tx) = self.tx.as_mut() else {
            return Ok(0);
        };
        write_record(tx, frame)?;
        Ok(frame.len())
    }

    fn receive(&mut self, source: RxSource, buf: &mut [u8]) -> RecvOutcome {
        match source {
            RxSource::Dedicated => self.receive_dedicated(buf),
            RxSource::Loopback => self.receive_loopback(buf),
        }
    }
}
