use core::fmt;

/// Abstraction for simulated physical memory access.
///
/// Device DMA engines read packet payloads and write received frames through this trait. Reads
/// take `&mut self` because a physical address may be backed by MMIO with side effects.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u8(&mut self, paddr: u64) -> u8 {
        let mut buf = [0u8; 1];
        self.read_physical(paddr, &mut buf);
        buf[0]
    }

    fn read_u16(&mut self, paddr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn read_u64(&mut self, paddr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_physical(paddr, &mut buf);
        u64::from_le_bytes(buf)
    }

    fn write_u8(&mut self, paddr: u64, val: u8) {
        self.write_physical(paddr, &[val]);
    }

    fn write_u16(&mut self, paddr: u64, val: u16) {
        self.write_physical(paddr, &val.to_le_bytes());
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for &mut T {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        (**self).read_physical(paddr, buf);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        (**self).write_physical(paddr, buf);
    }
}

/// A device register window mapped into the physical address space.
///
/// `offset` is relative to the start of the mapped window. `size` is the access width in bytes
/// (1, 2, 4 or 8); values are little-endian in the low `size` bytes of the `u64`.
pub trait MmioHandler {
    fn read(&mut self, offset: u64, size: usize) -> u64;
    fn write(&mut self, offset: u64, size: usize, value: u64);
}

/// Error returned when a new MMIO window cannot be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The window has zero length or its end overflows `u64`.
    InvalidRange { base: u64, len: u64 },
    /// The window overlaps an already mapped window.
    Overlap {
        base: u64,
        len: u64,
        existing_base: u64,
        existing_len: u64,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::InvalidRange { base, len } => {
                write!(f, "invalid MMIO window: base=0x{base:x} len=0x{len:x}")
            }
            MapError::Overlap {
                base,
                len,
                existing_base,
                existing_len,
            } => write!(
                f,
                "MMIO window 0x{base:x}+0x{len:x} overlaps 0x{existing_base:x}+0x{existing_len:x}"
            ),
        }
    }
}

impl std::error::Error for MapError {}

struct MmioRegion {
    base: u64,
    len: u64,
    handler: Box<dyn MmioHandler>,
}

impl MmioRegion {
    fn contains(&self, paddr: u64, len: u64) -> bool {
        paddr >= self.base
            && paddr
                .checked_add(len)
                .is_some_and(|end| end <= self.base + self.len)
    }
}

/// Flat RAM starting at physical address 0, with MMIO windows taking precedence over RAM.
///
/// Unmapped reads return all ones; unmapped writes are dropped.
pub struct Bus {
    ram: Vec<u8>,
    mmio: Vec<MmioRegion>,
}

impl Bus {
    pub fn new(ram_size: usize) -> Self {
        Self {
            ram: vec![0u8; ram_size],
            mmio: Vec::new(),
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn map_mmio(
        &mut self,
        base: u64,
        len: u64,
        handler: Box<dyn MmioHandler>,
    ) -> Result<(), MapError> {
        let Some(end) = base.checked_add(len).filter(|_| len != 0) else {
            return Err(MapError::InvalidRange { base, len });
        };
        if let Some(existing) = self
            .mmio
            .iter()
            .find(|r| base < r.base + r.len && r.base < end)
        {
            return Err(MapError::Overlap {
                base,
                len,
                existing_base: existing.base,
                existing_len: existing.len,
            });
        }
        self.mmio.push(MmioRegion { base, len, handler });
        Ok(())
    }

    fn region_for(&mut self, paddr: u64, len: u64) -> Option<&mut MmioRegion> {
        self.mmio.iter_mut().find(|r| r.contains(paddr, len))
    }

    fn read_byte(&mut self, paddr: u64) -> u8 {
        if let Some(region) = self.region_for(paddr, 1) {
            let offset = paddr - region.base;
            return region.handler.read(offset, 1) as u8;
        }
        usize::try_from(paddr)
            .ok()
            .and_then(|addr| self.ram.get(addr).copied())
            .unwrap_or(0xFF)
    }

    fn write_byte(&mut self, paddr: u64, val: u8) {
        if let Some(region) = self.region_for(paddr, 1) {
            let offset = paddr - region.base;
            region.handler.write(offset, 1, u64::from(val));
            return;
        }
        if let Some(slot) = usize::try_from(paddr)
            .ok()
            .and_then(|addr| self.ram.get_mut(addr))
        {
            *slot = val;
        }
    }
}

fn is_access_width(len: usize) -> bool {
    matches!(len, 1 | 2 | 4 | 8)
}

impl MemoryBus for Bus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let len = buf.len();
        if is_access_width(len) {
            if let Some(region) = self.region_for(paddr, len as u64) {
                let offset = paddr - region.base;
                let value = region.handler.read(offset, len);
                buf.copy_from_slice(&value.to_le_bytes()[..len]);
                return;
            }
        }

        // Fast path: the whole range is plain RAM.
        if let Some(range) = usize::try_from(paddr)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
        {
            let overlaps_mmio = self
                .mmio
                .iter()
                .any(|r| paddr < r.base + r.len && r.base < paddr + len as u64);
            if !overlaps_mmio {
                if let Some(src) = self.ram.get(range) {
                    buf.copy_from_slice(src);
                    return;
                }
            }
        }

        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_byte(paddr.wrapping_add(i as u64));
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let len = buf.len();
        if is_access_width(len) {
            if let Some(region) = self.region_for(paddr, len as u64) {
                let offset = paddr - region.base;
                let mut bytes = [0u8; 8];
                bytes[..len].copy_from_slice(buf);
                region.handler.write(offset, len, u64::from_le_bytes(bytes));
                return;
            }
        }

        for (i, &val) in buf.iter().enumerate() {
            self.write_byte(paddr.wrapping_add(i as u64), val);
        }
    }
}
