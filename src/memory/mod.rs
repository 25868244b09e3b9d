//! Board address decoding.
//!
//! A `MemoryMap` holds non-overlapping inclusive address ranges, each bound
//! to ROM, RAM, a peripheral register window or a constant. Ranges larger
//! than their backing store mirror it. Addresses outside every range read
//! as 0xFF and swallow writes.

use std::fmt;

/// Value seen on an undriven data bus.
pub const OPEN_BUS: u8 = 0xFF;

/// Board-defined peripheral identifier.
pub type DeviceId = u8;

#[derive(Debug, Clone)]
pub enum Region {
    Rom(Vec<u8>),
    Ram(Vec<u8>),
    Device(DeviceId),
    Constant(u8),
}

#[derive(Debug, Clone)]
struct MappedRange {
    start: u16,
    end: u16,
    region: Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAccess {
    pub id: DeviceId,
    /// Offset from the start of the device's range.
    pub offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRead {
    Data(u8),
    Device(DeviceAccess),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    InvertedRange { start: u16, end: u16 },
    EmptyStore { start: u16 },
    Overlap { start: u16, end: u16, existing_start: u16 },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::InvertedRange { start, end } => {
                write!(f, "range ${:04X}-${:04X} ends before it starts", start, end)
            }
            MapError::EmptyStore { start } => {
                write!(f, "range at ${:04X} has no backing bytes", start)
            }
            MapError::Overlap {
                start,
                end,
                existing_start,
            } => write!(
                f,
                "range ${:04X}-${:04X} overlaps range at ${:04X}",
                start, end, existing_start
            ),
        }
    }
}

impl std::error::Error for MapError {}

#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    ranges: Vec<MappedRange>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Binds `start..=end` to `region`.
    pub fn add(&mut self, start: u16, end: u16, region: Region) -> Result<(), MapError> {
        if end < start {
            return Err(MapError::InvertedRange { start, end });
        }
        if let Region::Rom(data) | Region::Ram(data) = &region {
            if data.is_empty() {
                return Err(MapError::EmptyStore { start });
            }
        }
        let pos = self.ranges.partition_point(|r| r.start < start);
        let clashes_prev = pos > 0 && self.ranges[pos - 1].end >= start;
        let clashes_next = pos < self.ranges.len() && self.ranges[pos].start <= end;
        if clashes_prev || clashes_next {
            let existing_start = if clashes_prev {
                self.ranges[pos - 1].start
            } else {
                self.ranges[pos].start
            };
            return Err(MapError::Overlap {
                start,
                end,
                existing_start,
            });
        }
        self.ranges.insert(pos, MappedRange { start, end, region });
        Ok(())
    }

    fn find(&self, addr: u16) -> Option<usize> {
        let pos = self.ranges.partition_point(|r| r.start <= addr);
        if pos == 0 {
            return None;
        }
        let idx = pos - 1;
        (addr <= self.ranges[idx].end).then_some(idx)
    }

    pub fn read(&self, addr: u16) -> BusRead {
        let Some(idx) = self.find(addr) else {
            return BusRead::Data(OPEN_BUS);
        };
        let range = &self.ranges[idx];
        let offset = addr - range.start;
        match &range.region {
            Region::Rom(data) | Region::Ram(data) => {
                BusRead::Data(data[offset as usize % data.len()])
            }
            Region::Constant(v) => BusRead::Data(*v),
            Region::Device(id) => BusRead::Device(DeviceAccess { id: *id, offset }),
        }
    }

    /// Stores into RAM. Returns the device access when the address belongs to
    /// a peripheral; ROM, constant and unmapped writes are dropped.
    pub fn write(&mut self, addr: u16, value: u8) -> Option<DeviceAccess> {
        let idx = self.find(addr)?;
        let range = &mut self.ranges[idx];
        let offset = addr - range.start;
        match &mut range.region {
            Region::Ram(data) => {
                let len = data.len();
                data[offset as usize % len] = value;
                None
            }
            Region::Device(id) => Some(DeviceAccess { id: *id, offset }),
            Region::Rom(_) | Region::Constant(_) => None,
        }
    }

    /// Backing bytes of the ROM/RAM range starting at `start`.
    pub fn bytes(&self, start: u16) -> Option<&[u8]> {
        let idx = self.find(start)?;
        match &self.ranges[idx].region {
            Region::Rom(data) | Region::Ram(data) if self.ranges[idx].start == start => {
                Some(data.as_slice())
            }
            _ => None,
        }
    }

    /// Replaces the contents of a ROM range (used by loaders before reset).
    /// Shorter images leave the tail untouched; longer ones are truncated.
    pub fn load_rom(&mut self, start: u16, image: &[u8]) -> Result<(), String> {
        let idx = self
            .find(start)
            .filter(|&i| self.ranges[i].start == start)
            .ok_or_else(|| format!("no range starts at ${:04X}", start))?;
        match &mut self.ranges[idx].region {
            Region::Rom(data) => {
                let n = image.len().min(data.len());
                data[..n].copy_from_slice(&image[..n]);
                if image.len() > data.len() {
                    log::warn!(
                        "ROM image for ${:04X} is {} bytes, region holds {}; truncated",
                        start,
                        image.len(),
                        data.len()
                    );
                }
                Ok(())
            }
            _ => Err(format!("range at ${:04X} is not ROM", start)),
        }
    }

    pub fn ram_block_count(&self) -> usize {
        self.ranges
            .iter()
            .filter(|r| matches!(r.region, Region::Ram(_)))
            .count()
    }

    /// RAM contents in address order, for save states.
    pub fn ram_contents(&self) -> Vec<Vec<u8>> {
        self.ranges
            .iter()
            .filter_map(|r| match &r.region {
                Region::Ram(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn restore_ram(&mut self, contents: &[Vec<u8>]) -> Result<(), String> {
        let mut slots: Vec<&mut Vec<u8>> = self
            .ranges
            .iter_mut()
            .filter_map(|r| match &mut r.region {
                Region::Ram(data) => Some(data),
                _ => None,
            })
            .collect();
        if slots.len() != contents.len() {
            return Err(format!(
                "save state has {} RAM blocks, board has {}",
                contents.len(),
                slots.len()
            ));
        }
        for (slot, saved) in slots.iter_mut().zip(contents) {
            if slot.len() != saved.len() {
                return Err(format!(
                    "RAM block size mismatch: {} vs {}",
                    saved.len(),
                    slot.len()
                ));
            }
            slot.copy_from_slice(saved);
        }
        Ok(())
    }

    /// Zeroes every RAM range.
    pub fn clear_ram(&mut self) {
        for r in &mut self.ranges {
            if let Region::Ram(data) = &mut r.region {
                data.fill(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> MemoryMap {
        let mut map = MemoryMap::new();
        map.add(0x0000, 0x0FFF, Region::Rom(vec![0xAA; 0x1000])).unwrap();
        map.add(0x2000, 0x3FFF, Region::Ram(vec![0; 0x400])).unwrap();
        map.add(0x5000, 0x5003, Region::Device(7)).unwrap();
        map.add(0x6000, 0x6000, Region::Constant(0x3C)).unwrap();
        map
    }

    #[test]
    fn test_unmapped_reads_open_bus_and_drops_writes() {
        let mut map = sample_map();
        assert_eq!(map.read(0x1800), BusRead::Data(0xFF));
        assert_eq!(map.write(0x1800, 0x12), None);
        assert_eq!(map.read(0x1800), BusRead::Data(0xFF));
        assert_eq!(map.read(0xFFFF), BusRead::Data(0xFF));
    }

    #[test]
    fn test_rom_ignores_writes() {
        let mut map = sample_map();
        map.write(0x0010, 0x55);
        assert_eq!(map.read(0x0010), BusRead::Data(0xAA));
    }

    #[test]
    fn test_ram_mirrors_inside_its_range() {
        let mut map = sample_map();
        map.write(0x2001, 0x42);
        assert_eq!(map.read(0x2401), BusRead::Data(0x42));
        assert_eq!(map.read(0x3C01), BusRead::Data(0x42));
    }

    #[test]
    fn test_device_accesses_report_offset() {
        let mut map = sample_map();
        assert_eq!(
            map.read(0x5002),
            BusRead::Device(DeviceAccess { id: 7, offset: 2 })
        );
        assert_eq!(
            map.write(0x5003, 1),
            Some(DeviceAccess { id: 7, offset: 3 })
        );
        assert_eq!(map.read(0x6000), BusRead::Data(0x3C));
    }

    #[test]
    fn test_overlapping_ranges_are_rejected() {
        let mut map = sample_map();
        let err = map.add(0x0F00, 0x10FF, Region::Constant(0)).unwrap_err();
        assert_eq!(
            err,
            MapError::Overlap {
                start: 0x0F00,
                end: 0x10FF,
                existing_start: 0x0000
            }
        );
        assert!(map.add(0x1FFF, 0x2000, Region::Constant(0)).is_err());
        assert!(map.add(0x1000, 0x1FFF, Region::Constant(0)).is_ok());
        assert!(matches!(
            map.add(0x9000, 0x8000, Region::Constant(0)),
            Err(MapError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_ram_snapshot_restore() {
        let mut map = sample_map();
        map.write(0x2000, 9);
        let saved = map.ram_contents();
        map.clear_ram();
        assert_eq!(map.read(0x2000), BusRead::Data(0));
        map.restore_ram(&saved).unwrap();
        assert_eq!(map.read(0x2000), BusRead::Data(9));
    }

    #[test]
    fn test_load_rom_copies_image() {
        let mut map = sample_map();
        map.load_rom(0x0000, &[1, 2, 3]).unwrap();
        assert_eq!(map.read(0x0001), BusRead::Data(2));
        assert_eq!(map.read(0x0003), BusRead::Data(0xAA));
        assert!(map.load_rom(0x2000, &[1]).is_err());
    }
}
