//! In-memory block device

use diskzone_core::{security, BlockDevice, Error, Result};

/// A disk held entirely in memory
///
/// Every access is checked against the media id and the size of the buffer.
/// Read and write calls are counted so callers can observe exactly how much
/// I/O an operation performed.
///
/// # Example
///
/// ```rust
/// use diskzone_core::BlockDevice;
/// use diskzone_pipeline::MemoryDevice;
///
/// let mut disk = MemoryDevice::new(2048, 512).unwrap();
/// disk.write_blocks(1, &[0xAA; 512]).unwrap();
///
/// let mut sector = [0u8; 512];
/// disk.read_blocks(1, &mut sector).unwrap();
/// assert_eq!(sector[0], 0xAA);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    block_size: u32,
    media_id: u32,
    read_only: bool,
    reads: usize,
    writes: usize,
}

impl MemoryDevice {
    /// Manufacture a zero-filled disk of `total_sectors` sectors
    pub fn new(total_sectors: u64, block_size: u32) -> Result<Self> {
        security::validate_sector_size(block_size)?;
        let len = security::checked_multiply_u64(total_sectors, block_size as u64, "disk size")?;
        let len = security::u64_to_usize(len, "disk size")?;
        let data = security::alloc_scratch(len, "memory device")?;

        Ok(Self::from_parts(data, block_size))
    }

    /// Wrap an existing disk image
    ///
    /// The image length must be a whole number of sectors.
    pub fn from_bytes(data: Vec<u8>, block_size: u32) -> Result<Self> {
        security::validate_sector_size(block_size)?;
        if data.len() % block_size as usize != 0 {
            return Err(Error::invalid_parameter(format!(
                "image length {} is not a multiple of the {}-byte sector size",
                data.len(),
                block_size
            )));
        }

        Ok(Self::from_parts(data, block_size))
    }

    fn from_parts(data: Vec<u8>, block_size: u32) -> Self {
        Self {
            data,
            block_size,
            media_id: 0,
            read_only: false,
            reads: 0,
            writes: 0,
        }
    }

    /// Set the media id reported by this device
    pub fn with_media_id(mut self, media_id: u32) -> Self {
        self.media_id = media_id;
        self
    }

    /// Make every subsequent write fail
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// The raw disk contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw disk contents, bypassing the counters
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the device and return its contents
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// The bytes of one sector
    pub fn sector(&self, lba: u64) -> Option<&[u8]> {
        let size = self.block_size as usize;
        let start = usize::try_from(lba).ok()?.checked_mul(size)?;
        self.data.get(start..start.checked_add(size)?)
    }

    /// Number of read calls served so far
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of write calls served so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Reset the read and write counters
    pub fn reset_counters(&mut self) {
        self.reads = 0;
        self.writes = 0;
    }

    fn check_access(&self, media_id: u32, offset: u64, len: usize) -> Result<usize> {
        if media_id != self.media_id {
            return Err(Error::MediaChanged {
                expected: media_id,
                actual: self.media_id,
            });
        }

        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.data.len() as u64)
            .ok_or_else(|| {
                Error::out_of_range(format!(
                    "access of {} bytes at offset {} exceeds {}-byte device",
                    len,
                    offset,
                    self.data.len()
                ))
            })?;

        Ok(end as usize)
    }
}

impl BlockDevice for MemoryDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn total_sectors(&self) -> u64 {
        (self.data.len() / self.block_size as usize) as u64
    }

    fn media_id(&self) -> u32 {
        self.media_id
    }

    fn read(&mut self, media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = self.check_access(media_id, offset, buf.len())?;
        self.reads += 1;
        buf.copy_from_slice(&self.data[offset as usize..end]);
        Ok(())
    }

    fn write(&mut self, media_id: u32, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only("memory device is write-protected"));
        }
        let end = self.check_access(media_id, offset, buf.len())?;
        self.writes += 1;
        self.data[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_geometry() {
        let disk = MemoryDevice::new(100, 512).unwrap();
        assert_eq!(disk.block_size(), 512);
        assert_eq!(disk.total_sectors(), 100);
        assert_eq!(disk.last_lba(), Some(99));
        assert_eq!(disk.as_bytes().len(), 51_200);
    }

    #[test]
    fn test_memory_device_rejects_bad_geometry() {
        assert!(matches!(
            MemoryDevice::new(100, 500),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            MemoryDevice::from_bytes(vec![0u8; 700], 512),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_memory_device_read_write() {
        let mut disk = MemoryDevice::new(8, 512).unwrap();
        disk.write_blocks(3, &[0x5A; 1024]).unwrap();

        let mut buf = [0u8; 1024];
        disk.read_blocks(3, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0x5A));
        assert_eq!(disk.sector(4).unwrap()[511], 0x5A);
        assert_eq!(disk.sector(5).unwrap()[0], 0);
        assert!(disk.sector(8).is_none());

        assert_eq!(disk.reads(), 1);
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn test_memory_device_bounds() {
        let mut disk = MemoryDevice::new(8, 512).unwrap();
        let mut buf = [0u8; 1024];

        assert!(matches!(disk.read_blocks(7, &mut buf), Err(Error::OutOfRange(_))));
        assert!(matches!(disk.read(0, u64::MAX, &mut buf), Err(Error::OutOfRange(_))));
        assert_eq!(disk.reads(), 0);
    }

    #[test]
    fn test_memory_device_media_id() {
        let mut disk = MemoryDevice::new(8, 512).unwrap().with_media_id(7);
        let mut buf = [0u8; 512];

        assert!(disk.read_blocks(0, &mut buf).is_ok());
        assert!(matches!(
            disk.read(3, 0, &mut buf),
            Err(Error::MediaChanged { expected: 3, actual: 7 })
        ));
    }

    #[test]
    fn test_memory_device_read_only() {
        let mut disk = MemoryDevice::new(8, 512).unwrap();
        disk.set_read_only(true);

        assert!(matches!(disk.write_blocks(0, &[1u8; 512]), Err(Error::ReadOnly(_))));
        assert_eq!(disk.writes(), 0);
        assert!(disk.as_bytes().iter().all(|&b| b == 0));
    }
}
