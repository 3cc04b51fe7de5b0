//! Memory-mapped, read-only block device

use diskzone_core::{security, BlockDevice, Error, Result, MAX_MMAP_SIZE};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// A disk image mapped into memory for inspection
///
/// Reads are served straight from the mapping. Writes always fail with
/// [`Error::ReadOnly`], so discovery over this device never repairs anything.
///
/// # Example
///
/// ```rust,no_run
/// use diskzone_core::BlockDevice;
/// use diskzone_pipeline::MmapDevice;
/// use std::path::Path;
///
/// let disk = MmapDevice::open(Path::new("disk.img"), 512).unwrap();
/// println!("{} sectors", disk.total_sectors());
/// ```
pub struct MmapDevice {
    mmap: Mmap,
    block_size: u32,
    total_sectors: u64,
}

impl MmapDevice {
    /// Open a file with memory mapping
    ///
    /// # Security
    ///
    /// Validates file before mapping:
    /// - Ensures file is a regular file (not device, pipe, etc.)
    /// - Checks file size is within reasonable limits
    /// - Uses read-only mapping to prevent accidental writes
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file, block_size)
    }

    /// Create a memory-mapped device from an existing file
    ///
    /// # Safety
    ///
    /// The file must not be truncated while the mapping is alive; see `open()`.
    pub fn from_file(file: &File, block_size: u32) -> Result<Self> {
        security::validate_sector_size(block_size)?;

        let metadata = file.metadata()?;

        // Validate file is a regular file (not device, pipe, directory, etc.)
        if !metadata.is_file() {
            return Err(Error::invalid_parameter(
                "only regular files can be memory-mapped",
            ));
        }

        if metadata.len() > MAX_MMAP_SIZE {
            return Err(Error::out_of_resources(format!(
                "file size {} exceeds memory mapping limit {}",
                metadata.len(),
                MAX_MMAP_SIZE
            )));
        }

        tracing::debug!("Mapping {} byte image read-only", metadata.len());

        // SAFETY: the file is a regular file of bounded size and the mapping
        // is read-only; concurrent truncation is the caller's responsibility.
        let mmap = unsafe { Mmap::map(file)? };
        let total_sectors = mmap.len() as u64 / block_size as u64;

        Ok(Self {
            mmap,
            block_size,
            total_sectors,
        })
    }
}

impl BlockDevice for MmapDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn read(&mut self, _media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        let limit = self.total_sectors * self.block_size as u64;
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= limit)
            .ok_or_else(|| {
                Error::out_of_range(format!(
                    "access of {} bytes at offset {} exceeds {}-byte image",
                    buf.len(),
                    offset,
                    limit
                ))
            })?;

        buf.copy_from_slice(&self.mmap[offset as usize..end as usize]);
        Ok(())
    }

    fn write(&mut self, _media_id: u32, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(Error::read_only("memory-mapped images are read-only"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_device_read() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mut disk = MmapDevice::open(file.path(), 512).unwrap();
        assert_eq!(disk.total_sectors(), 4);

        let mut buf = [0u8; 16];
        disk.read(0, 512 + 10, &mut buf).unwrap();
        assert_eq!(&buf[..], &data[522..538]);
    }

    #[test]
    fn test_mmap_device_rejects_writes_and_overruns() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 1024]).unwrap();
        file.flush().unwrap();

        let mut disk = MmapDevice::open(file.path(), 512).unwrap();

        assert!(matches!(disk.write_blocks(0, &[1u8; 512]), Err(Error::ReadOnly(_))));

        let mut buf = [0u8; 512];
        assert!(matches!(disk.read_blocks(2, &mut buf), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_mmap_device_nonexistent() {
        let result = MmapDevice::open(Path::new("/nonexistent/file.img"), 512);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
