//! File-backed block device

use diskzone_core::{security, BlockDevice, Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A disk image file accessed through positional reads and writes
///
/// Trailing bytes that do not fill a whole sector are not addressable.
///
/// # Example
///
/// ```rust,no_run
/// use diskzone_core::BlockDevice;
/// use diskzone_pipeline::FileDevice;
/// use std::path::Path;
///
/// let mut disk = FileDevice::open(Path::new("disk.img"), 512, true).unwrap();
/// let mut mbr = [0u8; 512];
/// disk.read_blocks(0, &mut mbr).unwrap();
/// ```
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    block_size: u32,
    total_sectors: u64,
    writable: bool,
}

impl FileDevice {
    /// Open a disk image file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the disk image
    /// * `block_size` - The sector size in bytes (usually 512)
    /// * `writable` - Open for writing (needed to restore a damaged GPT copy)
    pub fn open(path: &Path, block_size: u32, writable: bool) -> Result<Self> {
        security::validate_sector_size(block_size)?;

        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        Self::from_file(file, block_size, writable)
    }

    /// Wrap an already opened file
    pub fn from_file(file: File, block_size: u32, writable: bool) -> Result<Self> {
        security::validate_sector_size(block_size)?;

        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(Error::invalid_parameter(
                "only regular image files can be opened as a device",
            ));
        }

        Ok(Self {
            file,
            block_size,
            total_sectors: metadata.len() / block_size as u64,
            writable,
        })
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        let limit = self.total_sectors * self.block_size as u64;
        match offset.checked_add(len as u64) {
            Some(end) if end <= limit => Ok(()),
            _ => Err(Error::out_of_range(format!(
                "access of {} bytes at offset {} exceeds {}-byte image",
                len, offset, limit
            ))),
        }
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn read(&mut self, _media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, _media_id: u32, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::read_only("image was opened read-only"));
        }
        self.check_range(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }
}
