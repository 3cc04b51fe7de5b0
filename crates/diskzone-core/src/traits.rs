//! Core traits for partition discovery

use crate::{error::Result, security, types::PartitionInfo, Error};

/// A sector-addressed storage device supplied by the caller
///
/// Offsets passed to [`read`](Self::read) and [`write`](Self::write) are
/// byte offsets (`lba * block_size`), not sector indices. The discovery
/// engine never touches hardware itself; everything goes through this trait.
pub trait BlockDevice {
    /// Size of one sector in bytes
    fn block_size(&self) -> u32;

    /// Number of addressable sectors
    fn total_sectors(&self) -> u64;

    /// Identifier of the media currently present
    fn media_id(&self) -> u32 {
        0
    }

    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` starting at `offset`
    fn write(&mut self, media_id: u32, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush any cached writes to the medium
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// LBA of the last sector on the device
    fn last_lba(&self) -> Option<u64> {
        self.total_sectors().checked_sub(1)
    }

    /// Read starting at sector `lba` of the current media
    fn read_blocks(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        let offset = security::checked_multiply_u64(lba, self.block_size() as u64, "read offset")?;
        let media_id = self.media_id();
        self.read(media_id, offset, buf)
    }

    /// Write starting at sector `lba` of the current media
    fn write_blocks(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        let offset = security::checked_multiply_u64(lba, self.block_size() as u64, "write offset")?;
        let media_id = self.media_id();
        self.write(media_id, offset, buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn block_size(&self) -> u32 {
        (**self).block_size()
    }

    fn total_sectors(&self) -> u64 {
        (**self).total_sectors()
    }

    fn media_id(&self) -> u32 {
        (**self).media_id()
    }

    fn read(&mut self, media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(media_id, offset, buf)
    }

    fn write(&mut self, media_id: u32, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write(media_id, offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn block_size(&self) -> u32 {
        (**self).block_size()
    }

    fn total_sectors(&self) -> u64 {
        (**self).total_sectors()
    }

    fn media_id(&self) -> u32 {
        (**self).media_id()
    }

    fn read(&mut self, media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(media_id, offset, buf)
    }

    fn write(&mut self, media_id: u32, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write(media_id, offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Trait for partition tables (zone tables)
pub trait ZoneTable {
    /// Get a human-readable identifier for this zone table type
    fn identify(&self) -> &str;

    /// Get all partitions in this table, in discovery order
    fn enumerate_zones(&self) -> &[PartitionInfo];

    /// Get a specific partition by its 1-based partition number
    fn get_zone(&self, partition_number: u32) -> Option<&PartitionInfo> {
        self.enumerate_zones()
            .iter()
            .find(|p| p.partition_number == partition_number)
    }

    /// Get a specific partition, failing with `NotFound` if it is absent
    fn require_zone(&self, partition_number: u32) -> Result<&PartitionInfo> {
        self.get_zone(partition_number).ok_or_else(|| {
            Error::not_found(format!(
                "partition {} not present in {}",
                partition_number,
                self.identify()
            ))
        })
    }
}
