//! Partition device - exposes one partition as a block device of its own

use diskzone_core::{security, BlockDevice, Error, PartitionInfo, Result};

/// A block device that exposes only one partition of a parent device.
///
/// Addresses are partition-relative: byte offset 0 is the first byte of the
/// partition's `start_lba`. Every request is checked against the partition's
/// `end_lba` before the parent is touched, then translated and passed
/// through. No data is cached.
///
/// `parent` is usually a `&mut D` borrowed from the caller, so the parent
/// outlives the partition device by construction. Because `PartitionDevice`
/// is itself a [`BlockDevice`], partitions can be wrapped again.
///
/// # Example
///
/// ```rust
/// use diskzone_core::{BlockDevice, PartitionInfo, PartitionKind, Scheme};
/// use diskzone_pipeline::{MemoryDevice, PartitionDevice};
///
/// let mut disk = MemoryDevice::new(64, 512).unwrap();
/// let info = PartitionInfo {
///     scheme: Scheme::Mbr,
///     kind: PartitionKind::Mbr(0x83),
///     unique_guid: None,
///     start_lba: 16,
///     end_lba: 31,
///     size_sectors: 16,
///     attributes: 0,
///     name: "Linux".to_string(),
///     bootable: false,
///     partition_number: 1,
///     is_efi_system: false,
///     is_os_reserved: false,
/// };
///
/// let mut part = PartitionDevice::new(&mut disk, info).unwrap();
/// assert_eq!(part.total_sectors(), 16);
/// part.write_blocks(0, &[0x42; 512]).unwrap();
/// drop(part);
///
/// assert_eq!(disk.sector(16).unwrap()[0], 0x42);
/// ```
pub struct PartitionDevice<D: BlockDevice> {
    parent: D,
    info: PartitionInfo,
}

impl<D: BlockDevice> PartitionDevice<D> {
    /// Wrap a discovered partition of `parent`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the partition is inverted or does not lie
    /// entirely on the parent, and `InvalidParameter` if its recorded size
    /// disagrees with its LBA range.
    pub fn new(parent: D, info: PartitionInfo) -> Result<Self> {
        security::validate_partition_bounds(&info, parent.total_sectors())?;

        if info.size_sectors != info.end_lba - info.start_lba + 1 {
            return Err(Error::invalid_parameter(format!(
                "partition {} records {} sectors but spans LBA {}..={}",
                info.partition_number, info.size_sectors, info.start_lba, info.end_lba
            )));
        }

        tracing::debug!(
            "Opened partition device #{} over LBA {}..={}",
            info.partition_number,
            info.start_lba,
            info.end_lba
        );

        Ok(Self { parent, info })
    }

    /// The partition this device exposes
    pub fn info(&self) -> &PartitionInfo {
        &self.info
    }

    /// Borrow the parent device
    pub fn parent(&self) -> &D {
        &self.parent
    }

    /// Release the parent device
    pub fn into_parent(self) -> D {
        self.parent
    }

    /// Translate a partition-relative access to a parent byte offset
    ///
    /// Fails without side effects if the last byte accessed would fall past
    /// `end_lba`.
    fn translate(&self, offset: u64, len: usize) -> Result<u64> {
        let block_size = self.parent.block_size() as u64;
        let limit = security::checked_multiply_u64(self.info.size_sectors, block_size, "partition size")?;

        let end = offset.checked_add(len as u64).filter(|&end| end <= limit);
        if end.is_none() {
            return Err(Error::out_of_range(format!(
                "access of {} bytes at partition offset {} exceeds partition {} ({} sectors)",
                len, offset, self.info.partition_number, self.info.size_sectors
            )));
        }

        let base = security::checked_multiply_u64(self.info.start_lba, block_size, "partition start")?;
        base.checked_add(offset)
            .ok_or_else(|| Error::out_of_range("partition offset overflow"))
    }
}

impl<D: BlockDevice> BlockDevice for PartitionDevice<D> {
    fn block_size(&self) -> u32 {
        self.parent.block_size()
    }

    fn total_sectors(&self) -> u64 {
        self.info.size_sectors
    }

    fn media_id(&self) -> u32 {
        self.parent.media_id()
    }

    fn read(&mut self, media_id: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        let parent_offset = self.translate(offset, buf.len())?;
        self.parent.read(media_id, parent_offset, buf)
    }

    fn write(&mut self, media_id: u32, offset: u64, buf: &[u8]) -> Result<()> {
        let parent_offset = self.translate(offset, buf.len())?;
        self.parent.write(media_id, parent_offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.parent.flush()
    }
}
