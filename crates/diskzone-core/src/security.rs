//! Resource limits and validation helpers
//!
//! Partition metadata is untrusted input: a truncated, bit-rotted or hostile
//! disk can declare arbitrary sizes. Every size derived from on-disk fields
//! goes through these helpers before anything is allocated or read.

use crate::{Error, PartitionInfo};

/// Smallest sector size we accept (a full legacy boot sector must fit)
pub const MIN_SECTOR_SIZE: u32 = 512;

/// Maximum sector size we'll accept (4KB - common for advanced format)
pub const MAX_SECTOR_SIZE: u32 = 4096;

/// Maximum size of a GPT partition entry array (16 MiB)
pub const MAX_PARTITION_TABLE_BYTES: u64 = 16 * 1024 * 1024;

/// Maximum partition count (128 for GPT, padded for safety)
pub const MAX_PARTITION_COUNT: usize = 256;

/// Maximum file size for memory mapping (16 GB - practical limit for most systems)
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Validate that a size is within allocation limits
///
/// # Security
/// Prevents memory exhaustion from malicious size fields
pub fn validate_allocation_size(size: u64, limit: u64, context: &str) -> crate::Result<usize> {
    if size > limit {
        return Err(Error::out_of_resources(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    u64_to_usize(size, context)
}

/// Allocate a zeroed scratch buffer without aborting on allocation failure
///
/// The buffer is owned by the caller and released on every exit path.
pub fn alloc_scratch(len: usize, context: &str) -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| {
        Error::out_of_resources(format!("{}: cannot allocate {} bytes", context, len))
    })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Safely multiply two u64 values with overflow checking
///
/// # Security
/// Prevents integer overflow in size calculations
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::out_of_range(format!("{}: multiplication overflow", context)))
}

/// Safely multiply u32 values and return u64
pub fn checked_multiply_u32_to_u64(a: u32, b: u32, context: &str) -> crate::Result<u64> {
    checked_multiply_u64(a as u64, b as u64, context)
}

/// Safely convert u64 to usize with platform checking
///
/// # Security
/// Prevents truncation on 32-bit platforms
pub fn u64_to_usize(value: u64, context: &str) -> crate::Result<usize> {
    value.try_into().map_err(|_| {
        Error::out_of_resources(format!(
            "{}: value {} exceeds platform usize limit",
            context, value
        ))
    })
}

/// Validate sector size is reasonable
pub fn validate_sector_size(sector_size: u32) -> crate::Result<()> {
    if !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size) {
        return Err(Error::invalid_parameter(format!(
            "Invalid sector size: {} (must be {}-{})",
            sector_size, MIN_SECTOR_SIZE, MAX_SECTOR_SIZE
        )));
    }

    // Sector size should be power of 2
    if !sector_size.is_power_of_two() {
        return Err(Error::invalid_parameter(format!(
            "Sector size {} is not a power of 2",
            sector_size
        )));
    }

    Ok(())
}

/// Check that a discovered partition lies entirely on a device
pub fn validate_partition_bounds(partition: &PartitionInfo, total_sectors: u64) -> crate::Result<()> {
    if partition.start_lba > partition.end_lba {
        return Err(Error::out_of_range(format!(
            "partition {} starts at {} after its end {}",
            partition.partition_number, partition.start_lba, partition.end_lba
        )));
    }

    if partition.end_lba >= total_sectors {
        return Err(Error::out_of_range(format!(
            "partition {} ends at LBA {} but the device has {} sectors",
            partition.partition_number, partition.end_lba, total_sectors
        )));
    }

    Ok(())
}
