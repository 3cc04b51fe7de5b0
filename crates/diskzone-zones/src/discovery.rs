//! Unified discovery: GPT first, then MBR

use crate::config::DiscoveryConfig;
use crate::gpt::recovery::Recovery;
use crate::gpt::GptZoneTable;
use crate::mbr::MbrZoneTable;
use diskzone_core::{BlockDevice, Error, Guid, PartitionInfo, Result, Scheme, ZoneTable};
use serde::Serialize;
use std::fmt;

/// Identifier of the disk as recorded by its partition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DiskId {
    /// GPT disk GUID
    Guid(Guid),
    /// MBR disk signature
    Signature(u32),
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskId::Guid(guid) => write!(f, "{}", guid),
            DiskId::Signature(signature) => write!(f, "0x{:08X}", signature),
        }
    }
}

/// Everything one discovery run found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub scheme: Scheme,
    pub disk_id: DiskId,
    pub partitions: Vec<PartitionInfo>,
    /// GPT copy handling; always `Recovery::None` for MBR disks
    pub recovery: Recovery,
}

impl From<GptZoneTable> for Discovery {
    fn from(table: GptZoneTable) -> Self {
        Self {
            scheme: Scheme::Gpt,
            disk_id: DiskId::Guid(table.disk_guid()),
            recovery: table.recovery(),
            partitions: table.into_zones(),
        }
    }
}

impl From<MbrZoneTable> for Discovery {
    fn from(table: MbrZoneTable) -> Self {
        Self {
            scheme: Scheme::Mbr,
            disk_id: DiskId::Signature(table.disk_signature()),
            recovery: Recovery::None,
            partitions: table.into_zones(),
        }
    }
}

impl ZoneTable for Discovery {
    fn identify(&self) -> &str {
        match self.scheme {
            Scheme::Gpt => "GUID Partition Table",
            Scheme::Mbr => "Master Boot Record",
        }
    }

    fn enumerate_zones(&self) -> &[PartitionInfo] {
        &self.partitions
    }
}

/// Discover the partitions of a device
///
/// Tries GPT first and falls back to MBR only if no usable GPT is found.
/// At most `max_entries` partitions are returned; the rest are dropped.
///
/// # Errors
///
/// `InvalidParameter` if `max_entries` is zero, `NotFound` if neither
/// scheme yields a partition table, and device errors met while reading
/// the MBR. If GPT discovery ran out of resources and no MBR is found
/// either, that `OutOfResources` error is returned.
///
/// # Example
///
/// ```rust
/// use diskzone_pipeline::MemoryDevice;
/// use diskzone_zones::discover;
///
/// let mut disk = MemoryDevice::new(2048, 512).unwrap();
/// assert!(discover(&mut disk, 16).is_err());
/// ```
pub fn discover<D: BlockDevice + ?Sized>(device: &mut D, max_entries: usize) -> Result<Vec<PartitionInfo>> {
    let config = DiscoveryConfig::default().with_max_entries(max_entries);
    discover_with(device, &config).map(|discovery| discovery.partitions)
}

/// Discover the partitions of a device with explicit settings
pub fn discover_with<D: BlockDevice + ?Sized>(device: &mut D, config: &DiscoveryConfig) -> Result<Discovery> {
    config.validate()?;

    let mut exhausted = None;
    match GptZoneTable::discover(device, config) {
        Ok(table) => return Ok(table.into()),
        Err(err @ Error::InvalidParameter(_)) => return Err(err),
        Err(err @ Error::OutOfResources(_)) => {
            tracing::warn!("GPT discovery ran out of resources: {}", err);
            exhausted = Some(err);
        }
        Err(err) => {
            tracing::debug!("No usable GPT: {}", err);
        }
    }

    match MbrZoneTable::discover(device, config) {
        Ok(table) => Ok(table.into()),
        Err(Error::NotFound(reason)) => match exhausted {
            Some(err) => Err(err),
            None => Err(Error::not_found(format!(
                "no GPT or MBR partition table found ({})",
                reason
            ))),
        },
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpt::types::PartitionTypeGuid;
    use crate::gpt::validate_gpt;
    use crate::testutil::{boot_sector, mbr_entry, put_bytes, write_header, GptImage};
    use diskzone_pipeline::{MemoryDevice, PartitionDevice};

    fn gpt_disk() -> GptImage {
        GptImage::new(1024)
            .partition(PartitionTypeGuid::EFI_SYSTEM, 40, 99)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 100, 199)
            .partition(PartitionTypeGuid::LINUX_SWAP, 200, 299)
    }

    fn mbr_disk() -> MemoryDevice {
        let mut disk = MemoryDevice::new(4096, 512).unwrap();
        put_bytes(
            &mut disk,
            0,
            &boot_sector(
                0xCAFE_F00D,
                &[(0, mbr_entry(0x80, 0x0C, 63, 1985)), (1, mbr_entry(0x00, 0x83, 2048, 2048))],
            ),
        );
        disk
    }

    #[test]
    fn test_gpt_preferred() {
        let image = gpt_disk();
        let mut disk = image.build();

        let discovery = discover_with(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(discovery.scheme, Scheme::Gpt);
        assert_eq!(discovery.disk_id, DiskId::Guid(image.disk_guid));
        assert_eq!(discovery.recovery, Recovery::None);
        assert_eq!(discovery.identify(), "GUID Partition Table");
        assert_eq!(discovery.enumerate_zones().len(), 3);
    }

    #[test]
    fn test_mbr_fallback() {
        let mut disk = mbr_disk();

        let discovery = discover_with(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(discovery.scheme, Scheme::Mbr);
        assert_eq!(discovery.disk_id, DiskId::Signature(0xCAFE_F00D));
        assert_eq!(discovery.disk_id.to_string(), "0xCAFEF00D");
        assert_eq!(discovery.partitions.len(), 2);
        assert_eq!(disk.writes(), 0);
    }

    #[test]
    fn test_blank_disk_not_found() {
        let mut disk = MemoryDevice::new(1024, 512).unwrap();
        assert!(matches!(discover(&mut disk, 128), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_protective_mbr_without_gpt_not_found() {
        let mut disk = gpt_disk().build();
        put_bytes(&mut disk, 1, &[0u8; 512]);
        put_bytes(&mut disk, 1023, &[0u8; 512]);

        assert!(matches!(discover(&mut disk, 128), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut disk = gpt_disk().build();
        assert!(matches!(discover(&mut disk, 0), Err(Error::InvalidParameter(_))));
        assert_eq!(disk.reads(), 0);
    }

    #[test]
    fn test_results_truncated() {
        let mut disk = gpt_disk().build();
        let partitions = discover(&mut disk, 2).unwrap();

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[1].partition_number, 2);
    }

    #[test]
    fn test_corrupted_primary_recovered() {
        let mut disk = gpt_disk().build();
        disk.as_bytes_mut()[512..520].copy_from_slice(b"NOT PART");

        let partitions = discover(&mut disk, 128).unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[2].start_lba, 200);

        let primary = validate_gpt(&mut disk, 1).unwrap();
        assert_eq!(primary.my_lba, 1);
        assert!(primary.verify_header_crc32(disk.sector(1).unwrap()));
    }

    #[test]
    fn test_overlap_and_touching_end_to_end() {
        let mut disk = GptImage::new(1024)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 100, 199)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 150, 249)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 300, 399)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 400, 499)
            .build();

        let numbers: Vec<u32> = discover(&mut disk, 128)
            .unwrap()
            .iter()
            .map(|p| p.partition_number)
            .collect();
        assert_eq!(numbers, vec![3, 4]);
    }

    #[test]
    fn test_gpt_resource_exhaustion_reported() {
        let image = gpt_disk();
        let mut disk = image.build();
        for mut header in [image.primary_header(), image.backup_header()] {
            header.num_partition_entries = u32::MAX;
            header.partition_entry_size = u32::MAX;
            write_header(&mut disk, &mut header);
        }

        let config = DiscoveryConfig::default().with_max_entry_array_bytes(u64::MAX);
        assert!(matches!(
            discover_with(&mut disk, &config),
            Err(Error::OutOfResources(_))
        ));

        // A real MBR still wins over the exhausted GPT
        put_bytes(&mut disk, 0, &boot_sector(0, &[(0, mbr_entry(0x00, 0x83, 40, 60))]));
        let discovery = discover_with(&mut disk, &config).unwrap();
        assert_eq!(discovery.scheme, Scheme::Mbr);
    }

    #[test]
    fn test_gpt_with_no_usable_entries_is_empty() {
        let mut disk = GptImage::new(1024).build();
        let discovery = discover_with(&mut disk, &DiscoveryConfig::default()).unwrap();

        assert_eq!(discovery.scheme, Scheme::Gpt);
        assert!(discovery.partitions.is_empty());
    }

    #[test]
    fn test_through_trait_object() {
        let mut disk = mbr_disk();
        let device: &mut dyn BlockDevice = &mut disk;

        assert_eq!(discover(device, 128).unwrap().len(), 2);
    }

    #[test]
    fn test_nested_discovery_through_partition_device() {
        // An MBR disk whose second partition holds a GPT disk image
        let inner = gpt_disk().build().into_inner();
        let mut disk = MemoryDevice::new(4096, 512).unwrap();
        put_bytes(
            &mut disk,
            0,
            &boot_sector(0, &[(0, mbr_entry(0x00, 0x83, 1024, 1024))]),
        );
        put_bytes(&mut disk, 1024, &inner);

        let outer = discover(&mut disk, 128).unwrap();
        let mut part = PartitionDevice::new(&mut disk, outer[0].clone()).unwrap();
        let nested = discover_with(&mut part, &DiscoveryConfig::default()).unwrap();

        assert_eq!(nested.scheme, Scheme::Gpt);
        assert_eq!(nested.partitions.len(), 3);
        assert_eq!(nested.partitions[0].start_lba, 40);
    }

    #[test]
    fn test_discovery_serializes() {
        let mut disk = mbr_disk();
        let discovery = discover_with(&mut disk, &DiscoveryConfig::default()).unwrap();

        let json = serde_json::to_value(&discovery).unwrap();
        assert_eq!(json["scheme"], "mbr");
        assert_eq!(json["recovery"], "none");
        assert_eq!(json["disk_id"]["kind"], "signature");
        assert_eq!(json["partitions"][1]["kind"]["type"], 0x83);
    }
}
