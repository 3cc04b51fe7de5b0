//! Primary/backup cross-validation and restoration of a damaged GPT copy

use super::types::{GptHeader, PRIMARY_HEADER_LBA};
use super::{read_gpt_copy, GptCopy};
use crate::config::DiscoveryConfig;
use diskzone_core::{security, BlockDevice, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the two GPT copies during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Both copies were valid
    #[default]
    None,
    /// The primary copy was rewritten from the backup
    PrimaryRestored,
    /// The backup copy was rewritten from the primary
    BackupRestored,
    /// The primary copy is invalid and was left alone
    PrimaryDamaged,
    /// The backup copy is invalid and was left alone
    BackupDamaged,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recovery::None => "both copies valid",
            Recovery::PrimaryRestored => "primary restored from backup",
            Recovery::BackupRestored => "backup restored from primary",
            Recovery::PrimaryDamaged => "primary damaged, not restored",
            Recovery::BackupDamaged => "backup damaged, not restored",
        };
        f.write_str(text)
    }
}

/// Validate one copy, folding every failure except resource exhaustion
/// into "invalid"
fn probe<D: BlockDevice + ?Sized>(
    device: &mut D,
    lba: u64,
    config: &DiscoveryConfig,
    which: &str,
) -> Result<Option<GptCopy>> {
    match read_gpt_copy(device, lba, config.max_entry_array_bytes) {
        Ok(copy) => Ok(Some(copy)),
        Err(err @ Error::OutOfResources(_)) => Err(err),
        Err(err) => {
            tracing::debug!("{} GPT header at LBA {} rejected: {}", which, lba, err);
            Ok(None)
        }
    }
}

/// Pick the GPT copy to trust, repairing the other one if allowed
///
/// The primary copy is preferred. A copy that was rewritten is validated
/// again before it is reported as restored.
pub(crate) fn select_copy<D: BlockDevice + ?Sized>(
    device: &mut D,
    config: &DiscoveryConfig,
) -> Result<(GptCopy, Recovery)> {
    if let Some(primary) = probe(device, PRIMARY_HEADER_LBA, config, "primary")? {
        let backup_lba = primary.header.alternate_lba;
        if probe(device, backup_lba, config, "backup")?.is_some() {
            return Ok((primary, Recovery::None));
        }

        if !config.repair {
            tracing::warn!("Backup GPT at LBA {} is invalid; repair disabled", backup_lba);
            return Ok((primary, Recovery::BackupDamaged));
        }

        if let Err(err) = restore_gpt(device, &primary) {
            tracing::warn!("Could not restore backup GPT at LBA {}: {}", backup_lba, err);
            return Ok((primary, Recovery::BackupDamaged));
        }

        let recovery = match probe(device, backup_lba, config, "restored backup")? {
            Some(_) => Recovery::BackupRestored,
            None => Recovery::BackupDamaged,
        };
        return Ok((primary, recovery));
    }

    let last_lba = device
        .last_lba()
        .ok_or_else(|| Error::not_found("device has no sectors"))?;
    let backup = probe(device, last_lba, config, "backup")?.ok_or_else(|| {
        Error::not_found(format!(
            "no valid GPT header at LBA {} or LBA {}",
            PRIMARY_HEADER_LBA, last_lba
        ))
    })?;

    if !config.repair {
        tracing::warn!("Primary GPT is invalid; using backup at LBA {} without repair", last_lba);
        return Ok((backup, Recovery::PrimaryDamaged));
    }

    let primary_lba = backup.header.alternate_lba;
    if let Err(err) = restore_gpt(device, &backup) {
        tracing::warn!("Could not restore primary GPT at LBA {}: {}", primary_lba, err);
        return Ok((backup, Recovery::PrimaryDamaged));
    }

    match probe(device, primary_lba, config, "restored primary")? {
        Some(primary) => Ok((primary, Recovery::PrimaryRestored)),
        None => Ok((backup, Recovery::PrimaryDamaged)),
    }
}

/// Regenerate the counterpart of a valid GPT copy
///
/// The new header is the source header with `my_lba` and `alternate_lba`
/// swapped. Its entry array goes right after `last_usable_lba` when the
/// source is the primary, and right after the primary header otherwise.
/// The header sector is written first, then the source entry array is
/// copied verbatim to its new location.
///
/// The counterpart must live in its canonical slot: LBA 1 for the primary,
/// the last LBA of the device for the backup. Neither the header nor the
/// entry array may land on LBA 0, inside the usable range, or on either
/// header sector.
///
/// # Errors
///
/// Returns `InvalidZoneTable` without writing anything if the source's
/// `alternate_lba` does not name the canonical slot or the new copy would
/// overlap protected sectors. Device errors from the writes are passed
/// through.
///
/// Returns the header that was written.
pub fn restore_gpt<D: BlockDevice + ?Sized>(device: &mut D, source: &GptCopy) -> Result<GptHeader> {
    let from = &source.header;
    let last_lba = device
        .last_lba()
        .ok_or_else(|| Error::out_of_range("device has no sectors"))?;

    let (target_lba, partition_entry_lba) = if from.my_lba == PRIMARY_HEADER_LBA {
        let entry_lba = from
            .last_usable_lba
            .checked_add(1)
            .ok_or_else(|| Error::out_of_range("last usable LBA overflows"))?;
        (last_lba, entry_lba)
    } else if from.my_lba == last_lba {
        (PRIMARY_HEADER_LBA, PRIMARY_HEADER_LBA + 1)
    } else {
        return Err(Error::invalid_zone_table(format!(
            "GPT copy at LBA {} is neither the primary nor the backup",
            from.my_lba
        )));
    };

    if from.alternate_lba != target_lba {
        return Err(Error::invalid_zone_table(format!(
            "GPT copy at LBA {} points its counterpart at LBA {}, expected LBA {}",
            from.my_lba, from.alternate_lba, target_lba
        )));
    }

    let block_size = device.block_size() as u64;
    let entry_sectors = (source.entry_array.len() as u64).div_ceil(block_size);
    let entry_end = partition_entry_lba
        .checked_add(entry_sectors.saturating_sub(1))
        .ok_or_else(|| Error::out_of_range("GPT partition entry array overflows"))?;

    check_restore_region(from, target_lba, target_lba, last_lba, "header")?;
    if entry_sectors > 0 {
        check_restore_region(from, partition_entry_lba, entry_end, last_lba, "partition entry array")?;
        let covers = |lba: u64| (partition_entry_lba..=entry_end).contains(&lba);
        if covers(target_lba) || covers(from.my_lba) {
            return Err(Error::invalid_zone_table(format!(
                "restored GPT entry array at LBA {}..={} covers a header sector",
                partition_entry_lba, entry_end
            )));
        }
    }

    let mut header = from.clone();
    header.my_lba = target_lba;
    header.alternate_lba = from.my_lba;
    header.partition_entry_lba = partition_entry_lba;

    let mut sector = security::alloc_scratch(device.block_size() as usize, "GPT header")?;
    header.seal_into(&mut sector)?;

    tracing::warn!(
        "Rewriting GPT header at LBA {} (entries at LBA {}) from copy at LBA {}",
        header.my_lba,
        header.partition_entry_lba,
        from.my_lba
    );

    device.write_blocks(header.my_lba, &sector)?;
    device.write_blocks(header.partition_entry_lba, &source.entry_array)?;
    device.flush()?;

    tracing::info!("Restored GPT copy at LBA {}", header.my_lba);

    Ok(header)
}

/// A restored structure must stay off LBA 0, on the device, and outside
/// the usable range
fn check_restore_region(from: &GptHeader, start: u64, end: u64, last_lba: u64, what: &str) -> Result<()> {
    let in_usable = start <= from.last_usable_lba && end >= from.first_usable_lba;
    if start == 0 || end > last_lba || in_usable {
        return Err(Error::invalid_zone_table(format!(
            "restored GPT {} at LBA {}..={} overlaps protected sectors (usable {}..={}, last LBA {})",
            what, start, end, from.first_usable_lba, from.last_usable_lba, last_lba
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpt::types::PartitionTypeGuid;
    use crate::gpt::{validate_gpt, GptZoneTable};
    use crate::testutil::{put_bytes, write_header, GptImage};
    use diskzone_core::ZoneTable;

    fn test_image() -> GptImage {
        GptImage::new(1024)
            .partition(PartitionTypeGuid::LINUX_FILESYSTEM, 100, 199)
            .partition(PartitionTypeGuid::LINUX_SWAP, 200, 299)
    }

    #[test]
    fn test_primary_restored_from_backup() {
        let image = test_image();
        let mut disk = image.build();

        // Corrupt the primary signature and wipe its entry array
        disk.as_bytes_mut()[512] = b'X';
        put_bytes(&mut disk, 2, &vec![0u8; 32 * 512]);

        let table = GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(table.recovery(), Recovery::PrimaryRestored);
        assert_eq!(table.enumerate_zones().len(), 2);
        assert_eq!(table.header().my_lba, 1);

        let primary = validate_gpt(&mut disk, 1).unwrap();
        assert_eq!(primary.alternate_lba, 1023);
        assert_eq!(primary.partition_entry_lba, 2);
        assert_eq!(&disk.as_bytes()[2 * 512..34 * 512], &image.entry_array()[..]);
    }

    #[test]
    fn test_backup_restored_from_primary() {
        let image = test_image();
        let mut disk = image.build();
        put_bytes(&mut disk, 1023, &[0u8; 512]);

        let table = GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(table.recovery(), Recovery::BackupRestored);
        assert_eq!(table.header().my_lba, 1);

        let backup = validate_gpt(&mut disk, 1023).unwrap();
        assert_eq!(backup.alternate_lba, 1);
        assert_eq!(backup.partition_entry_lba, image.last_usable_lba() + 1);
    }

    #[test]
    fn test_repair_disabled_leaves_disk_untouched() {
        let mut disk = test_image().build();
        disk.as_bytes_mut()[512] = b'X';

        let config = DiscoveryConfig::default().with_repair(false);
        let table = GptZoneTable::discover(&mut disk, &config).unwrap();

        assert_eq!(table.recovery(), Recovery::PrimaryDamaged);
        assert_eq!(table.header().my_lba, 1023);
        assert_eq!(table.enumerate_zones().len(), 2);
        assert_eq!(disk.writes(), 0);
        assert!(validate_gpt(&mut disk, 1).is_err());
    }

    #[test]
    fn test_read_only_device_falls_back_to_backup() {
        let mut disk = test_image().build();
        disk.as_bytes_mut()[512] = b'X';
        disk.set_read_only(true);

        let table = GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(table.recovery(), Recovery::PrimaryDamaged);
        assert_eq!(table.enumerate_zones().len(), 2);
    }

    #[test]
    fn test_both_copies_invalid() {
        let mut disk = test_image().build();
        disk.as_bytes_mut()[512] = b'X';
        put_bytes(&mut disk, 1023, &[0u8; 512]);

        assert!(matches!(
            GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()),
            Err(Error::NotFound(_))
        ));
        assert_eq!(disk.writes(), 0);
    }

    #[test]
    fn test_restore_gpt_swaps_locations() {
        let image = test_image();
        let mut disk = image.build();
        let backup = crate::gpt::read_gpt_copy(&mut disk, 1023, 1 << 20).unwrap();

        let written = restore_gpt(&mut disk, &backup).unwrap();
        assert_eq!(written.my_lba, 1);
        assert_eq!(written.alternate_lba, 1023);
        assert_eq!(written.partition_entry_lba, 2);
        assert_eq!(written.disk_guid, image.disk_guid);
        assert_eq!(validate_gpt(&mut disk, 1).unwrap(), written);
    }

    #[test]
    fn test_backup_pointing_into_partition_is_not_restored() {
        let image = GptImage::new(1024).partition(PartitionTypeGuid::LINUX_FILESYSTEM, 100, 599);
        let mut disk = image.build();
        disk.as_bytes_mut()[512] = b'X';
        put_bytes(&mut disk, 500, &[0xAB; 512]);

        let mut backup = image.backup_header();
        backup.alternate_lba = 500;
        write_header(&mut disk, &mut backup);

        let table = GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(table.recovery(), Recovery::PrimaryDamaged);
        assert_eq!(table.header().my_lba, 1023);
        assert_eq!(table.enumerate_zones().len(), 1);
        assert_eq!(disk.writes(), 0);
        assert_eq!(disk.sector(500).unwrap(), &[0xAB; 512][..]);
        assert!(validate_gpt(&mut disk, 1).is_err());
    }

    #[test]
    fn test_primary_pointing_at_mbr_is_not_restored() {
        let image = test_image();
        let mut disk = image.build();

        let mut primary = image.primary_header();
        primary.alternate_lba = 0;
        write_header(&mut disk, &mut primary);
        let mbr = disk.sector(0).unwrap().to_vec();

        let table = GptZoneTable::discover(&mut disk, &DiscoveryConfig::default()).unwrap();
        assert_eq!(table.recovery(), Recovery::BackupDamaged);
        assert_eq!(table.header().my_lba, 1);
        assert_eq!(disk.writes(), 0);
        assert_eq!(disk.sector(0).unwrap(), &mbr[..]);
    }

    #[test]
    fn test_restore_gpt_rejects_misplaced_targets() {
        let mut disk = test_image().build();
        let primary = crate::gpt::read_gpt_copy(&mut disk, 1, 1 << 20).unwrap();

        let mut wrong_slot = primary.clone();
        wrong_slot.header.alternate_lba = 1022;
        assert!(matches!(
            restore_gpt(&mut disk, &wrong_slot),
            Err(Error::InvalidZoneTable(_))
        ));

        // Entries would run from LBA 1001 over the backup header sector
        let mut wide_usable = primary.clone();
        wide_usable.header.last_usable_lba = 1000;
        assert!(matches!(
            restore_gpt(&mut disk, &wide_usable),
            Err(Error::InvalidZoneTable(_))
        ));

        assert_eq!(disk.writes(), 0);
    }

    #[test]
    fn test_recovery_display() {
        assert_eq!(Recovery::PrimaryRestored.to_string(), "primary restored from backup");
        assert_eq!(Recovery::default(), Recovery::None);
    }
}
