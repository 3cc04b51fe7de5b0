//! diskzone CLI - partition table inspection and repair
//!
//! Discovers GPT and MBR partition tables in disk image files, restores a
//! damaged GPT copy, and dumps sectors of individual partitions.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diskzone_core::{BlockDevice, PartitionInfo, PartitionList, ZoneTable};
use diskzone_pipeline::{FileDevice, MmapDevice, PartitionDevice};
use diskzone_zones::{discover_with, Discovery, DiscoveryConfig, Recovery};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "diskzone")]
#[command(about = "Discover, validate and repair GPT/MBR partition tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Sector size in bytes
    #[arg(long, env = "DISKZONE_SECTOR_SIZE", default_value = "512")]
    sector_size: u32,

    /// Maximum number of partitions to report
    #[arg(long, env = "DISKZONE_MAX_ENTRIES", default_value = "128")]
    max_entries: usize,

    /// Only trust a GPT that sits behind a protective MBR
    #[arg(long)]
    require_protective_mbr: bool,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Show the partition table type and disk identity
    Info {
        /// Disk image
        image: PathBuf,
    },

    /// List discovered partitions
    Zones {
        /// Disk image
        image: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a damaged GPT copy from its healthy counterpart
    Repair {
        /// Disk image (opened read/write)
        image: PathBuf,
    },

    /// Hex dump sectors of one partition
    Read {
        /// Disk image
        image: PathBuf,

        /// Partition number as listed by `zones`
        #[arg(long)]
        partition: u32,

        /// First sector, relative to the partition start
        #[arg(long)]
        lba: u64,

        /// Number of sectors
        #[arg(long, default_value = "1")]
        count: u64,
    },
}

impl Cli {
    fn config(&self, repair: bool) -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_max_entries(self.max_entries)
            .with_protective_mbr_required(self.require_protective_mbr)
            .with_repair(repair)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Info { image } => cmd_info(&cli, image),
        Command::Zones { image, json } => cmd_zones(&cli, image, *json),
        Command::Repair { image } => cmd_repair(&cli, image),
        Command::Read {
            image,
            partition,
            lba,
            count,
        } => cmd_read(&cli, image, *partition, *lba, *count),
    }
}

/// Open an image read-only and run discovery without repair
fn inspect(cli: &Cli, image: &Path) -> Result<(MmapDevice, Discovery)> {
    let mut device = MmapDevice::open(image, cli.sector_size)
        .with_context(|| format!("cannot open {}", image.display()))?;
    let discovery = discover_with(&mut device, &cli.config(false))
        .with_context(|| format!("no partition table in {}", image.display()))?;
    Ok((device, discovery))
}

fn cmd_info(cli: &Cli, image: &Path) -> Result<()> {
    let (device, discovery) = inspect(cli, image)?;
    let sector_size = device.block_size();

    println!("=== Disk Information ===");
    println!("Path:        {}", image.display());
    println!(
        "Size:        {} ({} sectors of {} bytes)",
        format_bytes(device.total_sectors() * sector_size as u64),
        device.total_sectors(),
        sector_size
    );
    println!();
    println!("=== Partition Table ===");
    println!("Type:        {}", discovery.identify());
    println!("Disk ID:     {}", discovery.disk_id);
    println!("Partitions:  {}", discovery.partitions.len());
    if discovery.recovery != Recovery::None {
        println!("GPT copies:  {}", discovery.recovery);
        println!();
        println!("Note: run `diskzone repair` to rewrite the damaged copy.");
    }

    let partitions = discovery.enumerate_zones();
    if let Some(esp) = partitions.find_efi_system() {
        println!("ESP:         #{} {}", esp.partition_number, esp.name);
    }
    if let Some(boot) = partitions.find_bootable() {
        println!("Bootable:    #{} {}", boot.partition_number, boot.name);
    }

    Ok(())
}

fn cmd_zones(cli: &Cli, image: &Path, json: bool) -> Result<()> {
    let (device, discovery) = inspect(cli, image)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&discovery.partitions)?);
        return Ok(());
    }

    println!("Partition table: {}", discovery.identify());
    println!();

    if discovery.partitions.is_empty() {
        println!("No partitions found.");
        return Ok(());
    }

    print_table(&discovery.partitions, device.block_size());
    Ok(())
}

fn print_table(partitions: &[PartitionInfo], sector_size: u32) {
    println!(
        "{:<4} {:<12} {:<12} {:<12} {:<5} {:<30}",
        "#", "Start", "End", "Size", "Boot", "Name"
    );
    println!("{}", "-".repeat(80));

    for zone in partitions {
        println!(
            "{:<4} {:<12} {:<12} {:<12} {:<5} {:<30}",
            zone.partition_number,
            zone.start_lba,
            zone.end_lba,
            format_bytes(zone.byte_length(sector_size)),
            if zone.bootable { "*" } else { "" },
            zone.name
        );
    }
}

fn cmd_repair(cli: &Cli, image: &Path) -> Result<()> {
    let mut device = FileDevice::open(image, cli.sector_size, true)
        .with_context(|| format!("cannot open {} for writing", image.display()))?;
    let discovery = discover_with(&mut device, &cli.config(true))
        .with_context(|| format!("no partition table in {}", image.display()))?;

    match discovery.recovery {
        Recovery::None => println!("Both GPT copies are valid; nothing to do."),
        Recovery::PrimaryRestored | Recovery::BackupRestored => {
            println!("Repaired: {}.", discovery.recovery)
        }
        Recovery::PrimaryDamaged | Recovery::BackupDamaged => {
            bail!("repair failed: {}", discovery.recovery)
        }
    }

    Ok(())
}

fn cmd_read(cli: &Cli, image: &Path, partition: u32, lba: u64, count: u64) -> Result<()> {
    let (mut device, discovery) = inspect(cli, image)?;
    let info = discovery
        .partitions
        .find_by_number(partition)
        .cloned()
        .with_context(|| format!("partition {} not found", partition))?;

    let sector_size = device.block_size() as u64;
    let len = count
        .checked_mul(sector_size)
        .and_then(|len| usize::try_from(len).ok())
        .context("read length overflows")?;

    let mut part = PartitionDevice::new(&mut device, info)?;
    let mut buf = vec![0u8; len];
    part.read_blocks(lba, &mut buf)
        .with_context(|| format!("cannot read {} sectors at LBA {} of partition {}", count, lba, partition))?;

    print!("{}", hex_dump(&buf, lba * sector_size));
    Ok(())
}

/// Classic 16-bytes-per-line hex dump, offsets relative to the partition
fn hex_dump(data: &[u8], base_offset: u64) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            base_offset + (i * 16) as u64,
            hex.join(" "),
            ascii
        ));
    }
    out
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    }
}
