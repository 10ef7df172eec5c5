use colored::*;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;

use crate::{
    disk::{
        block_device::BlockDevice,
        ide::{device::DeviceType, IdeController},
        port_io::{PortIo, Timer},
        types::SECTOR_SIZE,
    },
    fs::{
        config::{STATE_CLEAN, STATE_DIRTY},
        inode_table::InodeType,
        Elixir,
    },
    utils::hex_dump,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Drives,
    Format {
        drive: u8,
        verify: bool,
        assume_yes: bool,
    },
    Mount(u8),
    Bitmap(u8),
    Create(u8),
    Rm(u8, u32),
    Stat(u8, u32),
    Ls(u8),
    Check(u8),
    Scan(u8),
    Dump(u8, u32),
    Exit,
}

pub fn execute_command<P, T>(
    cmd: &Command,
    vol: &mut Elixir<IdeController<P, T>>,
) -> Result<(), Box<dyn Error>>
where
    P: PortIo,
    T: Timer,
{
    match *cmd {
        Command::Help => print_help(),
        Command::Drives => print_drives(vol.device()),
        Command::Format {
            drive,
            verify,
            assume_yes,
        } => {
            if !assume_yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Erase drive {} and create a new Elixir volume?", drive))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("{}", "Format cancelled.".yellow());
                    return Ok(());
                }
            }
            println!("💾 Formatting drive {}...", drive);
            let sb = vol.format(drive, verify)?;
            println!(
                "{} {} blocks × {} bytes, data starts at LBA {}",
                "✅ Formatted:".green().bold(),
                sb.total_blocks,
                sb.block_size_bytes(),
                sb.data_start_lba
            );
            if !verify {
                println!("{}", "(superblock verification skipped)".bright_black());
            }
        }
        Command::Mount(drive) => {
            let sb = vol.mount(drive)?;
            println!("{}", "📊 Superblock".bright_yellow().bold());
            println!("{}: {:#06x}", "Magic".blue(), sb.magic);
            println!(
                "{}: {} bytes ({} sectors)",
                "Block size".blue(),
                sb.block_size_bytes(),
                sb.sectors_per_block()
            );
            println!("{}: {} / {}", "Free blocks".blue(), sb.free_blocks, sb.total_blocks);
            println!("{}: {} / {}", "Free inodes".blue(), sb.free_inodes, sb.total_inodes);
            println!(
                "{}: bitmap @{} ({} blocks), inodes @{}, data @{}",
                "Layout".blue(),
                sb.bitmap_start_lba,
                sb.bitmap_blocks,
                sb.inode_table_lba,
                sb.data_start_lba
            );
            println!("{}: {}", "State".blue(), state_name(sb.state));
        }
        Command::Bitmap(drive) => {
            let sb = vol.mount(drive)?;
            let bitmap = vol.read_bitmap(drive, &sb)?;
            println!(
                "🧮 {} blocks: {} used, {} free ({} bytes on disk)",
                bitmap.total,
                bitmap.used_count.to_string().red(),
                bitmap.free_count.to_string().green(),
                bitmap.sector_len() * SECTOR_SIZE
            );
            match bitmap.first_free(sb.data_start_block()) {
                Some(block) => println!("Next data block: {} (LBA {})", block, sb.block_lba(block)),
                None => println!("{}", "No free data blocks".yellow()),
            }
        }
        Command::Create(drive) => {
            let (inode, index) = vol.allocate_file(drive)?;
            println!(
                "📝 Created inode {} at LBA {}",
                inode.to_string().green(),
                index.first_block
            );
        }
        Command::Rm(drive, inode) => {
            let index = vol.release_file(drive, inode)?;
            println!(
                "❌ Released inode {} (LBA {})",
                inode.to_string().red(),
                index.first_block
            );
        }
        Command::Stat(drive, inode) => {
            let index = vol.read_index(drive, inode)?;
            let kind = match InodeType::from_tag(index.kind) {
                Some(InodeType::Free) => "free".to_string(),
                Some(InodeType::Regular) => "regular".to_string(),
                None => format!("unknown ({})", index.kind),
            };
            println!(
                "{}\n{}: {}\n{}: {}\n{}: {} bytes\n{}: {}\n{}: {}\n",
                "📊 Index Info".bright_yellow().bold(),
                "Inode".blue(),
                inode,
                "Type".blue(),
                kind,
                "Size".blue(),
                index.size,
                "First LBA".blue(),
                index.first_block,
                "Timestamp".blue(),
                index.time_stamp
            );
        }
        Command::Ls(drive) => {
            let files = vol.list_files(drive)?;
            if files.is_empty() {
                println!("{}", "(no files)".bright_black());
            }
            for (inode, index) in files {
                println!(
                    "📄  {:>3}  {:>10} bytes  @{}",
                    inode, index.size, index.first_block
                );
            }
        }
        Command::Check(drive) => {
            let report = vol.check(drive)?;
            println!(
                "free blocks: {} recorded / {} counted, free inodes: {} recorded / {} counted",
                report.free_blocks_recorded,
                report.free_blocks_counted,
                report.free_inodes_recorded,
                report.free_inodes_counted
            );
            if report.is_clean() {
                println!("{}", "✅ Volume is consistent".green());
            }
            for problem in &report.problems {
                println!("{} {}", "⚠️ ".yellow(), problem);
            }
        }
        Command::Scan(drive) => {
            let total = vol.device().total_sectors(drive)?;
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::with_template("[{bar:40.green/black}] {pos}/{len} sectors {msg}")?
                    .progress_chars("#>-"),
            );
            let occ = vol.scan(drive, |done, _| pb.set_position(done as u64))?;
            pb.finish_with_message("done");
            println!(
                "🔍 {} used / {} free sectors",
                occ.used_sectors, occ.free_sectors
            );
            match occ.next_free_lba {
                Some(lba) => println!("Next free LBA after last used: {}", lba),
                None => println!("{}", "Last sector is in use; no free tail".yellow()),
            }
        }
        Command::Dump(drive, lba) => {
            let bytes = vol.read_raw(drive, lba)?;
            print!("{}", hex_dump(&bytes, lba as u64 * SECTOR_SIZE as u64));
        }
        Command::Exit => println!("{}", "👋 Exiting Elixir shell...".yellow().bold()),
    }

    Ok(())
}

fn state_name(state: u8) -> ColoredString {
    match state {
        STATE_CLEAN => "clean".green(),
        STATE_DIRTY => "dirty".red(),
        n => format!("unknown ({})", n).yellow(),
    }
}

fn print_drives<P: PortIo, T: Timer>(ide: &IdeController<P, T>) {
    println!(
        "{} {}",
        "🖴  IDE drives".bright_cyan().bold(),
        format!("(poll budget {})", ide.poll_budget()).bright_black()
    );
    for (slot, dev) in ide.devices().iter().enumerate() {
        let place = format!(
            "{} {}",
            if slot / 2 == 0 { "primary" } else { "secondary" },
            if slot % 2 == 0 { "master" } else { "slave" }
        );
        match dev.kind {
            DeviceType::None => println!("  {}  {:<17} {}", slot, place, "-".bright_black()),
            DeviceType::Atapi | DeviceType::Sata => println!(
                "  {}  {:<17} {} {}",
                slot,
                place,
                dev.kind.name(),
                "(unsupported)".yellow()
            ),
            DeviceType::Ata => println!(
                "  {}  {:<17} {} {} sectors ({} MiB){}",
                slot,
                place,
                dev.model.green(),
                dev.size,
                dev.size_mib(),
                if dev.supports_lba48() { " LBA48" } else { "" }
            ),
        }
    }
}

fn print_help() {
    println!("{}", "📘 Elixir Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  drives                    List IDE drives
  format <d> [--no-verify]  Create an Elixir volume on drive d (-y skips the prompt)
  mount <d>                 Show the superblock of drive d
  bitmap <d>                Show block bitmap usage
  create <d>                Allocate a new file
  rm <d> <inode>            Release a file
  stat <d> <inode>          Show an index record
  ls <d>                    List allocated files
  check <d>                 Compare counters with bitmap and inode table
  scan <d>                  Scan every sector for occupancy
  dump <d> <lba>            Hex dump one sector
  help                      Show this help message
  exit                      Quit the shell
"
        .bright_black()
    );
}
