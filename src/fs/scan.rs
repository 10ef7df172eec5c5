//! 诊断用的占用扫描：逐扇区读取整个驱动器，全 0 的扇区视为空闲。
//!
//! 代价与总扇区数成正比，只用于完整性检查，格式化从不调用它。

use log::debug;

use crate::{
    disk::{
        block_device::BlockDevice,
        types::{MAX_SECTORS_PER_COMMAND, SECTOR_SIZE},
    },
    fs::error::Result,
};

/// 扫描结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub total_sectors: u32,
    pub used_sectors: u32,
    pub free_sectors: u32,
    pub last_used: Option<u32>,
    /// 最后一个已用扇区之后的第一个扇区；没有已用扇区时为 0，最后一个扇区已用时为 None
    pub next_free_lba: Option<u32>,
}

/// 每读完一条命令回调一次 `progress(已扫描扇区, 总扇区)`
pub fn scan_occupancy<D, F>(dev: &mut D, drive: u8, mut progress: F) -> Result<Occupancy>
where
    D: BlockDevice + ?Sized,
    F: FnMut(u32, u32),
{
    let total = dev.total_sectors(drive)?;
    let mut buf = vec![0u8; MAX_SECTORS_PER_COMMAND * SECTOR_SIZE];
    let mut used = 0u32;
    let mut last_used = None;

    let mut lba = 0u32;
    while lba < total {
        let count = (total - lba).min(MAX_SECTORS_PER_COMMAND as u32);
        let chunk = &mut buf[..count as usize * SECTOR_SIZE];
        dev.read_sectors(drive, count as u16, lba, chunk)?;

        for (i, sector) in chunk.chunks_exact(SECTOR_SIZE).enumerate() {
            if !crate::utils::is_zeroed(sector) {
                used += 1;
                last_used = Some(lba + i as u32);
            }
        }

        lba += count;
        progress(lba, total);
    }

    let next_free_lba = match last_used {
        None => Some(0),
        Some(last) if last + 1 >= total => None,
        Some(last) => Some(last + 1),
    };
    debug!(
        "scan of drive {}: {} used / {} sectors",
        drive, used, total
    );

    Ok(Occupancy {
        total_sectors: total,
        used_sectors: used,
        free_sectors: total - used,
        last_used,
        next_free_lba,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn blank_drive_is_entirely_free() {
        let mut ide = testing::controller(vec![(0, testing::mem_drive(600))]);
        let mut calls = Vec::new();

        let occ = scan_occupancy(&mut ide, 0, |done, total| calls.push((done, total))).unwrap();
        assert_eq!(occ.used_sectors, 0);
        assert_eq!(occ.free_sectors, 600);
        assert_eq!(occ.next_free_lba, Some(0));
        assert_eq!(calls, vec![(256, 600), (512, 600), (600, 600)]);
    }

    #[test]
    fn next_free_follows_last_used_sector() {
        let mut ide = testing::controller(vec![(0, testing::mem_drive(1024))]);
        ide.write_sectors_counted(0, 5, &[1u8; 512]).unwrap();
        ide.write_sectors_counted(0, 700, &[1u8; 1024]).unwrap();

        let occ = scan_occupancy(&mut ide, 0, |_, _| {}).unwrap();
        assert_eq!(occ.used_sectors, 3);
        assert_eq!(occ.last_used, Some(701));
        assert_eq!(occ.next_free_lba, Some(702));
    }

    #[test]
    fn full_tail_has_no_next_free() {
        let mut ide = testing::controller(vec![(0, testing::mem_drive(1024))]);
        ide.write_sectors_counted(0, 1023, &[7u8; 512]).unwrap();

        let occ = scan_occupancy(&mut ide, 0, |_, _| {}).unwrap();
        assert_eq!(occ.next_free_lba, None);
    }

    #[test]
    fn missing_drive_is_an_io_error() {
        let mut ide = testing::controller(vec![(0, testing::mem_drive(1024))]);
        assert!(scan_occupancy(&mut ide, 1, |_, _| {}).is_err());
    }
}
