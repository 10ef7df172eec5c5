//! Elixir 文件系统
//!
//! 磁盘布局：LBA 1 超级块，LBA 2 起为块位图，之后是 128 个扇区的 inode 表，
//! 再之后是数据区。超级块和位图每次操作都重新从磁盘读取，不做隐式缓存；
//! 所有操作都需要 `&mut self`，因此格式化和挂载期间整个卷是独占的。

use log::{debug, info, warn};

use crate::{
    disk::{block_device::BlockDevice, types::SECTOR_SIZE},
    fs::{
        config::{
            INODE_TABLE_SECTORS, MIN_SECTORS, STATE_CLEAN, STATE_DIRTY, SUPERBLOCK_LBA,
        },
        data_block_bitmap::BlockBitmap,
        error::{FileSystemError, Result},
        inode_table::{Index, InodeTable},
        scan::Occupancy,
        super_block::SuperBlock,
    },
};

pub mod config;
pub mod data_block_bitmap;
pub mod error;
pub mod inode_table;
pub mod scan;
pub mod super_block;

/// 一致性检查的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub free_blocks_recorded: u32, // 超级块中的空闲块数
    pub free_blocks_counted: u32,  // 位图重新统计的空闲块数
    pub free_inodes_recorded: u32, // 超级块中的空闲 inode 数
    pub free_inodes_counted: u32,  // inode 表中的空槽数
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// 建立在块设备之上的 Elixir 卷管理器
#[derive(Debug)]
pub struct Elixir<D> {
    dev: D,
}

impl<D: BlockDevice> Elixir<D> {
    pub fn new(dev: D) -> Self {
        Self { dev }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// 按驱动器容量构造超级块，不写盘
    pub fn create_super(&self, drive: u8) -> Result<SuperBlock> {
        let sectors = self.dev.total_sectors(drive)?;
        if sectors < MIN_SECTORS {
            return Err(FileSystemError::DriveTooSmall {
                sectors,
                minimum: MIN_SECTORS,
            });
        }
        Ok(SuperBlock::new(sectors))
    }

    /// 按驱动器容量构造全部空闲的位图
    pub fn create_bitmap(&self, drive: u8) -> Result<BlockBitmap> {
        let sb = self.create_super(drive)?;
        Ok(BlockBitmap::new(sb.total_blocks))
    }

    /// 格式化：超级块 -> （校验）-> 位图 -> 清空 inode 表
    ///
    /// 任何一步失败都直接返回，已经写下的部分不回滚，重新格式化即可恢复。
    pub fn format(&mut self, drive: u8, verify: bool) -> Result<SuperBlock> {
        let sb = self.create_super(drive)?;
        info!(
            "Formatting drive {}: {} blocks of {} bytes, data at LBA {}",
            drive,
            sb.total_blocks,
            sb.block_size_bytes(),
            sb.data_start_lba
        );

        self.write_super(drive, &sb)?;

        if verify {
            let on_disk = self.read_super(drive)?;
            if let Err(e) = sb.verify(&on_disk) {
                warn!("Drive {}: {}", drive, e);
                return Err(e);
            }
            debug!("superblock on drive {} verified", drive);
        }

        let bitmap = BlockBitmap::new(sb.total_blocks);
        self.write_bitmap(drive, &sb, &bitmap)?;

        let table = vec![0u8; INODE_TABLE_SECTORS as usize * SECTOR_SIZE];
        self.dev
            .write_sectors_counted(drive, sb.inode_table_lba, &table)?;

        info!("Drive {} formatted", drive);
        Ok(sb)
    }

    /// 读取并校验超级块；魔数不符时返回 InvalidFilesystem，布局字段损坏时返回 Corrupted
    pub fn mount(&mut self, drive: u8) -> Result<SuperBlock> {
        let sb = self.read_super(drive)?;
        if !sb.is_valid() {
            return Err(FileSystemError::InvalidFilesystem { found: sb.magic });
        }
        sb.check_layout()?;
        if sb.state != STATE_CLEAN {
            warn!("Drive {} was not cleanly updated (state {})", drive, sb.state);
        }
        Ok(sb)
    }

    pub fn write_bitmap(&mut self, drive: u8, sb: &SuperBlock, bitmap: &BlockBitmap) -> Result<()> {
        if bitmap.total != sb.total_blocks {
            return Err(FileSystemError::Corrupted(format!(
                "bitmap covers {} blocks, superblock declares {}",
                bitmap.total, sb.total_blocks
            )));
        }
        self.dev
            .write_sectors_counted(drive, sb.bitmap_start_lba, &bitmap.to_sectors())?;
        Ok(())
    }

    /// 从磁盘重新加载位图，计数按位重算
    pub fn read_bitmap(&mut self, drive: u8, sb: &SuperBlock) -> Result<BlockBitmap> {
        let mut bytes = vec![0u8; sb.bitmap_sectors() as usize * SECTOR_SIZE];
        self.dev.read_range(drive, sb.bitmap_start_lba, &mut bytes)?;
        Ok(BlockBitmap::from_bytes(bytes, sb.total_blocks))
    }

    /// 新的空索引记录；只校验驱动器，不占用 inode 和数据块
    pub fn create_file(&self, drive: u8) -> Result<Index> {
        self.dev.total_sectors(drive)?;
        Ok(Index::regular())
    }

    /// 分配一个文件：第一个空 inode 槽 + 数据区第一个空闲块
    ///
    /// 写盘顺序为 位图 -> 索引记录 -> 超级块，中途失败最多泄漏一个块，不会重复分配。
    pub fn allocate_file(&mut self, drive: u8) -> Result<(u32, Index)> {
        let mut sb = self.mount(drive)?;
        let mut bitmap = self.read_bitmap(drive, &sb)?;
        let table = self.read_inode_table(drive, &sb)?;

        let inode = table.find_free().ok_or(FileSystemError::InodeFull)?;
        let block = bitmap
            .first_free(sb.data_start_block())
            .ok_or(FileSystemError::DiskFull)?;

        let mut index = self.create_file(drive)?;
        index.first_block = sb.block_lba(block);

        sb.state = STATE_DIRTY;
        self.write_super(drive, &sb)?;

        bitmap.set_used(block);
        self.write_bitmap(drive, &sb, &bitmap)?;
        self.write_index(drive, &sb, inode, &index)?;

        sb.free_inodes = sb.free_inodes.saturating_sub(1);
        sb.free_blocks = sb.free_blocks.saturating_sub(1);
        sb.state = STATE_CLEAN;
        self.write_super(drive, &sb)?;

        debug!(
            "allocated inode {} at LBA {} on drive {}",
            inode, index.first_block, drive
        );
        Ok((inode, index))
    }

    /// 释放文件：先清空索引，再释放块位
    pub fn release_file(&mut self, drive: u8, inode: u32) -> Result<Index> {
        let mut sb = self.mount(drive)?;
        let index = self.read_slot(drive, &sb, inode)?;
        if index.is_free() {
            return Err(FileSystemError::InvalidInode(inode));
        }

        sb.state = STATE_DIRTY;
        self.write_super(drive, &sb)?;

        self.write_index(drive, &sb, inode, &Index::default())?;
        let mut bitmap = self.read_bitmap(drive, &sb)?;
        let freed = bitmap.set_free(sb.lba_block(index.first_block));
        self.write_bitmap(drive, &sb, &bitmap)?;

        sb.free_inodes = sb.free_inodes.saturating_add(1).min(sb.total_inodes);
        if freed {
            sb.free_blocks = sb.free_blocks.saturating_add(1).min(sb.total_blocks);
        }
        sb.state = STATE_CLEAN;
        self.write_super(drive, &sb)?;

        Ok(index)
    }

    /// 读取一条索引记录
    pub fn read_index(&mut self, drive: u8, inode: u32) -> Result<Index> {
        let sb = self.mount(drive)?;
        self.read_slot(drive, &sb, inode)
    }

    /// 所有已分配的文件
    pub fn list_files(&mut self, drive: u8) -> Result<Vec<(u32, Index)>> {
        let sb = self.mount(drive)?;
        let table = self.read_inode_table(drive, &sb)?;
        Ok(table.used().map(|(i, r)| (i, *r)).collect())
    }

    /// 只读的一致性检查，不做修复
    pub fn check(&mut self, drive: u8) -> Result<CheckReport> {
        let sb = self.mount(drive)?;
        let bitmap = self.read_bitmap(drive, &sb)?;
        let table = self.read_inode_table(drive, &sb)?;

        let mut problems = Vec::new();
        if sb.state != STATE_CLEAN {
            problems.push(format!("superblock state is {}", sb.state));
        }
        if sb.free_blocks != bitmap.free_count {
            problems.push(format!(
                "free_blocks is {} but the bitmap has {} free",
                sb.free_blocks, bitmap.free_count
            ));
        }
        let free_inodes = table.free_count();
        if sb.free_inodes != free_inodes {
            problems.push(format!(
                "free_inodes is {} but the inode table has {} free slots",
                sb.free_inodes, free_inodes
            ));
        }
        for (inode, index) in table.used() {
            if let Err(e) = index.inode_type() {
                problems.push(format!("inode {}: {}", inode, e));
                continue;
            }
            let block = sb.lba_block(index.first_block);
            if block < sb.data_start_block() || block >= sb.total_blocks {
                problems.push(format!(
                    "inode {} points outside the data area (LBA {})",
                    inode, index.first_block
                ));
            } else if !bitmap.is_used(block) {
                problems.push(format!("inode {} uses block {} marked free", inode, block));
            }
        }

        Ok(CheckReport {
            free_blocks_recorded: sb.free_blocks,
            free_blocks_counted: bitmap.free_count,
            free_inodes_recorded: sb.free_inodes,
            free_inodes_counted: free_inodes,
            problems,
        })
    }

    /// 诊断扫描，见 [`scan::scan_occupancy`]
    pub fn scan<F: FnMut(u32, u32)>(&mut self, drive: u8, progress: F) -> Result<Occupancy> {
        scan::scan_occupancy(&mut self.dev, drive, progress)
    }

    /// 原始扇区读取，供 shell 转储
    pub fn read_raw(&mut self, drive: u8, lba: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SECTOR_SIZE];
        self.dev.read_sectors(drive, 1, lba, &mut buf)?;
        Ok(buf)
    }

    fn write_super(&mut self, drive: u8, sb: &SuperBlock) -> Result<()> {
        self.dev
            .write_sectors_counted(drive, SUPERBLOCK_LBA, &sb.encode()?)?;
        Ok(())
    }

    fn read_super(&mut self, drive: u8) -> Result<SuperBlock> {
        let mut sector = [0u8; SECTOR_SIZE];
        self.dev.read_sectors(drive, 1, SUPERBLOCK_LBA, &mut sector)?;
        SuperBlock::decode(&sector)
    }

    fn read_inode_table(&mut self, drive: u8, sb: &SuperBlock) -> Result<InodeTable> {
        let mut bytes = vec![0u8; INODE_TABLE_SECTORS as usize * SECTOR_SIZE];
        self.dev.read_range(drive, sb.inode_table_lba, &mut bytes)?;
        InodeTable::from_sectors(&bytes)
    }

    fn read_slot(&mut self, drive: u8, sb: &SuperBlock, inode: u32) -> Result<Index> {
        if inode >= sb.total_inodes {
            return Err(FileSystemError::InvalidInode(inode));
        }
        let mut sector = [0u8; SECTOR_SIZE];
        let lba = InodeTable::slot_lba(sb.inode_table_lba, inode)?;
        self.dev.read_sectors(drive, 1, lba, &mut sector)?;
        Index::decode(&sector)
    }

    fn write_index(&mut self, drive: u8, sb: &SuperBlock, inode: u32, index: &Index) -> Result<()> {
        let lba = InodeTable::slot_lba(sb.inode_table_lba, inode)?;
        self.dev.write_sectors_counted(drive, lba, &index.encode()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disk::{ide::regs::ATA_ER_UNC, IdeError},
        fs::config::{ELIXIR_MAGIC, TOTAL_INODES},
        testing,
    };

    #[test]
    fn superblock_reads_back_byte_identical() {
        for sectors in [MIN_SECTORS, 40_000, 200_000] {
            let mut vol = testing::volume(sectors);
            let sb = vol.format(0, true).unwrap();

            let raw = vol.read_raw(0, SUPERBLOCK_LBA).unwrap();
            assert_eq!(raw, sb.encode().unwrap());
            assert_eq!(vol.mount(0).unwrap(), sb);
        }
    }

    #[test]
    fn format_writes_free_bitmap_and_empty_inode_table() {
        let mut vol = testing::volume(40_000);
        let sb = vol.format(0, true).unwrap();
        assert_eq!(sb.sectors_per_block(), 2);
        assert_eq!(sb.inode_table_lba, 8);
        assert_eq!(sb.data_start_lba, 136);

        let bitmap = vol.read_bitmap(0, &sb).unwrap();
        assert_eq!(bitmap.total, 20_000);
        assert_eq!(bitmap.bits.len(), 2_500);
        assert_eq!(bitmap.free_count, 20_000);
        assert_eq!(bitmap.free_count + bitmap.used_count, bitmap.total);

        assert!(vol.list_files(0).unwrap().is_empty());
        assert!(vol.check(0).unwrap().is_clean());
    }

    #[test]
    fn too_small_drive_fails_before_any_write() {
        let mut vol = testing::volume(MIN_SECTORS - 1);
        let before = vol.device().ports().io_count();

        assert_eq!(
            vol.format(0, true),
            Err(FileSystemError::DriveTooSmall {
                sectors: MIN_SECTORS - 1,
                minimum: MIN_SECTORS
            })
        );
        assert_eq!(vol.device().ports().io_count(), before);
        assert!(vol.device().ports().drive(0).unwrap().write_commands().is_empty());
    }

    #[test]
    fn mount_rejects_foreign_magic() {
        let mut vol = testing::volume(2048);
        assert_eq!(
            vol.mount(0),
            Err(FileSystemError::InvalidFilesystem { found: 0 })
        );

        vol.format(0, true).unwrap();
        let mut sb = vol.mount(0).unwrap();
        sb.magic = 0x1234;
        vol.write_super(0, &sb).unwrap();
        assert_eq!(
            vol.mount(0),
            Err(FileSystemError::InvalidFilesystem { found: 0x1234 })
        );
    }

    #[test]
    fn mount_rejects_valid_magic_with_corrupt_layout() {
        let mut vol = testing::volume(2048);
        let good = vol.format(0, true).unwrap();
        vol.allocate_file(0).unwrap();
        let good = SuperBlock {
            free_inodes: good.free_inodes - 1,
            free_blocks: good.free_blocks - 1,
            ..good
        };

        let mut sb = good.clone();
        sb.inode_table_lba = u32::MAX - 2;
        vol.write_super(0, &sb).unwrap();
        assert!(matches!(vol.mount(0), Err(FileSystemError::Corrupted(_))));
        assert!(matches!(vol.read_index(0, 5), Err(FileSystemError::Corrupted(_))));
        assert!(matches!(vol.list_files(0), Err(FileSystemError::Corrupted(_))));

        let mut sb = good.clone();
        sb.free_inodes = u32::MAX;
        vol.write_super(0, &sb).unwrap();
        assert!(matches!(vol.release_file(0, 0), Err(FileSystemError::Corrupted(_))));
        assert!(matches!(vol.check(0), Err(FileSystemError::Corrupted(_))));

        let mut sb = good.clone();
        sb.total_inodes = u32::MAX;
        vol.write_super(0, &sb).unwrap();
        assert!(matches!(vol.allocate_file(0), Err(FileSystemError::Corrupted(_))));

        // 写回正确的超级块后卷照常可用
        vol.write_super(0, &good).unwrap();
        assert_eq!(vol.mount(0).unwrap(), good);
        assert_eq!(vol.release_file(0, 0).unwrap().first_block, good.data_start_lba);
    }

    #[test]
    fn driver_failures_are_not_reported_as_bad_magic() {
        let mut vol = testing::volume(2048);
        assert_eq!(
            vol.mount(1),
            Err(FileSystemError::Io(IdeError::NotPresent(1)))
        );
        assert_eq!(
            vol.create_file(3),
            Err(FileSystemError::Io(IdeError::NotPresent(3)))
        );
    }

    #[test]
    fn silent_write_corruption_fails_verification() {
        let mut vol = testing::volume(2048);
        vol.device_mut()
            .ports_mut()
            .drive_mut(0)
            .unwrap()
            .faults_mut()
            .corrupt_writes = true;

        assert_eq!(
            vol.format(0, true),
            Err(FileSystemError::VerificationFailed {
                field: "magic",
                expected: ELIXIR_MAGIC as u64,
                found: (ELIXIR_MAGIC ^ 0x00FF) as u64,
            })
        );
        assert!(vol.format(0, false).is_ok());
    }

    #[test]
    fn format_aborts_on_bitmap_write_error() {
        let mut vol = testing::volume(2048);
        vol.device_mut()
            .ports_mut()
            .drive_mut(0)
            .unwrap()
            .faults_mut()
            .bad_sectors = vec![2];

        assert_eq!(
            vol.format(0, true),
            Err(FileSystemError::Io(IdeError::DeviceError { error: ATA_ER_UNC }))
        );
        // 超级块已经写下，不回滚
        assert!(vol.mount(0).is_ok());
    }

    #[test]
    fn allocation_claims_first_free_slot_and_data_block() {
        let mut vol = testing::volume(MIN_SECTORS);
        let sb = vol.format(0, true).unwrap();
        assert_eq!(sb.data_start_block(), 131);

        let (inode, index) = vol.allocate_file(0).unwrap();
        assert_eq!((inode, index.first_block), (0, 131));
        let (inode, index) = vol.allocate_file(0).unwrap();
        assert_eq!((inode, index.first_block), (1, 132));
        assert_eq!(index.size, 0);

        let sb = vol.mount(0).unwrap();
        assert_eq!(sb.free_inodes, TOTAL_INODES - 2);
        assert_eq!(sb.free_blocks, sb.total_blocks - 2);
        assert_eq!(sb.state, STATE_CLEAN);

        let bitmap = vol.read_bitmap(0, &sb).unwrap();
        assert_eq!(bitmap.used_count, 2);
        assert!(bitmap.is_used(131) && bitmap.is_used(132));

        assert_eq!(vol.read_index(0, 1).unwrap(), index);
        assert_eq!(vol.list_files(0).unwrap().len(), 2);
        assert!(vol.check(0).unwrap().is_clean());
    }

    #[test]
    fn first_block_is_a_block_aligned_lba() {
        let mut vol = testing::volume(40_000);
        vol.format(0, true).unwrap();
        let (_, index) = vol.allocate_file(0).unwrap();
        assert_eq!(index.first_block, 136);
        let (_, index) = vol.allocate_file(0).unwrap();
        assert_eq!(index.first_block, 138);
    }

    #[test]
    fn inode_exhaustion() {
        let mut vol = testing::volume(MIN_SECTORS);
        vol.format(0, false).unwrap();
        for expected in 0..TOTAL_INODES {
            assert_eq!(vol.allocate_file(0).unwrap().0, expected);
        }
        assert_eq!(vol.allocate_file(0), Err(FileSystemError::InodeFull));
        assert_eq!(vol.mount(0).unwrap().free_inodes, 0);
    }

    #[test]
    fn disk_full_when_data_area_is_used() {
        let mut vol = testing::volume(MIN_SECTORS);
        let sb = vol.format(0, true).unwrap();
        let mut bitmap = vol.read_bitmap(0, &sb).unwrap();
        for block in sb.data_start_block()..sb.total_blocks {
            bitmap.set_used(block);
        }
        vol.write_bitmap(0, &sb, &bitmap).unwrap();

        assert_eq!(vol.allocate_file(0), Err(FileSystemError::DiskFull));
        // 失败的分配不占用 inode
        assert!(vol.list_files(0).unwrap().is_empty());
    }

    #[test]
    fn release_returns_slot_and_block() {
        let mut vol = testing::volume(MIN_SECTORS);
        vol.format(0, true).unwrap();
        vol.allocate_file(0).unwrap();
        vol.allocate_file(0).unwrap();

        let released = vol.release_file(0, 0).unwrap();
        assert_eq!(released.first_block, 131);
        assert_eq!(vol.release_file(0, 0), Err(FileSystemError::InvalidInode(0)));
        assert_eq!(vol.release_file(0, 500), Err(FileSystemError::InvalidInode(500)));
        assert!(vol.check(0).unwrap().is_clean());

        // 空出来的槽和块会被再次使用
        let (inode, index) = vol.allocate_file(0).unwrap();
        assert_eq!((inode, index.first_block), (0, 131));
    }

    #[test]
    fn check_reports_counter_drift() {
        let mut vol = testing::volume(MIN_SECTORS);
        vol.format(0, true).unwrap();
        let mut sb = vol.mount(0).unwrap();
        sb.free_blocks -= 5;
        sb.free_inodes = 3;
        vol.write_super(0, &sb).unwrap();

        let report = vol.check(0).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.problems.len(), 2);
        assert_eq!(report.free_blocks_counted, sb.total_blocks);
        assert_eq!(report.free_inodes_counted, TOTAL_INODES);
    }

    #[test]
    fn bitmap_size_mismatch_is_rejected() {
        let mut vol = testing::volume(MIN_SECTORS);
        let sb = vol.format(0, true).unwrap();
        let wrong = BlockBitmap::new(sb.total_blocks + 8);
        assert!(matches!(
            vol.write_bitmap(0, &sb, &wrong),
            Err(FileSystemError::Corrupted(_))
        ));
        assert_eq!(vol.create_bitmap(0).unwrap(), BlockBitmap::new(sb.total_blocks));
    }

    #[test]
    fn scan_sees_formatted_metadata() {
        let mut vol = testing::volume(MIN_SECTORS);
        vol.format(0, true).unwrap();
        let occ = vol.scan(0, |_, _| {}).unwrap();
        // 只有超级块非零：空位图和 inode 表都是全 0
        assert_eq!(occ.used_sectors, 1);
        assert_eq!(occ.next_free_lba, Some(2));
    }
}
