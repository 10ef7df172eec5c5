use serde::{Deserialize, Serialize};

use crate::{
    disk::types::{Sector, SECTOR_SIZE},
    fs::{
        config::{
            sectors_per_block, BITMAP_START_LBA, ELIXIR_MAGIC, INODE_TABLE_SECTORS,
            MAX_SECTORS_PER_BLOCK, STATE_CLEAN, TOTAL_INODES,
        },
        error::{FileSystemError, Result},
    },
};

/// 超级块，位于 LBA 1，按字段顺序小端编码后补齐到一个扇区
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u16,            // 魔数，用于识别文件系统
    pub free_blocks: u32,      // 当前空闲块数
    /** 块信息 */
    pub block_size: u16,       // 每块大小（字节），65536 记作 0
    pub total_blocks: u32,     // 文件系统总块数
    /** inode 信息 */
    pub free_inodes: u32,      // 当前空闲 inode 数
    pub total_inodes: u32,     // 总 inode 数
    /** 布局 */
    pub bitmap_start_lba: u32, // 位图起始扇区
    pub bitmap_blocks: u32,    // 位图占用的块数
    pub inode_table_lba: u32,  // inode 表起始扇区
    pub data_start_lba: u32,   // 数据区起始扇区
    /** 文件系统状态 */
    pub state: u8,             // 1 干净 / 2 分配中
    pub errors: u8,            // 错误标志
}

impl SuperBlock {
    /// 按驱动器容量计算布局；调用者负责先检查最小容量
    pub fn new(total_sectors: u32) -> Self {
        let spb = sectors_per_block(total_sectors);
        let total_blocks = total_sectors / spb;

        // 每块 1 位，先取整到扇区，再取整到块
        let bitmap_sectors = total_blocks.div_ceil(8).div_ceil(SECTOR_SIZE as u32);
        let bitmap_blocks = bitmap_sectors.div_ceil(spb);

        let inode_table_lba = BITMAP_START_LBA + bitmap_blocks * spb;
        let data_start_lba = inode_table_lba + INODE_TABLE_SECTORS;

        Self {
            magic: ELIXIR_MAGIC,
            free_blocks: total_blocks,
            block_size: (spb as usize * SECTOR_SIZE) as u16,
            total_blocks,
            free_inodes: TOTAL_INODES,
            total_inodes: TOTAL_INODES,
            bitmap_start_lba: BITMAP_START_LBA,
            bitmap_blocks,
            inode_table_lba,
            data_start_lba,
            state: STATE_CLEAN,
            errors: 0,
        }
    }

    pub fn encode(&self) -> Result<Sector> {
        let bytes = bincode::serialize(self)?;
        let mut sector = [0u8; SECTOR_SIZE];
        sector[..bytes.len()].copy_from_slice(&bytes);
        Ok(sector)
    }

    pub fn decode(sector: &Sector) -> Result<Self> {
        Ok(bincode::deserialize(sector)?)
    }

    pub fn is_valid(&self) -> bool {
        self.magic == ELIXIR_MAGIC
    }

    pub fn block_size_bytes(&self) -> u32 {
        match self.block_size {
            0 => 65_536,
            n => n as u32,
        }
    }

    pub fn sectors_per_block(&self) -> u32 {
        (self.block_size_bytes() / SECTOR_SIZE as u32).max(1)
    }

    /// 分配器可以使用的第一个块（数据区起点向上取整到块）
    pub fn data_start_block(&self) -> u32 {
        self.data_start_lba.div_ceil(self.sectors_per_block())
    }

    /// 块号 -> 该块的第一个扇区
    pub fn block_lba(&self, block: u32) -> u32 {
        block * self.sectors_per_block()
    }

    /// 扇区号 -> 所在块号
    pub fn lba_block(&self, lba: u32) -> u32 {
        lba / self.sectors_per_block()
    }

    /// 位图实际写入的扇区数
    pub fn bitmap_sectors(&self) -> u32 {
        self.total_blocks.div_ceil(8).div_ceil(SECTOR_SIZE as u32)
    }

    /// 挂载时检查布局字段：计数不越界，区域按 超级块 -> 位图 -> inode 表 -> 数据 排列
    pub fn check_layout(&self) -> Result<()> {
        let corrupted = |desc: String| Err(FileSystemError::Corrupted(desc));

        let bytes = self.block_size_bytes();
        let spb = bytes / SECTOR_SIZE as u32;
        if bytes % SECTOR_SIZE as u32 != 0 || !spb.is_power_of_two() || spb > MAX_SECTORS_PER_BLOCK {
            return corrupted(format!("block size {} bytes", bytes));
        }
        if self.total_inodes != TOTAL_INODES || self.free_inodes > self.total_inodes {
            return corrupted(format!(
                "{} free of {} inodes",
                self.free_inodes, self.total_inodes
            ));
        }
        if self.free_blocks > self.total_blocks {
            return corrupted(format!(
                "{} free of {} blocks",
                self.free_blocks, self.total_blocks
            ));
        }
        if self.bitmap_start_lba != BITMAP_START_LBA {
            return corrupted(format!("bitmap starts at LBA {}", self.bitmap_start_lba));
        }

        let bitmap_end = self
            .bitmap_blocks
            .checked_mul(spb)
            .and_then(|n| self.bitmap_start_lba.checked_add(n));
        match bitmap_end {
            Some(end)
                if self.bitmap_blocks * spb >= self.bitmap_sectors()
                    && end <= self.inode_table_lba => {}
            _ => {
                return corrupted(format!(
                    "bitmap ({} blocks) overlaps the inode table at LBA {}",
                    self.bitmap_blocks, self.inode_table_lba
                ))
            }
        }

        if self.inode_table_lba.checked_add(INODE_TABLE_SECTORS) != Some(self.data_start_lba) {
            return corrupted(format!(
                "inode table at LBA {}, data at LBA {}",
                self.inode_table_lba, self.data_start_lba
            ));
        }
        match self.total_blocks.checked_mul(spb) {
            Some(total) if self.data_start_lba < total => Ok(()),
            _ => corrupted(format!(
                "data area at LBA {} is beyond {} blocks",
                self.data_start_lba, self.total_blocks
            )),
        }
    }

    /// 逐字段比较回读的超级块：魔数、块大小、块总数、inode 总数
    pub fn verify(&self, on_disk: &SuperBlock) -> Result<()> {
        let fields = [
            ("magic", self.magic as u64, on_disk.magic as u64),
            ("block_size", self.block_size as u64, on_disk.block_size as u64),
            ("total_blocks", self.total_blocks as u64, on_disk.total_blocks as u64),
            ("free_blocks", self.free_blocks as u64, on_disk.free_blocks as u64),
            ("total_inodes", self.total_inodes as u64, on_disk.total_inodes as u64),
            ("free_inodes", self.free_inodes as u64, on_disk.free_inodes as u64),
        ];

        for (field, expected, found) in fields {
            if expected != found {
                return Err(FileSystemError::VerificationFailed {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}
