// 魔数，用于识别 Elixir 卷
pub const ELIXIR_MAGIC: u16 = 0xE1F5;

// 固定布局：LBA 0 保留，超级块 -> 位图 -> inode 表 -> 数据区
pub const SUPERBLOCK_LBA: u32 = 1;
pub const BITMAP_START_LBA: u32 = 2;

// 总共 128 个 inode，每条索引记录独占一个扇区
pub const TOTAL_INODES: u32 = 128;
pub const INODE_TABLE_SECTORS: u32 = TOTAL_INODES;

// 可格式化的最小驱动器（512 KiB）
pub const MIN_SECTORS: u32 = 1024;

// 超级块状态字节
pub const STATE_CLEAN: u8 = 1;
pub const STATE_DIRTY: u8 = 2;

pub const MAX_SECTORS_PER_BLOCK: u32 = 128;

// (总扇区数上限, 每块扇区数)：总扇区数小于上限时使用对应的块大小
const SECTORS_PER_BLOCK_STEPS: [(u32, u32); 7] = [
    (32_768, 1),       // 16 MiB 以下：512B
    (131_072, 2),      // 64 MiB 以下：1KB
    (524_288, 4),      // 256 MiB 以下：2KB
    (2_097_152, 8),    // 1 GiB 以下：4KB
    (8_388_608, 16),   // 4 GiB 以下：8KB
    (33_554_432, 32),  // 16 GiB 以下：16KB
    (134_217_728, 64), // 64 GiB 以下：32KB
];

/// 按驱动器容量选择每块扇区数，更大的盘用更大的块
pub fn sectors_per_block(total_sectors: u32) -> u32 {
    SECTORS_PER_BLOCK_STEPS
        .iter()
        .find(|(limit, _)| total_sectors < *limit)
        .map(|&(_, spb)| spb)
        .unwrap_or(MAX_SECTORS_PER_BLOCK)
}
