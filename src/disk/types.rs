/// 扇区大小：ATA PIO 每次传输的最小单位（字节）
pub const SECTOR_SIZE: usize = 512;

/// 单条 READ/WRITE 命令最多传输的扇区数（扇区计数寄存器写 0 表示 256）
pub const MAX_SECTORS_PER_COMMAND: usize = 256;

/// 28 位 LBA 寻址能表示的最大扇区号
pub const LBA28_MAX: u32 = 0x0FFF_FFFF;

/// 两条通道 × 主/从 = 4 个驱动器槽位
pub const MAX_DRIVES: usize = 4;

/// 一个扇区的数据
pub type Sector = [u8; SECTOR_SIZE];
