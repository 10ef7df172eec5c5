use crate::disk::{
    ide::error::{IdeError, Result},
    types::{MAX_SECTORS_PER_COMMAND, SECTOR_SIZE},
};

/// 文件系统所依赖的块设备接口
///
/// 所有调用都是同步的；缓冲区在调用期间归调用者所有，设备既不保留也不释放它们。
pub trait BlockDevice {
    /// 驱动器报告的总扇区数
    fn total_sectors(&self, drive: u8) -> Result<u32>;

    /// 从 `lba` 开始读取 `count`（1..=256）个扇区到 `buf`
    fn read_sectors(&mut self, drive: u8, count: u16, lba: u32, buf: &mut [u8]) -> Result<()>;

    /// 把 `buf` 整体写到 `start_lba` 开始的扇区，长度必须是 512 的整数倍
    fn write_sectors_counted(&mut self, drive: u8, start_lba: u32, buf: &[u8]) -> Result<()>;

    /// 读取任意长度（扇区整数倍）的区域，按每条命令 256 个扇区拆分
    fn read_range(&mut self, drive: u8, start_lba: u32, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(IdeError::EmptyTransfer);
        }
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(IdeError::MisalignedLength(buf.len()));
        }

        let mut lba = start_lba;
        for chunk in buf.chunks_mut(MAX_SECTORS_PER_COMMAND * SECTOR_SIZE) {
            let count = (chunk.len() / SECTOR_SIZE) as u16;
            self.read_sectors(drive, count, lba, chunk)?;
            lba = lba
                .checked_add(count as u32)
                .ok_or(IdeError::Lba28Limit(u32::MAX))?;
        }
        Ok(())
    }
}
