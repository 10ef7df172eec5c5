use log::{debug, trace};

use super::{
    error::{IdeError, Result},
    regs::{
        Register, Status, ATA_CMD_CACHE_FLUSH, ATA_CMD_READ_PIO, ATA_CMD_WRITE_PIO, DEVSEL_LBA,
    },
    IdeController,
};
use crate::disk::{
    port_io::{PortIo, Timer},
    types::{LBA28_MAX, MAX_SECTORS_PER_COMMAND, SECTOR_SIZE},
};

/// 寻址方式，由起始 LBA 决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Lba28,
    /// 扩展寻址；驱动只会发 28 位命令，因此这类请求直接拒绝
    Lba48,
}

impl AddressMode {
    pub fn for_lba(lba: u32) -> Self {
        if lba > LBA28_MAX {
            AddressMode::Lba48
        } else {
            AddressMode::Lba28
        }
    }
}

/// 检查 [lba, lba + sectors) 是否整体落在 28 位寻址范围内
fn check_lba28(lba: u32, sectors: usize) -> Result<()> {
    let last = lba as u64 + sectors as u64 - 1;
    if AddressMode::for_lba(lba) == AddressMode::Lba48 || last > LBA28_MAX as u64 {
        return Err(IdeError::Lba28Limit(lba));
    }
    Ok(())
}

impl<P: PortIo, T: Timer> IdeController<P, T> {
    /// 读取 `count`（1..=256）个扇区
    ///
    /// 每个扇区传输前都带错误检查地轮询；任何错误都会中止整个调用。
    pub fn read_sectors(&mut self, drive: u8, count: u16, lba: u32, buf: &mut [u8]) -> Result<()> {
        let (channel, slave) = self.route(drive)?;

        let sectors = count as usize;
        if sectors == 0 {
            return Err(IdeError::EmptyTransfer);
        }
        if sectors > MAX_SECTORS_PER_COMMAND {
            return Err(IdeError::TooManySectors(sectors));
        }
        let needed = sectors * SECTOR_SIZE;
        if buf.len() < needed {
            return Err(IdeError::BufferTooSmall {
                needed,
                actual: buf.len(),
            });
        }
        check_lba28(lba, sectors)?;

        trace!("read drive {} lba {} count {}", drive, lba, sectors);
        self.issue(channel, slave, lba, sectors, ATA_CMD_READ_PIO);

        for sector in buf[..needed].chunks_exact_mut(SECTOR_SIZE) {
            self.poll_status(channel, true)?;
            self.read_data(channel, sector);
        }

        Ok(())
    }

    /// 把 `buf` 写到 `start_lba` 开始的区域
    ///
    /// 长度必须是 512 的整数倍。按每块不超过 256 个扇区拆成多条命令，每块写完
    /// 都发 CACHE FLUSH 并轮询到完成。出错时立即返回，之前已写的块不会回滚。
    pub fn write_sectors_counted(&mut self, drive: u8, start_lba: u32, buf: &[u8]) -> Result<()> {
        let (channel, slave) = self.route(drive)?;

        if buf.is_empty() {
            return Err(IdeError::EmptyTransfer);
        }
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(IdeError::MisalignedLength(buf.len()));
        }

        let mut lba = start_lba;
        for chunk in buf.chunks(MAX_SECTORS_PER_COMMAND * SECTOR_SIZE) {
            let sectors = chunk.len() / SECTOR_SIZE;
            check_lba28(lba, sectors)?;

            trace!("write drive {} lba {} count {}", drive, lba, sectors);
            self.issue(channel, slave, lba, sectors, ATA_CMD_WRITE_PIO);

            for sector in chunk.chunks_exact(SECTOR_SIZE) {
                self.poll_status(channel, true)?;
                self.write_data(channel, sector);
            }

            self.flush_cache(channel)?;
            lba += sectors as u32;
        }

        debug!(
            "wrote {} sectors to drive {} at lba {}",
            buf.len() / SECTOR_SIZE,
            drive,
            start_lba
        );
        Ok(())
    }

    /// PIO 写入在 CACHE FLUSH 完成前不保证持久
    pub fn flush_cache(&mut self, channel: usize) -> Result<()> {
        self.write_reg(channel, Register::Command, ATA_CMD_CACHE_FLUSH);
        self.poll_status(channel, false)?;

        let status = Status::from_bits_retain(self.read_reg(channel, Register::Command));
        if status.contains(Status::ERR) {
            let error = self.read_reg(channel, Register::Error);
            return Err(IdeError::DeviceError { error });
        }
        if status.contains(Status::DF) {
            return Err(IdeError::DeviceFault);
        }
        Ok(())
    }

    /// 驱动器编号 -> (通道, 从盘位)
    fn route(&self, drive: u8) -> Result<(usize, u8)> {
        let device = self.device(drive)?;
        Ok((device.channel as usize, device.drive))
    }

    /// 选择设备并写入扇区数、LBA 和命令；扇区数 256 写作 0
    fn issue(&mut self, channel: usize, slave: u8, lba: u32, sectors: usize, command: u8) {
        let head = ((lba >> 24) & 0x0F) as u8;
        self.select(channel, DEVSEL_LBA | (slave << 4) | head);

        self.write_reg(channel, Register::SectorCount, sectors as u8);
        self.write_reg(channel, Register::LbaLow, lba as u8);
        self.write_reg(channel, Register::LbaMid, (lba >> 8) as u8);
        self.write_reg(channel, Register::LbaHigh, (lba >> 16) as u8);
        self.write_reg(channel, Register::Command, command);
    }
}
