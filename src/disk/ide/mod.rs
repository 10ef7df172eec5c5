//! ATA/IDE PIO 驱动
//!
//! 枚举两条传统通道上的最多 4 个驱动器，并提供同步的扇区读写。整个驱动只靠
//! 轮询状态寄存器推进，不使用中断和 DMA。

pub mod device;
pub mod error;
mod identify;
mod polling;
pub mod regs;
mod rw;

use log::{info, warn};

use crate::disk::{
    block_device::BlockDevice,
    port_io::{PortIo, Timer},
    types::{Sector, MAX_DRIVES, SECTOR_SIZE},
};
use device::{DeviceType, IdeDevice};
use error::{IdeError, Result};
use regs::{Channel, Register, ATA_PRIMARY, ATA_SECONDARY};

/// BSY 轮询的默认预算（状态寄存器读取次数）
pub const DEFAULT_POLL_BUDGET: u32 = 100_000;

/// 块设备上下文：端口、定时器、通道描述、驱动器表和 512 字节暂存区
///
/// 启动时构造一次，之后显式传给每个调用。所有操作都需要 `&mut self`，
/// 因此同一时刻每条通道上最多只有一个硬件操作。
#[derive(Debug)]
pub struct IdeController<P, T> {
    ports: P,
    timer: T,
    channels: [Channel; 2],
    devices: [IdeDevice; MAX_DRIVES],
    scratch: Sector,
    poll_budget: u32,
}

impl<P: PortIo, T: Timer> IdeController<P, T> {
    /// 关闭两条通道的中断，然后依次探测 4 个槽位
    pub fn initialize(ports: P, timer: T, poll_budget: u32) -> Self {
        let mut ide = Self {
            ports,
            timer,
            channels: [Channel::primary(), Channel::secondary()],
            devices: Default::default(),
            scratch: [0; SECTOR_SIZE],
            poll_budget,
        };

        info!("Initializing IDE driver");
        for channel in [ATA_PRIMARY, ATA_SECONDARY] {
            let nien = ide.channels[channel].nien;
            ide.write_reg(channel, Register::Control, nien);
        }

        for slot in 0..MAX_DRIVES {
            let channel = slot / 2;
            let drive = (slot % 2) as u8;
            let device = ide.probe(channel, drive);

            match device.kind {
                DeviceType::None => info!("No device at IDE {}:{}", channel, drive),
                DeviceType::Atapi | DeviceType::Sata => warn!(
                    "{} device at IDE {}:{} (skipping)",
                    device.kind.name(),
                    channel,
                    drive
                ),
                DeviceType::Ata => info!(
                    "Found IDE drive {}: {}, Size: {} sectors",
                    slot, device.model, device.size
                ),
            }
            ide.devices[slot] = device;
        }

        ide
    }

    /// 驱动器表（按槽位 0..4）
    pub fn devices(&self) -> &[IdeDevice; MAX_DRIVES] {
        &self.devices
    }

    /// 查找可用的 ATA 驱动器
    pub fn device(&self, drive: u8) -> Result<&IdeDevice> {
        let device = self
            .devices
            .get(drive as usize)
            .ok_or(IdeError::InvalidDrive(drive))?;
        if !device.reserved {
            return Err(IdeError::NotPresent(drive));
        }
        Ok(device)
    }

    pub fn poll_budget(&self) -> u32 {
        self.poll_budget
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    fn read_reg(&mut self, channel: usize, reg: Register) -> u8 {
        let port = reg.port(&self.channels[channel]);
        self.ports.inb(port)
    }

    fn write_reg(&mut self, channel: usize, reg: Register, value: u8) {
        let port = reg.port(&self.channels[channel]);
        self.ports.outb(port, value);
    }

    /// 选择设备后等待其稳定
    fn select(&mut self, channel: usize, devsel: u8) {
        self.write_reg(channel, Register::DeviceSelect, devsel);
        self.timer.wait_ms(1);
    }

    /// 4 次读备用状态寄存器，约 400ns 的硬件稳定延时
    fn delay(&mut self, channel: usize) {
        for _ in 0..4 {
            self.read_reg(channel, Register::Control);
        }
    }

    /// 从数据端口读一个扇区（256 字）
    fn read_data(&mut self, channel: usize, buf: &mut [u8]) {
        let port = Register::Data.port(&self.channels[channel]);
        for pair in buf[..SECTOR_SIZE].chunks_exact_mut(2) {
            pair.copy_from_slice(&self.ports.inw(port).to_le_bytes());
        }
    }

    /// 向数据端口写一个扇区（256 字）
    fn write_data(&mut self, channel: usize, buf: &[u8]) {
        let port = Register::Data.port(&self.channels[channel]);
        for pair in buf[..SECTOR_SIZE].chunks_exact(2) {
            self.ports.outw(port, u16::from_le_bytes([pair[0], pair[1]]));
        }
    }
}

impl<P: PortIo, T: Timer> BlockDevice for IdeController<P, T> {
    fn total_sectors(&self, drive: u8) -> Result<u32> {
        self.device(drive).map(|d| d.size)
    }

    fn read_sectors(&mut self, drive: u8, count: u16, lba: u32, buf: &mut [u8]) -> Result<()> {
        IdeController::read_sectors(self, drive, count, lba, buf)
    }

    fn write_sectors_counted(&mut self, drive: u8, start_lba: u32, buf: &[u8]) -> Result<()> {
        IdeController::write_sectors_counted(self, drive, start_lba, buf)
    }
}
