//! 软件模拟的双通道 IDE 控制器
//!
//! 在 [`PortIo`] 层面回应驱动的寄存器协议：设备选择、扇区数、LBA、命令、状态、
//! 备用状态、错误寄存器和 16 位数据端口。支持 IDENTIFY、READ SECTORS、
//! WRITE SECTORS 和 CACHE FLUSH，每条命令之后会先报告若干次 BSY，
//! 并可以注入故障来覆盖驱动的错误路径。

use std::fmt;

use log::{debug, trace, warn};

use crate::disk::{
    file_disk::{MemDisk, SectorMedia},
    ide::regs::{
        Register, Status, ATA_CMD_CACHE_FLUSH, ATA_CMD_IDENTIFY, ATA_CMD_READ_PIO,
        ATA_CMD_WRITE_PIO, ATA_ER_ABRT, ATA_ER_IDNF, ATA_ER_UNC, PRIMARY_BASE, PRIMARY_CTRL,
        SECONDARY_BASE, SECONDARY_CTRL,
    },
    port_io::PortIo,
    types::{Sector, LBA28_MAX, MAX_DRIVES, SECTOR_SIZE},
};

/// 每条命令（以及多扇区传输中的每个后续扇区）之后报告 BSY 的状态读取次数
pub const DEFAULT_LATENCY: u32 = 2;

/// 模拟设备的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKind {
    Ata,
    Atapi,
    Sata,
}

/// 可注入的故障
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub stuck_busy: bool,       // 状态寄存器永远 BSY
    pub device_fault: bool,     // 读写命令报告 DF
    pub bad_sectors: Vec<u32>,  // 读写这些扇区时报告 ERR/UNC
    pub corrupt_writes: bool,   // 写入时悄悄翻转每个扇区的第一个字节
}

/// 挂在通道上的一个模拟设备
pub struct EmulatedDrive {
    kind: DriveKind,
    model: String,
    media: Box<dyn SectorMedia>,
    faults: Faults,
    flushes: usize,
    write_commands: Vec<(u32, usize)>,
}

impl fmt::Debug for EmulatedDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedDrive")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("sectors", &self.media.sector_count())
            .field("faults", &self.faults)
            .finish()
    }
}

impl EmulatedDrive {
    pub fn ata(model: impl Into<String>, media: Box<dyn SectorMedia>) -> Self {
        Self {
            kind: DriveKind::Ata,
            model: model.into(),
            media,
            faults: Faults::default(),
            flushes: 0,
            write_commands: Vec::new(),
        }
    }

    /// 只会回应 IDENTIFY 签名的 ATAPI / SATA 设备
    pub fn packet(kind: DriveKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::ata(model, Box::new(MemDisk::new(0)))
        }
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// 收到过的写命令 (起始 LBA, 扇区数)
    pub fn write_commands(&self) -> &[(u32, usize)] {
        &self.write_commands
    }

    pub fn media_mut(&mut self) -> &mut dyn SectorMedia {
        self.media.as_mut()
    }

    /// 256 字 IDENTIFY 数据
    fn identify_data(&self) -> Sector {
        let mut id = [0u8; SECTOR_SIZE];
        let sectors = self.media.sector_count().min(LBA28_MAX);

        let mut put_word = |word: usize, value: u16| {
            id[word * 2..word * 2 + 2].copy_from_slice(&value.to_le_bytes());
        };
        put_word(0, 0x0040); // 固定盘
        put_word(49, 0x0300); // DMA + LBA
        put_word(60, sectors as u16);
        put_word(61, (sectors >> 16) as u16);
        put_word(82, 0x0020); // 写缓存
        put_word(83, 0x4000);

        // 型号按大端字节对存放
        let mut model = [b' '; 40];
        for (dst, src) in model.iter_mut().zip(self.model.bytes()) {
            *dst = src;
        }
        for k in (0..model.len()).step_by(2) {
            id[54 + k] = model[k + 1];
            id[54 + k + 1] = model[k];
        }
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Idle,
    Identify,
    Read { lba: u32, remaining: usize },
    Write { lba: u32, remaining: usize },
}

/// 一条通道的任务文件寄存器和传输状态
#[derive(Debug)]
struct TaskFile {
    devsel: u8,
    sector_count: u8,
    lba: [u8; 3],
    error: u8,
    control: u8,
    status: Status,
    busy_reads: u32,
    buffer: Sector,
    cursor: usize,
    transfer: Transfer,
    pending_error: Option<u8>, // 写入失败后由下一次 CACHE FLUSH 报告
}

impl TaskFile {
    fn new() -> Self {
        Self {
            devsel: 0,
            sector_count: 0,
            lba: [0; 3],
            error: 0,
            control: 0,
            status: Status::DRDY | Status::DSC,
            busy_reads: 0,
            buffer: [0; SECTOR_SIZE],
            cursor: 0,
            transfer: Transfer::Idle,
            pending_error: None,
        }
    }

    /// 命令的目标：28 位 LBA 和扇区数（0 表示 256）
    fn target(&self) -> (u32, usize) {
        let lba = self.lba[0] as u32
            | (self.lba[1] as u32) << 8
            | (self.lba[2] as u32) << 16
            | ((self.devsel & 0x0F) as u32) << 24;
        let count = match self.sector_count {
            0 => 256,
            n => n as usize,
        };
        (lba, count)
    }

    fn fail(&mut self, error: u8) {
        self.status = Status::DRDY | Status::ERR;
        self.error = error;
        self.transfer = Transfer::Idle;
    }

    fn finish(&mut self) {
        self.status = Status::DRDY | Status::DSC;
        self.transfer = Transfer::Idle;
    }

    fn command(&mut self, drive: &mut EmulatedDrive, command: u8, latency: u32) {
        self.busy_reads = latency;
        self.error = 0;
        self.cursor = 0;
        let pending = self.pending_error.take();
        trace!("emulated command {:#04x} on {:?}", command, drive.kind);

        if command == ATA_CMD_IDENTIFY {
            match drive.kind {
                DriveKind::Ata => {
                    self.buffer = drive.identify_data();
                    self.lba[1] = 0;
                    self.lba[2] = 0;
                    self.status = Status::DRDY | Status::DRQ;
                    self.transfer = Transfer::Identify;
                }
                DriveKind::Atapi => {
                    self.lba[1] = 0x14;
                    self.lba[2] = 0xEB;
                    self.fail(ATA_ER_ABRT);
                }
                DriveKind::Sata => {
                    self.lba[1] = 0x3C;
                    self.lba[2] = 0xC3;
                    self.fail(ATA_ER_ABRT);
                }
            }
            return;
        }

        if drive.kind != DriveKind::Ata {
            return self.fail(ATA_ER_ABRT);
        }
        if drive.faults.device_fault {
            self.status = Status::DRDY | Status::DF;
            self.transfer = Transfer::Idle;
            return;
        }

        match command {
            ATA_CMD_READ_PIO | ATA_CMD_WRITE_PIO => {
                let (lba, count) = self.target();
                if lba as u64 + count as u64 > drive.media.sector_count() as u64 {
                    return self.fail(ATA_ER_IDNF);
                }
                if command == ATA_CMD_READ_PIO {
                    self.transfer = Transfer::Read {
                        lba,
                        remaining: count,
                    };
                    self.load_sector(drive);
                } else {
                    drive.write_commands.push((lba, count));
                    self.transfer = Transfer::Write {
                        lba,
                        remaining: count,
                    };
                    self.status = Status::DRDY | Status::DRQ;
                }
            }
            ATA_CMD_CACHE_FLUSH => {
                drive.flushes += 1;
                if let Some(error) = pending {
                    return self.fail(error);
                }
                match drive.media.flush() {
                    Ok(()) => self.finish(),
                    Err(e) => {
                        warn!("emulated flush failed: {}", e);
                        self.fail(ATA_ER_UNC);
                    }
                }
            }
            _ => self.fail(ATA_ER_ABRT),
        }
    }

    /// 把当前读传输的下一个扇区装入缓冲区
    fn load_sector(&mut self, drive: &mut EmulatedDrive) {
        let Transfer::Read { lba, .. } = self.transfer else {
            return;
        };
        if drive.faults.bad_sectors.contains(&lba) {
            return self.fail(ATA_ER_UNC);
        }
        match drive.media.read_sector(lba, &mut self.buffer) {
            Ok(()) => {
                self.cursor = 0;
                self.status = Status::DRDY | Status::DRQ;
            }
            Err(e) => {
                debug!("emulated read of sector {} failed: {}", lba, e);
                self.fail(ATA_ER_UNC);
            }
        }
    }

    fn read_word(&mut self, drive: &mut EmulatedDrive, latency: u32) -> u16 {
        if !self.status.contains(Status::DRQ) || self.cursor >= SECTOR_SIZE {
            return 0xFFFF;
        }
        let word = u16::from_le_bytes([self.buffer[self.cursor], self.buffer[self.cursor + 1]]);
        self.cursor += 2;

        if self.cursor == SECTOR_SIZE {
            match self.transfer {
                Transfer::Read { lba, remaining } if remaining > 1 => {
                    self.transfer = Transfer::Read {
                        lba: lba + 1,
                        remaining: remaining - 1,
                    };
                    self.busy_reads = latency;
                    self.load_sector(drive);
                }
                _ => self.finish(),
            }
        }
        word
    }

    fn write_word(&mut self, drive: &mut EmulatedDrive, value: u16, latency: u32) {
        let Transfer::Write { lba, remaining } = self.transfer else {
            return;
        };
        if !self.status.contains(Status::DRQ) || self.cursor >= SECTOR_SIZE {
            return;
        }
        self.buffer[self.cursor..self.cursor + 2].copy_from_slice(&value.to_le_bytes());
        self.cursor += 2;
        if self.cursor < SECTOR_SIZE {
            return;
        }

        if drive.faults.bad_sectors.contains(&lba) {
            self.pending_error = Some(ATA_ER_UNC);
            return self.fail(ATA_ER_UNC);
        }
        let mut data = self.buffer;
        if drive.faults.corrupt_writes {
            data[0] ^= 0xFF;
        }
        if let Err(e) = drive.media.write_sector(lba, &data) {
            debug!("emulated write of sector {} failed: {}", lba, e);
            self.pending_error = Some(ATA_ER_UNC);
            return self.fail(ATA_ER_UNC);
        }

        if remaining > 1 {
            self.transfer = Transfer::Write {
                lba: lba + 1,
                remaining: remaining - 1,
            };
            self.busy_reads = latency;
            self.cursor = 0;
            self.status = Status::DRDY | Status::DRQ;
        } else {
            self.finish();
        }
    }
}

#[derive(Debug)]
struct EmulatedChannel {
    drives: [Option<EmulatedDrive>; 2],
    selected: usize,
    regs: TaskFile,
}

impl EmulatedChannel {
    fn new() -> Self {
        Self {
            drives: [None, None],
            selected: 0,
            regs: TaskFile::new(),
        }
    }

    /// 当前状态；没有任何设备的通道总线浮空读出 0xFF，选中空槽读出 0
    fn peek_status(&self) -> u8 {
        if self.drives.iter().all(Option::is_none) {
            return 0xFF;
        }
        match &self.drives[self.selected] {
            None => 0x00,
            Some(drive) if drive.faults.stuck_busy => Status::BSY.bits(),
            Some(_) if self.regs.busy_reads > 0 => Status::BSY.bits(),
            Some(_) => self.regs.status.bits(),
        }
    }

    /// 读状态寄存器会推进模拟的忙等待
    fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        if self.drives[self.selected].is_some() && self.regs.busy_reads > 0 {
            self.regs.busy_reads -= 1;
        }
        status
    }

    fn select(&mut self, devsel: u8) {
        self.regs.devsel = devsel;
        self.selected = ((devsel >> 4) & 1) as usize;
        self.regs.busy_reads = 0;
        self.regs.cursor = 0;
        self.regs.finish();
    }
}

/// 两条传统通道组成的 IDE 总线
#[derive(Debug)]
pub struct EmulatedBus {
    channels: [EmulatedChannel; 2],
    latency: u32,
    io_count: u64,
    alt_status_reads: u64,
}

impl Default for EmulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedBus {
    pub fn new() -> Self {
        Self::with_latency(DEFAULT_LATENCY)
    }

    pub fn with_latency(latency: u32) -> Self {
        Self {
            channels: [EmulatedChannel::new(), EmulatedChannel::new()],
            latency,
            io_count: 0,
            alt_status_reads: 0,
        }
    }

    /// 把设备挂到槽位 0..4（通道 = slot / 2，主从 = slot % 2）
    pub fn attach(&mut self, slot: usize, drive: EmulatedDrive) {
        if slot >= MAX_DRIVES {
            warn!("cannot attach drive to slot {}", slot);
            return;
        }
        self.channels[slot / 2].drives[slot % 2] = Some(drive);
    }

    pub fn drive(&self, slot: usize) -> Option<&EmulatedDrive> {
        self.channels
            .get(slot / 2)
            .and_then(|c| c.drives[slot % 2].as_ref())
    }

    pub fn drive_mut(&mut self, slot: usize) -> Option<&mut EmulatedDrive> {
        self.channels
            .get_mut(slot / 2)
            .and_then(|c| c.drives[slot % 2].as_mut())
    }

    /// 通道控制寄存器最近一次写入的值
    pub fn control(&self, channel: usize) -> u8 {
        self.channels[channel].regs.control
    }

    /// 端口访问总次数
    pub fn io_count(&self) -> u64 {
        self.io_count
    }

    pub fn alt_status_reads(&self) -> u64 {
        self.alt_status_reads
    }
}

/// 端口号 -> (通道, 寄存器)
fn decode(port: u16) -> Option<(usize, Register)> {
    let (channel, offset) = match port {
        PRIMARY_CTRL => return Some((0, Register::Control)),
        SECONDARY_CTRL => return Some((1, Register::Control)),
        p if (PRIMARY_BASE..PRIMARY_BASE + 8).contains(&p) => (0, p - PRIMARY_BASE),
        p if (SECONDARY_BASE..SECONDARY_BASE + 8).contains(&p) => (1, p - SECONDARY_BASE),
        _ => return None,
    };
    let reg = match offset {
        0 => Register::Data,
        1 => Register::Error,
        2 => Register::SectorCount,
        3 => Register::LbaLow,
        4 => Register::LbaMid,
        5 => Register::LbaHigh,
        6 => Register::DeviceSelect,
        _ => Register::Command,
    };
    Some((channel, reg))
}

impl PortIo for EmulatedBus {
    fn inb(&mut self, port: u16) -> u8 {
        self.io_count += 1;
        let Some((ch, reg)) = decode(port) else {
            return 0xFF;
        };
        let channel = &mut self.channels[ch];
        match reg {
            Register::Control => {
                self.alt_status_reads += 1;
                channel.peek_status()
            }
            Register::Command => channel.read_status(),
            Register::Error => channel.regs.error,
            Register::SectorCount => channel.regs.sector_count,
            Register::LbaLow => channel.regs.lba[0],
            Register::LbaMid => channel.regs.lba[1],
            Register::LbaHigh => channel.regs.lba[2],
            Register::DeviceSelect => channel.regs.devsel,
            Register::Data => 0xFF,
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.io_count += 1;
        let Some((ch, reg)) = decode(port) else {
            return;
        };
        let latency = self.latency;
        let channel = &mut self.channels[ch];
        match reg {
            Register::DeviceSelect => channel.select(value),
            Register::SectorCount => channel.regs.sector_count = value,
            Register::LbaLow => channel.regs.lba[0] = value,
            Register::LbaMid => channel.regs.lba[1] = value,
            Register::LbaHigh => channel.regs.lba[2] = value,
            Register::Control => channel.regs.control = value,
            Register::Command => {
                if let Some(drive) = channel.drives[channel.selected].as_mut() {
                    channel.regs.command(drive, value, latency);
                }
            }
            Register::Error | Register::Data => {}
        }
    }

    fn inw(&mut self, port: u16) -> u16 {
        self.io_count += 1;
        let latency = self.latency;
        match decode(port) {
            Some((ch, Register::Data)) => {
                let channel = &mut self.channels[ch];
                match channel.drives[channel.selected].as_mut() {
                    Some(drive) => channel.regs.read_word(drive, latency),
                    None => 0xFFFF,
                }
            }
            _ => 0xFFFF,
        }
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.io_count += 1;
        let latency = self.latency;
        if let Some((ch, Register::Data)) = decode(port) {
            let channel = &mut self.channels[ch];
            if let Some(drive) = channel.drives[channel.selected].as_mut() {
                channel.regs.write_word(drive, value, latency);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_decode_to_channel_registers() {
        assert_eq!(decode(0x1F0), Some((0, Register::Data)));
        assert_eq!(decode(0x1F7), Some((0, Register::Command)));
        assert_eq!(decode(0x3F6), Some((0, Register::Control)));
        assert_eq!(decode(0x172), Some((1, Register::SectorCount)));
        assert_eq!(decode(0x376), Some((1, Register::Control)));
        assert_eq!(decode(0x80), None);
    }

    #[test]
    fn empty_channel_floats_high_and_missing_slave_reads_zero() {
        let mut bus = EmulatedBus::new();
        bus.attach(0, EmulatedDrive::ata("DISK", Box::new(MemDisk::new(8))));

        bus.outb(0x1F6, 0xB0);
        assert_eq!(bus.inb(0x1F7), 0x00);
        bus.outb(0x176, 0xA0);
        assert_eq!(bus.inb(0x177), 0xFF);
    }

    #[test]
    fn commands_report_busy_before_completing() {
        let mut bus = EmulatedBus::with_latency(3);
        bus.attach(0, EmulatedDrive::ata("DISK", Box::new(MemDisk::new(8))));

        bus.outb(0x1F6, 0xE0);
        bus.outb(0x1F2, 1);
        bus.outb(0x1F7, ATA_CMD_READ_PIO);
        // 备用状态不推进忙等待
        assert_eq!(bus.inb(0x3F6), Status::BSY.bits());
        for _ in 0..3 {
            assert_eq!(bus.inb(0x1F7), Status::BSY.bits());
        }
        assert_eq!(Status::from_bits_retain(bus.inb(0x1F7)), Status::DRDY | Status::DRQ);
    }

    #[test]
    fn corrupt_writes_flip_first_byte() {
        let mut bus = EmulatedBus::with_latency(0);
        bus.attach(0, EmulatedDrive::ata("DISK", Box::new(MemDisk::new(8))));
        bus.drive_mut(0).unwrap().faults_mut().corrupt_writes = true;

        bus.outb(0x1F6, 0xE0);
        bus.outb(0x1F2, 1);
        bus.outb(0x1F3, 2);
        bus.outb(0x1F7, ATA_CMD_WRITE_PIO);
        for _ in 0..256 {
            bus.outw(0x1F0, 0x1111);
        }

        let mut sector = [0u8; SECTOR_SIZE];
        bus.drive_mut(0)
            .unwrap()
            .media_mut()
            .read_sector(2, &mut sector)
            .unwrap();
        assert_eq!(sector[0], 0x11 ^ 0xFF);
        assert_eq!(sector[1], 0x11);
    }
}
